//! HN 对下轮询 SN
//!
//! BEACON 打开一个外层周期；每轮先收 PROBE，再按 PROBE 到达顺序逐个 POLL，
//! 一轮没有 PROBE 时发 CBEACON 再给一次机会，直到 CBEACON 用完。

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use super::{HeadIdleReason, HeadNode, HeadState};
use crate::mac::config::data_window;
use crate::mac::drop::DropReason;
use crate::mac::timer::TimerKind;
use crate::net::{BeaconHdr, GrantHdr, Header, MacApi, NodeId, Packet, PacketKind};
use crate::queue::PacketQueue;
use crate::sim::{SimTime, Simulator};

/// 一个发来 PROBE 的 SN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedNode {
    pub addr: NodeId,
    /// 宣告数与每节点上限取小
    pub requested: u32,
    pub backoff_ms: u32,
}

/// 一个外层周期内的上下文与计数，HN 回到空闲时清零
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterCycle {
    pub probed: VecDeque<ProbedNode>,
    pub cbeacon_tx: u32,
    /// 当前这轮 PROBE 等待是由 CBEACON 打开的
    pub after_cbeacon: bool,
    /// 交换结束后回到 CBEACON 分支继续，而不是回到空闲
    pub resume_cbeacon: bool,
    pub last_beacon_tx: SimTime,
    pub last_probe_rx: SimTime,
    pub beacon_tx: u32,
    pub probe_rx: u32,
    pub poll_tx: u32,
    pub data_rx: u32,
}

impl ClusterCycle {
    /// 最近一次 BEACON/CBEACON 发出到最近一次 PROBE 收到的间隔
    pub fn rtt(&self) -> SimTime {
        self.last_probe_rx.saturating_sub(self.last_beacon_tx)
    }
}

impl HeadNode {
    fn beacon_hdr(&self) -> BeaconHdr {
        BeaconHdr {
            t_min_ms: self.cfg.probe_backoff_min_ms,
            t_max_ms: self.cfg.probe_backoff_max_ms,
            max_cbeacon: self.cfg.max_cbeacon,
        }
    }

    /// 空闲等待结束：新的外层周期
    pub(super) fn start_cluster_cycle(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.drain_local();
        self.cluster = ClusterCycle::default();
        self.cluster.last_beacon_tx = sim.now();
        self.cluster.beacon_tx += 1;
        self.stats.beacon_tx += 1;
        let pkt = net.make_packet(self.id, NodeId::BROADCAST, Header::Beacon(self.beacon_hdr()));
        info!(node = %self.id, queued = self.uplink_q.len(), "📣 发送 BEACON");
        self.set_state(HeadState::BeaconTx, sim, net);
        net.broadcast(self.id, pkt, sim);
    }

    fn send_cbeacon(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.cluster.probed.clear();
        self.cluster.cbeacon_tx += 1;
        self.cluster.last_beacon_tx = sim.now();
        self.stats.cbeacon_tx += 1;
        let pkt = net.make_packet(self.id, NodeId::BROADCAST, Header::Cbeacon(self.beacon_hdr()));
        info!(node = %self.id, n = self.cluster.cbeacon_tx, max = self.cfg.max_cbeacon, "📣 发送 CBEACON");
        self.set_state(HeadState::CbeaconTx, sim, net);
        net.broadcast(self.id, pkt, sim);
    }

    fn poll_next(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        let Some(head) = self.cluster.probed.front().copied() else {
            self.after_cluster_round(sim, net);
            return;
        };
        let hdr = Header::Poll(GrantHdr {
            max_data: head.requested,
            responder: head.addr,
        });
        let pkt = net.make_packet(self.id, head.addr, hdr);
        info!(node = %self.id, sn = %head.addr, max_data = head.requested, "📡 发送 POLL");
        self.cluster.poll_tx += 1;
        self.stats.poll_tx += 1;
        self.set_state(HeadState::PollTx, sim, net);
        net.send(self.id, pkt, sim);
    }

    /// 一轮结束：还有已登记的 SN 就继续 POLL；否则发 CBEACON，CBEACON 用完则回到空闲
    pub(super) fn after_cluster_round(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !self.cluster.probed.is_empty() {
            self.poll_next(sim, net);
        } else if self.cluster.cbeacon_tx < self.cfg.max_cbeacon {
            self.send_cbeacon(sim, net);
        } else {
            self.enter_idle(HeadIdleReason::CycleComplete, sim, net);
        }
    }

    pub(super) fn on_probe(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !pkt.dst.accepts(self.id) {
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }
        self.stats.probe_rx += 1;
        if pkt.error {
            self.stats.probe_rx_corrupted += 1;
            net.drop_packet(self.id, &pkt, DropReason::Corrupted, sim);
            return;
        }
        let Some(ann) = pkt.announce().copied() else {
            return;
        };
        if self.state != HeadState::WaitProbes {
            net.drop_packet(self.id, &pkt, DropReason::NotEnabled, sim);
            return;
        }
        if self.cluster.probed.iter().any(|p| p.addr == pkt.src) {
            debug!(node = %self.id, sn = %pkt.src, "重复 PROBE");
            net.drop_packet(self.id, &pkt, DropReason::NotEnabled, sim);
            return;
        }

        let requested = ann.num_data.min(self.cfg.max_pck_from_node);
        self.cluster.probed.push_back(ProbedNode {
            addr: pkt.src,
            requested,
            backoff_ms: ann.backoff_ms,
        });
        self.cluster.probe_rx += 1;
        self.cluster.last_probe_rx = sim.now();
        debug!(node = %self.id, sn = %pkt.src, num_data = ann.num_data, requested, "收到 PROBE");

        if self.cluster.probed.len() >= self.cfg.max_polled_nodes {
            self.timers.cancel(TimerKind::ProbeWait);
            self.poll_next(sim, net);
        }
    }

    pub(super) fn on_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !pkt.dst.accepts(self.id) {
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }
        self.stats.data_rx += 1;
        let HeadState::WaitData {
            polled,
            expected,
            received,
        } = self.state
        else {
            let reason = if pkt.error {
                DropReason::Corrupted
            } else {
                DropReason::NotEnabled
            };
            net.drop_packet(self.id, &pkt, reason, sim);
            return;
        };
        if pkt.src != polled {
            let reason = if pkt.error {
                DropReason::Corrupted
            } else {
                DropReason::NotEnabled
            };
            net.drop_packet(self.id, &pkt, reason, sim);
            return;
        }

        // 损坏的 DATA 也占用一个授权名额
        let received = received + 1;
        self.cluster.data_rx += 1;
        if pkt.error {
            self.stats.data_rx_corrupted += 1;
            net.drop_packet(self.id, &pkt, DropReason::Corrupted, sim);
        } else if let Err(pkt) = self.uplink_q.enqueue(pkt) {
            self.stats.buffer_drops += 1;
            net.drop_packet(self.id, &pkt, DropReason::BufferFull, sim);
        }
        trace!(node = %self.id, sn = %polled, received, expected, "收到 DATA");

        if received >= expected {
            self.timers.cancel(TimerKind::DataWait);
            self.cluster.probed.pop_front();
            info!(node = %self.id, sn = %polled, received, queued = self.uplink_q.len(), "SN 的 DATA 收齐");
            self.after_cluster_round(sim, net);
        } else {
            self.state = HeadState::WaitData {
                polled,
                expected,
                received,
            };
        }
    }

    pub(super) fn on_cluster_tx_end(&mut self, pkt: &Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match (pkt.kind(), self.state) {
            (PacketKind::Beacon, HeadState::BeaconTx) | (PacketKind::Cbeacon, HeadState::CbeaconTx) => {
                self.cluster.after_cbeacon = pkt.kind() == PacketKind::Cbeacon;
                self.timers
                    .schedule(TimerKind::ProbeWait, self.cfg.probe_timeout, sim);
                self.set_state(HeadState::WaitProbes, sim, net);
            }
            (PacketKind::Poll, HeadState::PollTx) => {
                let Some(head) = self.cluster.probed.front().copied() else {
                    self.after_cluster_round(sim, net);
                    return;
                };
                if head.requested == 0 {
                    self.cluster.probed.pop_front();
                    self.after_cluster_round(sim, net);
                    return;
                }
                let t_data = net.tx_duration(self.cfg.payload_bytes);
                let window = data_window(head.requested, t_data, self.cfg.guard_interval, self.cluster.rtt());
                self.timers.schedule(TimerKind::DataWait, window, sim);
                debug!(node = %self.id, sn = %head.addr, window = %window, "等待 SN 的 DATA");
                self.set_state(
                    HeadState::WaitData {
                        polled: head.addr,
                        expected: head.requested,
                        received: 0,
                    },
                    sim,
                    net,
                );
            }
            (kind, state) => {
                trace!(node = %self.id, kind = kind.label(), state = state.label(), "忽略发送结束");
            }
        }
    }

    pub(super) fn on_cluster_timer(&mut self, kind: TimerKind, sim: &mut Simulator, net: &mut dyn MacApi) {
        match (kind, self.state) {
            (TimerKind::BeaconStart, HeadState::Idle { .. }) => self.start_cluster_cycle(sim, net),
            (TimerKind::ProbeWait, HeadState::WaitProbes) => {
                debug!(node = %self.id, probed = self.cluster.probed.len(), "PROBE 等待结束");
                self.after_cluster_round(sim, net);
            }
            (TimerKind::DataWait, HeadState::WaitData { polled, received, expected }) => {
                warn!(node = %self.id, sn = %polled, received, expected, "⏰ 等 SN 的 DATA 超时");
                self.stats.data_timeouts += 1;
                self.cluster.probed.pop_front();
                self.after_cluster_round(sim, net);
            }
            (kind, state) => {
                debug!(node = %self.id, timer = kind.label(), state = state.label(), "定时器与状态不符，忽略");
            }
        }
    }
}
