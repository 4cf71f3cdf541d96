//! 传感节点（SN）MAC
//!
//! SN 只和自己的 HN 打交道：
//!
//! ```text
//! IDLE --BEACON--> BACKOFF --定时器--> PROBE 发送 --发送结束--> 等 POLL
//!   ^                                                          |
//!   |                                  POLL（发给我）           v
//!   +---- 等 CBEACON <--发送完毕-- DATA 发送 <--> DATA 间隔 <----+
//! ```
//!
//! 离开任何状态时取消该状态登记的全部定时器；进入 IDLE 时清零本周期计数。

use std::any::Any;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::burst::{BurstStep, DataBurst};
use super::config::SensorConfig;
use super::drop::DropReason;
use super::timer::{TimerKind, Timers};
use crate::net::{AnnounceHdr, Header, MacApi, Node, NodeId, Packet, PacketKind, ms_to_time};
use crate::queue::{DropTailQueue, PacketQueue};
use crate::sim::Simulator;
use crate::viz::VizRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Idle,
    Backoff,
    ProbeTx,
    WaitPoll,
    DataTx(DataBurst),
    DataSpacing(DataBurst),
    WaitCbeacon,
}

impl SensorState {
    pub fn label(&self) -> &'static str {
        match self {
            SensorState::Idle => "idle",
            SensorState::Backoff => "backoff",
            SensorState::ProbeTx => "probe-tx",
            SensorState::WaitPoll => "wait-poll",
            SensorState::DataTx(_) => "data-tx",
            SensorState::DataSpacing(_) => "data-spacing",
            SensorState::WaitCbeacon => "wait-cbeacon",
        }
    }
}

/// 一个外层周期（由 BEACON 打开，回到 IDLE 结束）内的上下文与计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorCycle {
    /// 本周期服务我的 HN
    pub head: Option<NodeId>,
    pub t_min_ms: u32,
    pub t_max_ms: u32,
    pub max_cbeacon: u32,
    pub cbeacon_rx: u32,
    /// 本周期是否已经把 DATA 交给 HN
    pub data_sent: bool,
    pub backoff_ms: u32,
    pub beacon_rx: u32,
    pub probe_tx: u32,
    pub poll_rx: u32,
    pub data_tx: u32,
}

/// 累计计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorStats {
    pub beacon_rx: u64,
    pub beacon_rx_corrupted: u64,
    pub cbeacon_rx: u64,
    pub cbeacon_rx_corrupted: u64,
    pub poll_rx: u64,
    pub poll_rx_corrupted: u64,
    pub probe_tx: u64,
    pub data_tx: u64,
    pub app_enqueued: u64,
    pub app_dropped: u64,
    pub poll_timeouts: u64,
    pub cycles: u64,
}

#[derive(Debug)]
pub struct SensorNode {
    id: NodeId,
    name: String,
    cfg: SensorConfig,
    state: SensorState,
    cycle: SensorCycle,
    queue: DropTailQueue,
    timers: Timers,
    backoff: Backoff,
    stats: SensorStats,
}

impl SensorNode {
    pub fn new(id: NodeId, name: impl Into<String>, cfg: SensorConfig, seed: Option<u64>) -> Self {
        Self {
            id,
            name: name.into(),
            queue: DropTailQueue::new(cfg.buffer_size),
            cfg,
            state: SensorState::Idle,
            cycle: SensorCycle::default(),
            timers: Timers::new(id),
            backoff: Backoff::new(id, seed),
            stats: SensorStats::default(),
        }
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    pub fn cycle(&self) -> &SensorCycle {
        &self.cycle
    }

    pub fn stats(&self) -> &SensorStats {
        &self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    fn set_state(&mut self, next: SensorState, sim: &Simulator, net: &mut dyn MacApi) {
        let from = self.state.label();
        self.state = next;
        if from != next.label() {
            net.state_changed(self.id, from, next.label(), sim);
        }
    }

    fn enter_idle(&mut self, why: &'static str, sim: &Simulator, net: &mut dyn MacApi) {
        self.timers.cancel_all();
        if self.state != SensorState::Idle {
            self.stats.cycles += 1;
        }
        info!(node = %self.id, from = self.state.label(), why, "SN 回到空闲");
        self.cycle = SensorCycle::default();
        self.set_state(SensorState::Idle, sim, net);
    }

    /// 正在等待其回应的 HN
    fn awaited_head(&self) -> Option<NodeId> {
        match self.state {
            SensorState::WaitPoll | SensorState::WaitCbeacon => self.cycle.head,
            _ => None,
        }
    }

    /// 丢弃；若损坏或不被接受的分组来自正在等待的 HN，则放弃等待回到空闲
    fn reject(&mut self, pkt: &Packet, reason: DropReason, sim: &Simulator, net: &mut dyn MacApi) {
        net.drop_packet(self.id, pkt, reason, sim);
        let falls_back = matches!(reason, DropReason::Corrupted | DropReason::NotEnabled);
        if falls_back && self.awaited_head() == Some(pkt.src) {
            warn!(node = %self.id, head = %pkt.src, reason = reason.code(), "等待中的 HN 发来无法使用的分组");
            self.enter_idle("unusable packet from awaited head", sim, net);
        }
    }

    /// 有数据则回退后发 PROBE，否则按 CBEACON 预算决定等待或结束
    fn begin_probe_round(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        if self.queue.is_empty() {
            self.await_cbeacon_or_idle(sim, net);
            return;
        }
        let ms = self.backoff.draw_ms(self.cycle.t_min_ms, self.cycle.t_max_ms);
        self.cycle.backoff_ms = ms;
        self.timers.cancel(TimerKind::CbeaconWait);
        self.timers.schedule(TimerKind::ProbeBackoff, ms_to_time(ms), sim);
        debug!(node = %self.id, backoff_ms = ms, queued = self.queue.len(), "PROBE 回退");
        self.set_state(SensorState::Backoff, sim, net);
    }

    fn await_cbeacon_or_idle(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        if self.cycle.cbeacon_rx >= self.cycle.max_cbeacon {
            self.enter_idle("cbeacon budget used up", sim, net);
            return;
        }
        self.timers.cancel_all();
        self.timers
            .schedule(TimerKind::CbeaconWait, self.cfg.cbeacon_timeout, sim);
        self.set_state(SensorState::WaitCbeacon, sim, net);
    }

    fn send_probe(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        let Some(head) = self.cycle.head else {
            self.enter_idle("no head node", sim, net);
            return;
        };
        let hdr = Header::Probe(AnnounceHdr {
            num_data: self.queue.len() as u32,
            backoff_ms: self.cycle.backoff_ms,
        });
        let pkt = net.make_packet(self.id, head, hdr);
        info!(node = %self.id, head = %head, num_data = self.queue.len(), "📡 发送 PROBE");
        self.cycle.probe_tx += 1;
        self.stats.probe_tx += 1;
        self.set_state(SensorState::ProbeTx, sim, net);
        net.send(self.id, pkt, sim);
    }

    fn send_data(&mut self, burst: DataBurst, sim: &mut Simulator, net: &mut dyn MacApi) {
        if burst.send_next(self.id, &mut self.queue, |_| {}, sim, net) {
            self.cycle.data_tx += 1;
            self.stats.data_tx += 1;
            self.set_state(SensorState::DataTx(burst), sim, net);
        } else {
            self.finish_data(sim, net);
        }
    }

    fn finish_data(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.cycle.data_sent = true;
        info!(node = %self.id, sent = self.cycle.data_tx, left = self.queue.len(), "✅ DATA 发送完毕");
        self.await_cbeacon_or_idle(sim, net);
    }

    fn on_beacon(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.stats.beacon_rx += 1;
        if pkt.error {
            self.stats.beacon_rx_corrupted += 1;
            self.reject(&pkt, DropReason::Corrupted, sim, net);
            return;
        }
        let Some(b) = pkt.beacon().copied() else {
            return;
        };
        if self.state != SensorState::Idle {
            self.reject(&pkt, DropReason::NotEnabled, sim, net);
            return;
        }
        self.cycle = SensorCycle {
            head: Some(pkt.src),
            t_min_ms: b.t_min_ms,
            t_max_ms: b.t_max_ms,
            max_cbeacon: b.max_cbeacon,
            beacon_rx: 1,
            ..SensorCycle::default()
        };
        debug!(node = %self.id, head = %pkt.src, "收到 BEACON");
        self.begin_probe_round(sim, net);
    }

    fn on_cbeacon(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.stats.cbeacon_rx += 1;
        if pkt.error {
            self.stats.cbeacon_rx_corrupted += 1;
            self.reject(&pkt, DropReason::Corrupted, sim, net);
            return;
        }
        let Some(b) = pkt.beacon().copied() else {
            return;
        };
        let waiting = matches!(self.state, SensorState::WaitCbeacon | SensorState::WaitPoll);
        if !waiting || self.cycle.head != Some(pkt.src) {
            self.reject(&pkt, DropReason::NotEnabled, sim, net);
            return;
        }

        self.timers.cancel(TimerKind::CbeaconWait);
        self.timers.cancel(TimerKind::PollWait);
        self.cycle.cbeacon_rx += 1;
        self.cycle.t_min_ms = b.t_min_ms;
        self.cycle.t_max_ms = b.t_max_ms;
        self.cycle.max_cbeacon = b.max_cbeacon;

        if !self.cycle.data_sent {
            debug!(node = %self.id, n = self.cycle.cbeacon_rx, "收到 CBEACON，重新 PROBE");
            self.begin_probe_round(sim, net);
            return;
        }
        net.drop_packet(self.id, &pkt, DropReason::CbeaconDataAlreadySent, sim);
        self.await_cbeacon_or_idle(sim, net);
    }

    fn on_poll(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        let Some(grant) = pkt.grant().copied() else {
            return;
        };
        let to_me = grant.responder == self.id && pkt.dst.accepts(self.id);
        if to_me {
            self.stats.poll_rx += 1;
        }
        if pkt.error {
            if to_me {
                self.stats.poll_rx_corrupted += 1;
            }
            self.reject(&pkt, DropReason::Corrupted, sim, net);
            return;
        }

        if self.state != SensorState::WaitPoll {
            let reason = if to_me {
                DropReason::NotEnabled
            } else {
                DropReason::WrongReceiver
            };
            self.reject(&pkt, reason, sim, net);
            return;
        }

        if !to_me || self.cycle.head != Some(pkt.src) {
            // HN 正在服务别的 SN：按对方的授权数延长等待
            let grace = self
                .cfg
                .guard_interval
                .saturating_mul(grant.max_data as u64)
                .saturating_add(self.cfg.poll_timeout);
            self.timers.schedule(TimerKind::PollWait, grace, sim);
            trace!(node = %self.id, other = %grant.responder, grace = %grace, "POLL 不是给我的，延长等待");
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }

        self.timers.cancel(TimerKind::PollWait);
        self.cycle.poll_rx += 1;
        let granted = grant.max_data.min(self.queue.len() as u32);
        info!(node = %self.id, head = %pkt.src, granted, "收到 POLL");
        if granted == 0 {
            self.finish_data(sim, net);
            return;
        }
        self.send_data(DataBurst::new(pkt.src, granted), sim, net);
    }
}

impl Node for SensorNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> VizRole {
        VizRole::Sensor
    }

    fn start(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        debug!(node = %self.id, name = %self.name, "SN 启动");
        self.timers.cancel_all();
        self.cycle = SensorCycle::default();
        self.set_state(SensorState::Idle, sim, net);
    }

    fn on_packet(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match pkt.kind() {
            PacketKind::Beacon => self.on_beacon(pkt, sim, net),
            PacketKind::Cbeacon => self.on_cbeacon(pkt, sim, net),
            PacketKind::Poll => self.on_poll(pkt, sim, net),
            PacketKind::Trigger
            | PacketKind::Rts
            | PacketKind::Cts
            | PacketKind::Probe
            | PacketKind::Data => {
                let reason = if pkt.dst.accepts(self.id) {
                    DropReason::CannotReceiveKind
                } else {
                    DropReason::WrongReceiver
                };
                net.drop_packet(self.id, &pkt, reason, sim);
            }
        }
    }

    fn on_tx_end(&mut self, pkt: &Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match (pkt.kind(), self.state) {
            (PacketKind::Probe, SensorState::ProbeTx) => {
                self.timers
                    .schedule(TimerKind::PollWait, self.cfg.poll_timeout, sim);
                self.set_state(SensorState::WaitPoll, sim, net);
            }
            (PacketKind::Data, SensorState::DataTx(mut burst)) => {
                match burst.on_sent(self.queue.len()) {
                    BurstStep::Finished => self.finish_data(sim, net),
                    BurstStep::More => match self.cfg.tx_mode.spacing(self.cfg.data_spacing) {
                        None => self.send_data(burst, sim, net),
                        Some(gap) => {
                            self.timers.schedule(TimerKind::DataSpacing, gap, sim);
                            self.set_state(SensorState::DataSpacing(burst), sim, net);
                        }
                    },
                }
            }
            (kind, state) => {
                trace!(node = %self.id, kind = kind.label(), state = state.label(), "忽略发送结束");
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind, token: u64, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !self.timers.expire(kind, token) {
            trace!(node = %self.id, timer = kind.label(), token, "过期定时器");
            return;
        }
        match (kind, self.state) {
            (TimerKind::ProbeBackoff, SensorState::Backoff) => {
                if self.queue.is_empty() {
                    self.await_cbeacon_or_idle(sim, net);
                } else {
                    self.send_probe(sim, net);
                }
            }
            (TimerKind::PollWait, SensorState::WaitPoll) => {
                self.stats.poll_timeouts += 1;
                warn!(node = %self.id, "⏰ 等 POLL 超时");
                self.enter_idle("poll wait expired", sim, net);
            }
            (TimerKind::CbeaconWait, SensorState::WaitCbeacon) => {
                self.enter_idle("cbeacon wait expired", sim, net);
            }
            (TimerKind::DataSpacing, SensorState::DataSpacing(burst)) => {
                self.send_data(burst, sim, net);
            }
            (kind, state) => {
                debug!(node = %self.id, timer = kind.label(), state = state.label(), "定时器与状态不符，忽略");
            }
        }
    }

    fn on_app_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match self.queue.enqueue(pkt) {
            Ok(()) => self.stats.app_enqueued += 1,
            Err(pkt) => {
                self.stats.app_dropped += 1;
                net.drop_packet(self.id, &pkt, DropReason::BufferFull, sim);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
