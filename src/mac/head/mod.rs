//! 簇头节点（HN）MAC
//!
//! HN 同时扮演两个角色：
//! - 对下：用 BEACON / PROBE / POLL / CBEACON 轮询簇内 SN，把收到的 DATA 存入待发队列
//! - 对上：响应 AUV 的 TRIGGER，把待发队列中的 DATA 交给 AUV（见 `uplink`）
//!
//! 空闲时先等 `start_delay` 看 AUV 是否来取数据，超时后开始对下轮询。
//! 与 AUV 交换结束（或失败）后改等 `retry_delay`，其间不再接受 TRIGGER。

use std::any::Any;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::config::{CommMode, HeadNodeConfig};
use super::drop::DropReason;
use super::timer::{TimerKind, Timers};
use crate::net::{MacApi, Node, NodeId, Packet, PacketKind};
use crate::queue::{DropTailQueue, PacketQueue};
use crate::sim::Simulator;
use crate::viz::VizRole;

mod cluster;
mod uplink;

pub use cluster::{ClusterCycle, ProbedNode};
pub use uplink::{
    AuvLeg, DirectLeg, LegStep, RtsCtsLeg, UplinkCtx, UplinkCycle, UplinkOutcome, leg_for,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadState {
    Idle { accept_trigger: bool },
    BeaconTx,
    WaitProbes,
    PollTx,
    WaitData {
        polled: NodeId,
        expected: u32,
        received: u32,
    },
    CbeaconTx,
    /// 与 AUV 交换中，细分阶段由 `AuvLeg` 维护
    Uplink,
}

impl HeadState {
    pub fn label(&self) -> &'static str {
        match self {
            HeadState::Idle { .. } => "idle",
            HeadState::BeaconTx => "beacon-tx",
            HeadState::WaitProbes => "wait-probes",
            HeadState::PollTx => "poll-tx",
            HeadState::WaitData { .. } => "wait-data",
            HeadState::CbeaconTx => "cbeacon-tx",
            HeadState::Uplink => "uplink",
        }
    }
}

/// 上一次回到空闲的原因；决定下一次空闲等多久、是否接受 TRIGGER
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadIdleReason {
    Startup,
    /// 一轮对下轮询（含全部 CBEACON）结束
    CycleComplete,
    TriggerNoData,
    UplinkDone,
    CorruptedTrigger,
    CtsTimeout,
    CorruptedCts,
}

impl HeadIdleReason {
    pub fn label(self) -> &'static str {
        match self {
            HeadIdleReason::Startup => "startup",
            HeadIdleReason::CycleComplete => "cycle-complete",
            HeadIdleReason::TriggerNoData => "trigger-no-data",
            HeadIdleReason::UplinkDone => "uplink-done",
            HeadIdleReason::CorruptedTrigger => "corrupted-trigger",
            HeadIdleReason::CtsTimeout => "cts-timeout",
            HeadIdleReason::CorruptedCts => "corrupted-cts",
        }
    }

    /// 这些情况下先服务 SN，暂不理会 AUV
    pub fn holds_off_auv(self) -> bool {
        matches!(
            self,
            HeadIdleReason::TriggerNoData
                | HeadIdleReason::UplinkDone
                | HeadIdleReason::CorruptedTrigger
                | HeadIdleReason::CtsTimeout
        )
    }
}

impl From<UplinkOutcome> for HeadIdleReason {
    fn from(o: UplinkOutcome) -> Self {
        match o {
            UplinkOutcome::AllSent => HeadIdleReason::UplinkDone,
            UplinkOutcome::CtsTimeout => HeadIdleReason::CtsTimeout,
            UplinkOutcome::CorruptedCts => HeadIdleReason::CorruptedCts,
        }
    }
}

/// 累计计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeadStats {
    pub beacon_tx: u64,
    pub cbeacon_tx: u64,
    pub probe_rx: u64,
    pub probe_rx_corrupted: u64,
    pub poll_tx: u64,
    pub data_rx: u64,
    pub data_rx_corrupted: u64,
    pub data_timeouts: u64,
    pub trigger_rx: u64,
    pub trigger_rx_corrupted: u64,
    pub rts_tx: u64,
    pub cts_rx: u64,
    pub cts_rx_corrupted: u64,
    pub cts_timeouts: u64,
    pub data_tx: u64,
    pub uplinks_done: u64,
    pub app_enqueued: u64,
    pub buffer_drops: u64,
    pub cycles: u64,
}

#[derive(Debug)]
pub struct HeadNode {
    id: NodeId,
    name: String,
    cfg: HeadNodeConfig,
    state: HeadState,
    cluster: ClusterCycle,
    /// 本地应用产生、尚未并入待发队列的 DATA
    local_q: DropTailQueue,
    /// 待交给 AUV 的 DATA
    uplink_q: DropTailQueue,
    timers: Timers,
    backoff: Backoff,
    leg: Box<dyn AuvLeg>,
    stats: HeadStats,
    next_seq: u64,
    last_idle: HeadIdleReason,
}

impl HeadNode {
    pub fn new(id: NodeId, name: impl Into<String>, cfg: HeadNodeConfig, seed: Option<u64>) -> Self {
        Self {
            id,
            name: name.into(),
            local_q: DropTailQueue::new(cfg.local_buffer_size),
            uplink_q: DropTailQueue::new(cfg.buffer_size),
            leg: leg_for(cfg.comm_mode),
            cfg,
            state: HeadState::Idle {
                accept_trigger: true,
            },
            cluster: ClusterCycle::default(),
            timers: Timers::new(id),
            backoff: Backoff::new(id, seed),
            stats: HeadStats::default(),
            next_seq: 0,
            last_idle: HeadIdleReason::Startup,
        }
    }

    pub fn state(&self) -> HeadState {
        self.state
    }

    pub fn state_label(&self) -> &'static str {
        match self.state {
            HeadState::Uplink => self.leg.label(),
            s => s.label(),
        }
    }

    pub fn cluster(&self) -> &ClusterCycle {
        &self.cluster
    }

    pub fn uplink_cycle(&self) -> &UplinkCycle {
        self.leg.cycle()
    }

    pub fn comm_mode(&self) -> CommMode {
        self.leg.mode()
    }

    pub fn stats(&self) -> &HeadStats {
        &self.stats
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn last_idle(&self) -> HeadIdleReason {
        self.last_idle
    }

    pub fn uplink_len(&self) -> usize {
        self.uplink_q.len()
    }

    pub fn local_len(&self) -> usize {
        self.local_q.len()
    }

    /// 待发 DATA 的原始来源（按队列顺序）
    pub fn uplink_origins(&self) -> Vec<NodeId> {
        self.uplink_q
            .iter()
            .filter_map(|p| p.data().map(|d| d.origin))
            .collect()
    }

    fn set_state(&mut self, next: HeadState, sim: &Simulator, net: &mut dyn MacApi) {
        let from = self.state_label();
        self.state = next;
        let to = self.state_label();
        if from != to {
            net.state_changed(self.id, from, to, sim);
        }
    }

    fn drain_local(&mut self) {
        let moved = self.uplink_q.absorb(&mut self.local_q);
        if moved > 0 {
            trace!(node = %self.id, moved, queued = self.uplink_q.len(), "本地 DATA 并入待发队列");
        }
    }

    fn enter_idle(&mut self, reason: HeadIdleReason, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.timers.cancel_all();
        self.leg.reset();
        self.cluster = ClusterCycle::default();
        self.drain_local();
        if reason != HeadIdleReason::Startup {
            self.stats.cycles += 1;
        }
        self.last_idle = reason;

        let (delay, accept_trigger) = if reason.holds_off_auv() {
            (self.cfg.retry_delay, false)
        } else {
            (self.cfg.start_delay, true)
        };
        self.timers.schedule(TimerKind::BeaconStart, delay, sim);
        info!(
            node = %self.id,
            reason = reason.label(),
            wait = %delay,
            accept_trigger,
            queued = self.uplink_q.len(),
            "HN 回到空闲"
        );
        self.set_state(HeadState::Idle { accept_trigger }, sim, net);
    }

    // 同时借出交换策略与它要用的资源
    fn leg_ctx(&mut self) -> (&mut Box<dyn AuvLeg>, UplinkCtx<'_>) {
        (
            &mut self.leg,
            UplinkCtx {
                id: self.id,
                cfg: &self.cfg,
                queue: &mut self.uplink_q,
                timers: &mut self.timers,
                backoff: &mut self.backoff,
                stats: &mut self.stats,
                next_seq: &mut self.next_seq,
            },
        )
    }

    fn apply_leg(&mut self, before: &'static str, step: LegStep, sim: &mut Simulator, net: &mut dyn MacApi) {
        match step {
            LegStep::Busy => {
                let after = self.state_label();
                if before != after {
                    net.state_changed(self.id, before, after, sim);
                }
            }
            LegStep::Done(outcome) => {
                match outcome {
                    UplinkOutcome::AllSent => self.stats.uplinks_done += 1,
                    UplinkOutcome::CtsTimeout => self.stats.cts_timeouts += 1,
                    UplinkOutcome::CorruptedCts => {}
                }
                info!(
                    node = %self.id,
                    outcome = ?outcome,
                    sent = self.leg.cycle().data_tx,
                    left = self.uplink_q.len(),
                    "与 AUV 的交换结束"
                );
                // 只有发完授权的 DATA 才回到 CBEACON 分支，失败一律回空闲
                let resume = std::mem::take(&mut self.cluster.resume_cbeacon);
                if resume && outcome == UplinkOutcome::AllSent {
                    self.leg.reset();
                    self.timers.cancel_all();
                    self.after_cluster_round(sim, net);
                } else {
                    self.enter_idle(outcome.into(), sim, net);
                }
            }
        }
    }

    fn on_trigger(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !pkt.dst.accepts(self.id) {
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }
        self.stats.trigger_rx += 1;
        let interleaved = self.state == HeadState::WaitProbes
            && self.cluster.after_cbeacon
            && self.cluster.probed.is_empty();
        let idle_ready = self.state
            == HeadState::Idle {
                accept_trigger: true,
            };

        if pkt.error {
            self.stats.trigger_rx_corrupted += 1;
            net.drop_packet(self.id, &pkt, DropReason::Corrupted, sim);
            if idle_ready {
                warn!(node = %self.id, auv = %pkt.src, "TRIGGER 损坏");
                self.enter_idle(HeadIdleReason::CorruptedTrigger, sim, net);
            }
            return;
        }
        if !(idle_ready || interleaved) {
            net.drop_packet(self.id, &pkt, DropReason::NotEnabled, sim);
            return;
        }
        let Some(trigger) = pkt.trigger().copied() else {
            return;
        };

        self.drain_local();
        if self.uplink_q.is_empty() {
            net.drop_packet(self.id, &pkt, DropReason::NoPendingData, sim);
            if idle_ready {
                self.enter_idle(HeadIdleReason::TriggerNoData, sim, net);
            }
            return;
        }

        self.timers.cancel(TimerKind::BeaconStart);
        self.timers.cancel(TimerKind::ProbeWait);
        self.cluster.resume_cbeacon = interleaved;
        info!(node = %self.id, auv = %pkt.src, queued = self.uplink_q.len(), interleaved, "收到 TRIGGER");

        let before = self.state_label();
        self.state = HeadState::Uplink;
        let step = {
            let (leg, mut ctx) = self.leg_ctx();
            leg.on_trigger(&mut ctx, pkt.src, trigger, sim, net)
        };
        self.apply_leg(before, step, sim, net);
    }
}

impl Node for HeadNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> VizRole {
        VizRole::HeadNode
    }

    fn start(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        debug!(node = %self.id, name = %self.name, mode = self.leg.mode().label(), "HN 启动");
        self.enter_idle(HeadIdleReason::Startup, sim, net);
    }

    fn on_packet(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match pkt.kind() {
            PacketKind::Trigger => self.on_trigger(pkt, sim, net),
            PacketKind::Probe => self.on_probe(pkt, sim, net),
            PacketKind::Data => self.on_data(pkt, sim, net),
            PacketKind::Cts if self.state == HeadState::Uplink && pkt.dst.accepts(self.id) => {
                let before = self.state_label();
                let step = {
                    let (leg, mut ctx) = self.leg_ctx();
                    leg.on_packet(&mut ctx, &pkt, sim, net)
                };
                self.apply_leg(before, step, sim, net);
            }
            PacketKind::Cts => {
                let reason = if !pkt.dst.accepts(self.id) {
                    DropReason::WrongReceiver
                } else if pkt.error {
                    DropReason::Corrupted
                } else {
                    DropReason::NotEnabled
                };
                net.drop_packet(self.id, &pkt, reason, sim);
            }
            PacketKind::Rts | PacketKind::Beacon | PacketKind::Poll | PacketKind::Cbeacon => {
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
        if self.state == HeadState::Uplink {
            let before = self.state_label();
            let step = {
                let (leg, mut ctx) = self.leg_ctx();
                leg.on_tx_end(&mut ctx, pkt, sim, net)
            };
            self.apply_leg(before, step, sim, net);
            return;
        }
        self.on_cluster_tx_end(pkt, sim, net);
    }

    fn on_timer(&mut self, kind: TimerKind, token: u64, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !self.timers.expire(kind, token) {
            trace!(node = %self.id, timer = kind.label(), token, "过期定时器");
            return;
        }
        if self.state == HeadState::Uplink {
            let before = self.state_label();
            let step = {
                let (leg, mut ctx) = self.leg_ctx();
                leg.on_timer(&mut ctx, kind, sim, net)
            };
            self.apply_leg(before, step, sim, net);
            return;
        }
        self.on_cluster_timer(kind, sim, net);
    }

    fn on_app_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match self.local_q.enqueue(pkt) {
            Ok(()) => self.stats.app_enqueued += 1,
            Err(pkt) => {
                self.stats.buffer_drops += 1;
                net.drop_packet(self.id, &pkt, DropReason::BufferFull, sim);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
