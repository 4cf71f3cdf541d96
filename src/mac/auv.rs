//! AUV MAC
//!
//! AUV 周期性地发 TRIGGER 向 HN 索取数据：
//!
//! ```text
//! RTS/CTS:  IDLE -> TRIGGER -> 等 RTS -> CTS -> 等 DATA -> IDLE
//! 直接发送: IDLE -> TRIGGER（轮流单播给各 HN）-> 等 DATA -> IDLE
//! ```
//!
//! 一次只服务一个 HN：等 RTS 时第一个有效 RTS 胜出，其后的 RTS 不被接受。

use std::any::Any;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::config::{AuvConfig, CommMode, data_window};
use super::drop::DropReason;
use super::timer::{TimerKind, Timers};
use crate::net::{GrantHdr, Header, MacApi, Node, NodeId, Packet, PacketKind, TriggerHdr};
use crate::sim::{SimTime, Simulator};
use crate::viz::VizRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuvState {
    Idle,
    TriggerTx,
    WaitRts,
    CtsTx,
    WaitData,
}

impl AuvState {
    pub fn label(&self) -> &'static str {
        match self {
            AuvState::Idle => "idle",
            AuvState::TriggerTx => "trigger-tx",
            AuvState::WaitRts => "wait-rts",
            AuvState::CtsTx => "cts-tx",
            AuvState::WaitData => "wait-data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuvIdleReason {
    Startup,
    AllReceived,
    RtsTimeout,
    /// 等 DATA 超时（直接发送模式下也包括被服务的 HN 没发 DATA 就转去轮询 SN）
    DataTimeout,
    /// 直接发送模式：HN 发完手里不足授权数的 DATA 后转去轮询 SN
    HeadReturned,
}

impl AuvIdleReason {
    pub fn label(self) -> &'static str {
        match self {
            AuvIdleReason::Startup => "startup",
            AuvIdleReason::AllReceived => "all-received",
            AuvIdleReason::RtsTimeout => "rts-timeout",
            AuvIdleReason::DataTimeout => "data-timeout",
            AuvIdleReason::HeadReturned => "head-returned",
        }
    }
}

/// 一次交换内的上下文与计数，回到空闲时清零
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuvCycle {
    /// 当前服务的 HN
    pub head: Option<NodeId>,
    pub expected: u32,
    pub received: u32,
    pub trigger_tx: u32,
    pub rts_rx: u32,
    pub rts_num_data: u32,
    pub rts_backoff_ms: u32,
    pub cts_tx: u32,
    pub data_rx: u32,
}

/// 累计计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuvStats {
    pub trigger_tx: u64,
    pub rts_rx: u64,
    pub rts_rx_corrupted: u64,
    pub cts_tx: u64,
    pub data_rx: u64,
    pub data_rx_corrupted: u64,
    /// HN -> 从它那里收到的正确 DATA 数
    pub data_by_head: BTreeMap<usize, u64>,
    pub exchanges_done: u64,
    pub rts_timeouts: u64,
    pub data_timeouts: u64,
}

#[derive(Debug)]
pub struct Auv {
    id: NodeId,
    name: String,
    cfg: AuvConfig,
    state: AuvState,
    cycle: AuvCycle,
    timers: Timers,
    stats: AuvStats,
    next_head: usize,
    last_idle: AuvIdleReason,
}

impl Auv {
    pub fn new(id: NodeId, name: impl Into<String>, cfg: AuvConfig) -> Self {
        Self {
            id,
            name: name.into(),
            cfg,
            state: AuvState::Idle,
            cycle: AuvCycle::default(),
            timers: Timers::new(id),
            stats: AuvStats::default(),
            next_head: 0,
            last_idle: AuvIdleReason::Startup,
        }
    }

    pub fn state(&self) -> AuvState {
        self.state
    }

    pub fn cycle(&self) -> &AuvCycle {
        &self.cycle
    }

    pub fn stats(&self) -> &AuvStats {
        &self.stats
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn last_idle(&self) -> AuvIdleReason {
        self.last_idle
    }

    fn set_state(&mut self, next: AuvState, sim: &Simulator, net: &mut dyn MacApi) {
        let from = self.state.label();
        self.state = next;
        if from != next.label() {
            net.state_changed(self.id, from, next.label(), sim);
        }
    }

    fn data_window(&self, expected: u32, net: &dyn MacApi) -> SimTime {
        let t_data = net.tx_duration(self.cfg.payload_bytes);
        data_window(expected, t_data, self.cfg.guard_interval, self.cfg.rtt_estimate)
    }

    fn enter_idle(&mut self, reason: AuvIdleReason, sim: &mut Simulator, net: &mut dyn MacApi) {
        self.timers.cancel_all();
        info!(
            node = %self.id,
            reason = reason.label(),
            head = ?self.cycle.head,
            received = self.cycle.received,
            expected = self.cycle.expected,
            "AUV 回到空闲"
        );
        self.cycle = AuvCycle::default();
        self.last_idle = reason;
        self.set_state(AuvState::Idle, sim, net);

        if matches!(reason, AuvIdleReason::DataTimeout | AuvIdleReason::HeadReturned) {
            self.send_trigger(sim, net);
        } else {
            self.timers
                .schedule(TimerKind::TriggerStart, self.cfg.trigger_start_delay, sim);
        }
    }

    fn send_trigger(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        let dst = match self.cfg.comm_mode {
            CommMode::Direct if !self.cfg.head_nodes.is_empty() => {
                let target = self.cfg.head_nodes[self.next_head % self.cfg.head_nodes.len()];
                self.next_head = (self.next_head + 1) % self.cfg.head_nodes.len();
                self.cycle.head = Some(target);
                target
            }
            _ => NodeId::BROADCAST,
        };
        let hdr = Header::Trigger(TriggerHdr {
            t_min_ms: self.cfg.backoff_min_ms,
            t_max_ms: self.cfg.backoff_max_ms,
            max_data_wanted: self.cfg.max_data_wanted,
        });
        let pkt = net.make_packet(self.id, dst, hdr);
        info!(node = %self.id, dst = %dst, mode = self.cfg.comm_mode.label(), "🐟 发送 TRIGGER");
        self.cycle.trigger_tx += 1;
        self.stats.trigger_tx += 1;
        self.set_state(AuvState::TriggerTx, sim, net);
        net.send(self.id, pkt, sim);
    }

    fn on_rts(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !pkt.dst.accepts(self.id) {
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }
        self.stats.rts_rx += 1;
        if pkt.error {
            self.stats.rts_rx_corrupted += 1;
            net.drop_packet(self.id, &pkt, DropReason::Corrupted, sim);
            return;
        }
        let Some(ann) = pkt.announce().copied() else {
            return;
        };
        if self.state != AuvState::WaitRts {
            net.drop_packet(self.id, &pkt, DropReason::NotEnabled, sim);
            return;
        }

        self.timers.cancel(TimerKind::RtsWait);
        let expected = ann.num_data.min(self.cfg.max_data_wanted);
        self.cycle.head = Some(pkt.src);
        self.cycle.rts_rx += 1;
        self.cycle.rts_num_data = ann.num_data;
        self.cycle.rts_backoff_ms = ann.backoff_ms;
        self.cycle.expected = expected;
        info!(node = %self.id, head = %pkt.src, num_data = ann.num_data, expected, "收到 RTS");

        let hdr = Header::Cts(GrantHdr {
            max_data: expected,
            responder: pkt.src,
        });
        let cts = net.make_packet(self.id, pkt.src, hdr);
        self.cycle.cts_tx += 1;
        self.stats.cts_tx += 1;
        self.set_state(AuvState::CtsTx, sim, net);
        net.send(self.id, cts, sim);
    }

    fn on_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        if !pkt.dst.accepts(self.id) {
            net.drop_packet(self.id, &pkt, DropReason::WrongReceiver, sim);
            return;
        }
        self.stats.data_rx += 1;
        // 没有 HN 列表时 TRIGGER 是广播的，第一个送 DATA 的 HN 就是本次服务对象
        if self.state == AuvState::WaitData
            && self.cfg.comm_mode == CommMode::Direct
            && self.cycle.head.is_none()
        {
            self.cycle.head = Some(pkt.src);
            debug!(node = %self.id, head = %pkt.src, "广播 TRIGGER 后接受首个发送 DATA 的 HN");
        }
        if self.state != AuvState::WaitData || self.cycle.head != Some(pkt.src) {
            let reason = if pkt.error {
                DropReason::Corrupted
            } else {
                DropReason::NotEnabled
            };
            if pkt.error {
                self.stats.data_rx_corrupted += 1;
            }
            net.drop_packet(self.id, &pkt, reason, sim);
            return;
        }

        self.timers.cancel(TimerKind::FirstData);
        self.cycle.received += 1;
        self.cycle.data_rx += 1;
        let head = pkt.src;
        if pkt.error {
            self.stats.data_rx_corrupted += 1;
            net.drop_packet(self.id, &pkt, DropReason::Corrupted, sim);
        } else {
            *self.stats.data_by_head.entry(head.0).or_default() += 1;
            trace!(node = %self.id, head = %head, origin = ?pkt.data().map(|d| d.origin), "收到 DATA");
            net.deliver_up(self.id, pkt, sim);
        }

        if self.cycle.received >= self.cycle.expected {
            self.stats.exchanges_done += 1;
            info!(node = %self.id, head = %head, received = self.cycle.received, "✅ 本次交换完成");
            self.enter_idle(AuvIdleReason::AllReceived, sim, net);
        }
    }

    /// 直接发送模式：正在服务的 HN 又开始对下轮询，说明它没有数据给我
    fn head_went_back(&self, pkt: &Packet) -> bool {
        self.cfg.comm_mode == CommMode::Direct
            && self.state == AuvState::WaitData
            && self.cycle.head == Some(pkt.src)
            && matches!(
                pkt.kind(),
                PacketKind::Beacon | PacketKind::Poll | PacketKind::Cbeacon
            )
    }
}

impl Node for Auv {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> VizRole {
        VizRole::Auv
    }

    fn start(&mut self, sim: &mut Simulator, net: &mut dyn MacApi) {
        debug!(node = %self.id, name = %self.name, mode = self.cfg.comm_mode.label(), "AUV 启动");
        self.enter_idle(AuvIdleReason::Startup, sim, net);
    }

    fn on_packet(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match pkt.kind() {
            PacketKind::Rts => self.on_rts(pkt, sim, net),
            PacketKind::Data => self.on_data(pkt, sim, net),
            PacketKind::Trigger
            | PacketKind::Cts
            | PacketKind::Beacon
            | PacketKind::Probe
            | PacketKind::Poll
            | PacketKind::Cbeacon => {
                let back = !pkt.error && self.head_went_back(&pkt);
                let reason = if pkt.dst.accepts(self.id) {
                    DropReason::CannotReceiveKind
                } else {
                    DropReason::WrongReceiver
                };
                net.drop_packet(self.id, &pkt, reason, sim);
                if back && self.cycle.received > 0 {
                    info!(node = %self.id, head = %pkt.src, received = self.cycle.received, "✅ HN 已发完手里的 DATA");
                    self.stats.exchanges_done += 1;
                    self.enter_idle(AuvIdleReason::HeadReturned, sim, net);
                } else if back {
                    warn!(node = %self.id, head = %pkt.src, kind = pkt.kind().label(), "HN 转去轮询 SN，放弃等待");
                    self.stats.data_timeouts += 1;
                    self.enter_idle(AuvIdleReason::DataTimeout, sim, net);
                }
            }
        }
    }

    fn on_tx_end(&mut self, pkt: &Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        match (pkt.kind(), self.state) {
            (PacketKind::Trigger, AuvState::TriggerTx) => match self.cfg.comm_mode {
                CommMode::RtsCts => {
                    self.timers
                        .schedule(TimerKind::RtsWait, self.cfg.rts_timeout, sim);
                    self.set_state(AuvState::WaitRts, sim, net);
                }
                CommMode::Direct => {
                    let expected = self.cfg.max_data_wanted;
                    let window = self.data_window(expected, net);
                    self.cycle.expected = expected;
                    self.timers.schedule(TimerKind::DataWait, window, sim);
                    self.timers.schedule(
                        TimerKind::FirstData,
                        SimTime(window.0 / 8),
                        sim,
                    );
                    self.set_state(AuvState::WaitData, sim, net);
                }
            },
            (PacketKind::Cts, AuvState::CtsTx) => {
                if self.cycle.expected == 0 {
                    self.enter_idle(AuvIdleReason::AllReceived, sim, net);
                    return;
                }
                let window = self.data_window(self.cycle.expected, net);
                self.timers.schedule(TimerKind::DataWait, window, sim);
                debug!(node = %self.id, window = %window, "等待 HN 的 DATA");
                self.set_state(AuvState::WaitData, sim, net);
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
            (TimerKind::TriggerStart, AuvState::Idle) => self.send_trigger(sim, net),
            (TimerKind::RtsWait, AuvState::WaitRts) => {
                warn!(node = %self.id, "⏰ 等 RTS 超时");
                self.stats.rts_timeouts += 1;
                self.enter_idle(AuvIdleReason::RtsTimeout, sim, net);
            }
            (TimerKind::DataWait | TimerKind::FirstData, AuvState::WaitData) => {
                warn!(node = %self.id, timer = kind.label(), received = self.cycle.received, "⏰ 等 DATA 超时");
                self.stats.data_timeouts += 1;
                self.enter_idle(AuvIdleReason::DataTimeout, sim, net);
            }
            (kind, state) => {
                debug!(node = %self.id, timer = kind.label(), state = state.label(), "定时器与状态不符，忽略");
            }
        }
    }

    fn on_app_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi) {
        net.drop_packet(self.id, &pkt, DropReason::CannotReceiveKind, sim);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
