//! HN 与 AUV 之间的一次交换
//!
//! 两种做法，构造 HN 时选定：
//! - `RtsCtsLeg`：TRIGGER -> 回退 -> RTS -> 等 CTS -> 按 CTS 授权发送 DATA
//! - `DirectLeg`：TRIGGER -> 回退 -> 按 TRIGGER 中的数量直接发送 DATA

use std::fmt;

use tracing::{debug, info, warn};

use crate::mac::backoff::Backoff;
use crate::mac::burst::{BurstStep, DataBurst};
use crate::mac::config::{CommMode, HeadNodeConfig};
use crate::mac::drop::DropReason;
use crate::mac::timer::{TimerKind, Timers};
use crate::net::{AnnounceHdr, Header, MacApi, NodeId, Packet, PacketKind, TriggerHdr, ms_to_time};
use crate::queue::{DropTailQueue, PacketQueue};
use crate::sim::Simulator;

use super::HeadStats;

/// 交换期间可以借用的 HN 资源
pub struct UplinkCtx<'a> {
    pub id: NodeId,
    pub cfg: &'a HeadNodeConfig,
    pub queue: &'a mut DropTailQueue,
    pub timers: &'a mut Timers,
    pub backoff: &'a mut Backoff,
    pub stats: &'a mut HeadStats,
    /// 转发给 AUV 的 DATA 重新编号
    pub next_seq: &'a mut u64,
}

/// 交换结束的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkOutcome {
    AllSent,
    CtsTimeout,
    CorruptedCts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegStep {
    Busy,
    Done(UplinkOutcome),
}

/// 一次交换内的计数，HN 回到空闲时清零
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UplinkCycle {
    pub auv: Option<NodeId>,
    pub trigger_rx: u32,
    pub backoff_ms: u32,
    pub rts_tx: u32,
    pub cts_rx: u32,
    pub granted: u32,
    pub data_tx: u32,
}

pub trait AuvLeg: Send + fmt::Debug {
    fn mode(&self) -> CommMode;

    /// 当前阶段的名字，作为 HN 的状态名
    fn label(&self) -> &'static str;

    fn cycle(&self) -> &UplinkCycle;

    fn reset(&mut self);

    /// 接受一个有效 TRIGGER；调用方保证待发队列非空
    fn on_trigger(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        auv: NodeId,
        trigger: TriggerHdr,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep;

    fn on_packet(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep;

    fn on_tx_end(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep;

    fn on_timer(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        kind: TimerKind,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep;
}

pub fn leg_for(mode: CommMode) -> Box<dyn AuvLeg> {
    match mode {
        CommMode::RtsCts => Box::new(RtsCtsLeg::default()),
        CommMode::Direct => Box::new(DirectLeg::default()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Inactive,
    Backoff,
    RtsTx,
    WaitCts,
    DataTx(DataBurst),
    DataSpacing(DataBurst),
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Inactive => "uplink",
            Phase::Backoff => "uplink-backoff",
            Phase::RtsTx => "rts-tx",
            Phase::WaitCts => "wait-cts",
            Phase::DataTx(_) => "uplink-data-tx",
            Phase::DataSpacing(_) => "uplink-data-spacing",
        }
    }
}

/// 两种做法共用的部分：TRIGGER 回退与 DATA 发送环
#[derive(Debug, Default)]
struct LegCore {
    phase: Phase,
    cycle: UplinkCycle,
    trigger: Option<TriggerHdr>,
}

impl LegCore {
    fn reset(&mut self) {
        *self = LegCore::default();
    }

    fn begin_backoff(&mut self, ctx: &mut UplinkCtx<'_>, auv: NodeId, trigger: TriggerHdr, sim: &mut Simulator) {
        let ms = ctx.backoff.draw_ms(trigger.t_min_ms, trigger.t_max_ms);
        self.cycle.auv = Some(auv);
        self.cycle.trigger_rx += 1;
        self.cycle.backoff_ms = ms;
        self.trigger = Some(trigger);
        ctx.timers
            .schedule(TimerKind::TriggerBackoff, ms_to_time(ms), sim);
        debug!(node = %ctx.id, auv = %auv, backoff_ms = ms, "TRIGGER 回退");
        self.phase = Phase::Backoff;
    }

    fn begin_data(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        granted: u32,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        let Some(auv) = self.cycle.auv else {
            return self.finish();
        };
        self.cycle.granted = granted;
        info!(node = %ctx.id, auv = %auv, granted, queued = ctx.queue.len(), "开始向 AUV 发送 DATA");
        if granted == 0 {
            return self.finish();
        }
        self.send_or_finish(ctx, DataBurst::new(auv, granted), sim, net)
    }

    fn send_or_finish(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        burst: DataBurst,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        let seq = *ctx.next_seq;
        let retag = |p: &mut Packet| {
            if let Some(d) = p.data_mut() {
                d.seq = seq;
            }
        };
        if burst.send_next(ctx.id, ctx.queue, retag, sim, net) {
            *ctx.next_seq += 1;
            self.cycle.data_tx += 1;
            ctx.stats.data_tx += 1;
            self.phase = Phase::DataTx(burst);
            LegStep::Busy
        } else {
            self.finish()
        }
    }

    fn finish(&mut self) -> LegStep {
        self.phase = Phase::Inactive;
        LegStep::Done(UplinkOutcome::AllSent)
    }

    fn data_tx_end(&mut self, ctx: &mut UplinkCtx<'_>, sim: &mut Simulator, net: &mut dyn MacApi) -> LegStep {
        let Phase::DataTx(mut burst) = self.phase else {
            return LegStep::Busy;
        };
        match burst.on_sent(ctx.queue.len()) {
            BurstStep::Finished => self.finish(),
            BurstStep::More => match ctx.cfg.tx_mode.spacing(ctx.cfg.data_spacing) {
                None => self.send_or_finish(ctx, burst, sim, net),
                Some(gap) => {
                    ctx.timers.schedule(TimerKind::DataSpacing, gap, sim);
                    self.phase = Phase::DataSpacing(burst);
                    LegStep::Busy
                }
            },
        }
    }

    fn spacing_end(&mut self, ctx: &mut UplinkCtx<'_>, sim: &mut Simulator, net: &mut dyn MacApi) -> LegStep {
        let Phase::DataSpacing(burst) = self.phase else {
            return LegStep::Busy;
        };
        self.send_or_finish(ctx, burst, sim, net)
    }
}

/// RTS/CTS 握手
#[derive(Debug, Default)]
pub struct RtsCtsLeg {
    core: LegCore,
}

impl RtsCtsLeg {
    fn send_rts(&mut self, ctx: &mut UplinkCtx<'_>, sim: &mut Simulator, net: &mut dyn MacApi) -> LegStep {
        let Some(auv) = self.core.cycle.auv else {
            return self.core.finish();
        };
        let hdr = Header::Rts(AnnounceHdr {
            num_data: ctx.queue.len() as u32,
            backoff_ms: self.core.cycle.backoff_ms,
        });
        let pkt = net.make_packet(ctx.id, auv, hdr);
        info!(node = %ctx.id, auv = %auv, num_data = ctx.queue.len(), "📡 发送 RTS");
        self.core.cycle.rts_tx += 1;
        ctx.stats.rts_tx += 1;
        self.core.phase = Phase::RtsTx;
        net.send(ctx.id, pkt, sim);
        LegStep::Busy
    }
}

impl AuvLeg for RtsCtsLeg {
    fn mode(&self) -> CommMode {
        CommMode::RtsCts
    }

    fn label(&self) -> &'static str {
        self.core.phase.label()
    }

    fn cycle(&self) -> &UplinkCycle {
        &self.core.cycle
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn on_trigger(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        auv: NodeId,
        trigger: TriggerHdr,
        sim: &mut Simulator,
        _net: &mut dyn MacApi,
    ) -> LegStep {
        self.core.begin_backoff(ctx, auv, trigger, sim);
        LegStep::Busy
    }

    fn on_packet(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        if pkt.kind() != PacketKind::Cts || self.core.phase != Phase::WaitCts {
            let reason = if pkt.error {
                DropReason::Corrupted
            } else {
                DropReason::NotEnabled
            };
            net.drop_packet(ctx.id, pkt, reason, sim);
            return LegStep::Busy;
        }
        if pkt.error {
            ctx.stats.cts_rx_corrupted += 1;
            net.drop_packet(ctx.id, pkt, DropReason::Corrupted, sim);
            if self.core.cycle.auv == Some(pkt.src) {
                warn!(node = %ctx.id, auv = %pkt.src, "CTS 损坏，放弃本次交换");
                ctx.timers.cancel(TimerKind::CtsWait);
                self.core.phase = Phase::Inactive;
                return LegStep::Done(UplinkOutcome::CorruptedCts);
            }
            return LegStep::Busy;
        }
        let Some(grant) = pkt.grant().copied() else {
            return LegStep::Busy;
        };
        if grant.responder != ctx.id {
            debug!(node = %ctx.id, responder = %grant.responder, "CTS 给了别的 HN");
            net.drop_packet(ctx.id, pkt, DropReason::WrongReceiver, sim);
            return LegStep::Busy;
        }
        ctx.timers.cancel(TimerKind::CtsWait);
        self.core.cycle.cts_rx += 1;
        ctx.stats.cts_rx += 1;
        let granted = grant.max_data.min(ctx.queue.len() as u32);
        self.core.begin_data(ctx, granted, sim, net)
    }

    fn on_tx_end(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        match (pkt.kind(), self.core.phase) {
            (PacketKind::Rts, Phase::RtsTx) => {
                ctx.timers
                    .schedule(TimerKind::CtsWait, ctx.cfg.cts_timeout, sim);
                self.core.phase = Phase::WaitCts;
                LegStep::Busy
            }
            (PacketKind::Data, Phase::DataTx(_)) => self.core.data_tx_end(ctx, sim, net),
            _ => LegStep::Busy,
        }
    }

    fn on_timer(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        kind: TimerKind,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        match (kind, self.core.phase) {
            (TimerKind::TriggerBackoff, Phase::Backoff) => self.send_rts(ctx, sim, net),
            (TimerKind::CtsWait, Phase::WaitCts) => {
                warn!(node = %ctx.id, "⏰ 等 CTS 超时");
                self.core.phase = Phase::Inactive;
                LegStep::Done(UplinkOutcome::CtsTimeout)
            }
            (TimerKind::DataSpacing, Phase::DataSpacing(_)) => self.core.spacing_end(ctx, sim, net),
            _ => LegStep::Busy,
        }
    }
}

/// 不握手：回退结束后直接发送
#[derive(Debug, Default)]
pub struct DirectLeg {
    core: LegCore,
}

impl AuvLeg for DirectLeg {
    fn mode(&self) -> CommMode {
        CommMode::Direct
    }

    fn label(&self) -> &'static str {
        self.core.phase.label()
    }

    fn cycle(&self) -> &UplinkCycle {
        &self.core.cycle
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn on_trigger(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        auv: NodeId,
        trigger: TriggerHdr,
        sim: &mut Simulator,
        _net: &mut dyn MacApi,
    ) -> LegStep {
        self.core.begin_backoff(ctx, auv, trigger, sim);
        LegStep::Busy
    }

    fn on_packet(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        let reason = if pkt.error {
            DropReason::Corrupted
        } else {
            DropReason::NotEnabled
        };
        net.drop_packet(ctx.id, pkt, reason, sim);
        LegStep::Busy
    }

    fn on_tx_end(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        match (pkt.kind(), self.core.phase) {
            (PacketKind::Data, Phase::DataTx(_)) => self.core.data_tx_end(ctx, sim, net),
            _ => LegStep::Busy,
        }
    }

    fn on_timer(
        &mut self,
        ctx: &mut UplinkCtx<'_>,
        kind: TimerKind,
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> LegStep {
        match (kind, self.core.phase) {
            (TimerKind::TriggerBackoff, Phase::Backoff) => {
                let wanted = self.core.trigger.map(|t| t.max_data_wanted).unwrap_or(0);
                let granted = wanted.min(ctx.queue.len() as u32);
                self.core.begin_data(ctx, granted, sim, net)
            }
            (TimerKind::DataSpacing, Phase::DataSpacing(_)) => self.core.spacing_end(ctx, sim, net),
            _ => LegStep::Busy,
        }
    }
}
