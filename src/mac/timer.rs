//! 一次性定时器
//!
//! 每个角色持有一个 `Timers`。到期事件携带令牌，令牌与当前登记不一致
//! （已取消或已被重新调度）的到期直接忽略，因此取消从不需要触碰事件队列。

use std::collections::BTreeMap;

use tracing::trace;

use crate::net::{NetWorld, NodeId};
use crate::sim::{Event, SimTime, Simulator, World};

/// 所有角色用到的定时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// SN：收到 BEACON/CBEACON 后发送 PROBE 前的回退
    ProbeBackoff,
    /// SN：等待 POLL
    PollWait,
    /// SN：等待 CBEACON
    CbeaconWait,
    /// 两个 DATA 之间的固定间隔（SN 与 HN 共用）
    DataSpacing,
    /// HN：空闲时的"开始通信前"定时器，到期后向 SN 发 BEACON
    BeaconStart,
    /// HN：等待 PROBE
    ProbeWait,
    /// HN 等 SN 的 DATA / AUV 等 HN 的 DATA
    DataWait,
    /// HN：收到 TRIGGER 后的回退
    TriggerBackoff,
    /// HN：等待 CTS
    CtsWait,
    /// AUV：发 TRIGGER 前的启动延迟
    TriggerStart,
    /// AUV：等待 RTS
    RtsWait,
    /// AUV（无 RTS/CTS）：等待第一个 DATA
    FirstData,
}

impl TimerKind {
    pub fn label(self) -> &'static str {
        match self {
            TimerKind::ProbeBackoff => "probe-backoff",
            TimerKind::PollWait => "poll-wait",
            TimerKind::CbeaconWait => "cbeacon-wait",
            TimerKind::DataSpacing => "data-spacing",
            TimerKind::BeaconStart => "beacon-start",
            TimerKind::ProbeWait => "probe-wait",
            TimerKind::DataWait => "data-wait",
            TimerKind::TriggerBackoff => "trigger-backoff",
            TimerKind::CtsWait => "cts-wait",
            TimerKind::TriggerStart => "trigger-start",
            TimerKind::RtsWait => "rts-wait",
            TimerKind::FirstData => "first-data",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    token: u64,
    deadline: SimTime,
}

/// 某个节点当前登记的定时器
#[derive(Debug)]
pub struct Timers {
    owner: NodeId,
    next_token: u64,
    armed: BTreeMap<TimerKind, Armed>,
}

impl Timers {
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            next_token: 0,
            armed: BTreeMap::new(),
        }
    }

    /// 在 `delay` 之后触发；同种类已登记的定时器被替换。
    pub fn schedule(&mut self, kind: TimerKind, delay: SimTime, sim: &mut Simulator) -> u64 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        let deadline = sim.now().saturating_add(delay);
        self.armed.insert(kind, Armed { token, deadline });
        trace!(node = %self.owner, timer = kind.label(), token, deadline = %deadline, "定时器启动");
        sim.schedule(
            deadline,
            TimerFired {
                node: self.owner,
                kind,
                token,
            },
        );
        token
    }

    /// 取消；未登记时为空操作
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.armed.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.armed.len();
        self.armed.clear();
        n
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn token(&self, kind: TimerKind) -> Option<u64> {
        self.armed.get(&kind).map(|a| a.token)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<SimTime> {
        self.armed.get(&kind).map(|a| a.deadline)
    }

    pub fn armed(&self) -> impl Iterator<Item = TimerKind> + '_ {
        self.armed.keys().copied()
    }

    /// 到期认领：令牌匹配则注销并返回 true，否则是过期事件。
    pub fn expire(&mut self, kind: TimerKind, token: u64) -> bool {
        match self.armed.get(&kind) {
            Some(a) if a.token == token => {
                self.armed.remove(&kind);
                true
            }
            _ => false,
        }
    }
}

/// 定时器到期事件
#[derive(Debug)]
pub struct TimerFired {
    pub node: NodeId,
    pub kind: TimerKind,
    pub token: u64,
}

impl Event for TimerFired {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TimerFired { node, kind, token } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.fire_timer(node, kind, token, sim);
    }
}
