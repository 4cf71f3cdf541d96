//! 水声信道
//!
//! 共享介质：每次发送都会被覆盖范围内的所有节点听到。
//! 传播时延 = 距离 / 声速；发送时长 = ceil(bits / bitrate)。
//! 损坏来源：随机误包率、同一接收端的接收区间重叠（碰撞）、脚本化丢包规则。

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::header::PacketKind;
use super::id::NodeId;
use crate::sim::SimTime;

/// 水下声速（m/s）
pub const SOUND_SPEED_MPS: f64 = 1500.0;

/// 节点位置（米）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 声速（m/s）
    pub sound_speed_mps: f64,
    /// 调制解调器比特率（bps）
    pub bitrate_bps: u64,
    /// 最大通信距离（米）；None 表示所有节点互相可达
    pub range_m: Option<f64>,
    /// 每次接收独立的随机误包率
    pub packet_error_rate: f64,
    /// 是否把重叠的接收判为碰撞
    pub collisions: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            sound_speed_mps: SOUND_SPEED_MPS,
            bitrate_bps: 4_800,
            range_m: None,
            packet_error_rate: 0.0,
            collisions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossEffect {
    /// 接收端完全听不到
    Drop,
    /// 接收端收到但标记为损坏
    Corrupt,
}

/// 脚本化丢包规则：按 (发送方, 接收方, 分组种类) 过滤，None 表示任意。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossRule {
    #[serde(default)]
    pub from: Option<usize>,
    #[serde(default)]
    pub to: Option<usize>,
    #[serde(default)]
    pub kind: Option<PacketKind>,
    pub effect: LossEffect,
    /// 生效次数；None 表示一直生效
    #[serde(default)]
    pub count: Option<u32>,
}

impl LossRule {
    pub fn new(effect: LossEffect) -> Self {
        Self {
            from: None,
            to: None,
            kind: None,
            effect,
            count: None,
        }
    }

    pub fn from(mut self, n: NodeId) -> Self {
        self.from = Some(n.0);
        self
    }

    pub fn to(mut self, n: NodeId) -> Self {
        self.to = Some(n.0);
        self
    }

    pub fn kind(mut self, k: PacketKind) -> Self {
        self.kind = Some(k);
        self
    }

    pub fn times(mut self, n: u32) -> Self {
        self.count = Some(n);
        self
    }

    fn matches(&self, from: NodeId, to: NodeId, kind: PacketKind) -> bool {
        self.count != Some(0)
            && self.from.is_none_or(|f| f == from.0)
            && self.to.is_none_or(|t| t == to.0)
            && self.kind.is_none_or(|k| k == kind)
    }
}

/// 单次接收在信道上的命运
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxFate {
    Lost,
    Corrupted,
    Clean,
}

#[derive(Debug, Clone, Copy)]
struct Reception {
    tx_id: u64,
    start: SimTime,
    end: SimTime,
}

#[derive(Debug)]
pub struct AcousticChannel {
    pub cfg: ChannelConfig,
    positions: Vec<Position>,
    busy_until: Vec<SimTime>,
    rules: Vec<LossRule>,
    rng: StdRng,
    receptions: HashMap<NodeId, Vec<Reception>>,
    collided: HashSet<(NodeId, u64)>,
}

impl Default for AcousticChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default(), 0)
    }
}

impl AcousticChannel {
    pub fn new(cfg: ChannelConfig, seed: u64) -> Self {
        Self {
            cfg,
            positions: Vec::new(),
            busy_until: Vec::new(),
            rules: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            receptions: HashMap::new(),
            collided: HashSet::new(),
        }
    }

    pub(crate) fn add_node(&mut self, pos: Position) {
        self.positions.push(pos);
        self.busy_until.push(SimTime::ZERO);
    }

    pub fn add_rule(&mut self, rule: LossRule) {
        self.rules.push(rule);
    }

    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.positions.get(id.0).copied()
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn in_range(&self, a: NodeId, b: NodeId) -> bool {
        match (self.cfg.range_m, self.position(a), self.position(b)) {
            (Some(r), Some(pa), Some(pb)) => pa.distance(&pb) <= r,
            (None, Some(_), Some(_)) => true,
            _ => false,
        }
    }

    /// 传播时延 = 距离 / 声速
    pub fn propagation_delay(&self, a: NodeId, b: NodeId) -> SimTime {
        let (Some(pa), Some(pb)) = (self.position(a), self.position(b)) else {
            return SimTime::ZERO;
        };
        if self.cfg.sound_speed_mps <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime::from_secs_f64(pa.distance(&pb) / self.cfg.sound_speed_mps)
    }

    /// 计算发送指定字节数所需的时间
    pub fn tx_time(&self, bytes: u32) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.cfg.bitrate_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bps = self.cfg.bitrate_bps as u128;
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128) + (bps - 1)) / bps;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }

    /// 为 `from` 预约一次发送，返回 (开始, 结束)。同一节点的发送串行化。
    pub(crate) fn reserve_tx(&mut self, from: NodeId, now: SimTime, bytes: u32) -> (SimTime, SimTime) {
        let tx = self.tx_time(bytes);
        let Some(busy) = self.busy_until.get_mut(from.0) else {
            return (now, now.saturating_add(tx));
        };
        let start = now.max(*busy);
        let depart = start.saturating_add(tx);
        *busy = depart;
        (start, depart)
    }

    /// 先匹配脚本规则，再按误包率抽样。
    pub(crate) fn fate(&mut self, from: NodeId, to: NodeId, kind: PacketKind) -> RxFate {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.matches(from, to, kind)) {
            if let Some(n) = rule.count.as_mut() {
                *n -= 1;
            }
            debug!(from = %from, to = %to, kind = kind.label(), effect = ?rule.effect, "命中丢包规则");
            return match rule.effect {
                LossEffect::Drop => RxFate::Lost,
                LossEffect::Corrupt => RxFate::Corrupted,
            };
        }
        let per = self.cfg.packet_error_rate;
        if per > 0.0 && self.rng.gen_bool(per.min(1.0)) {
            return RxFate::Corrupted;
        }
        RxFate::Clean
    }

    /// 登记一次接收区间；与同一接收端上尚未结束的接收重叠则双方都记为碰撞。
    pub(crate) fn register_reception(
        &mut self,
        to: NodeId,
        tx_id: u64,
        start: SimTime,
        end: SimTime,
        now: SimTime,
    ) -> bool {
        let list = self.receptions.entry(to).or_default();
        list.retain(|r| r.end >= now);
        let mut hit = false;
        if self.cfg.collisions {
            for r in list.iter() {
                if r.start < end && start < r.end {
                    trace!(to = %to, tx_id, other = r.tx_id, "接收区间重叠");
                    self.collided.insert((to, r.tx_id));
                    hit = true;
                }
            }
            if hit {
                self.collided.insert((to, tx_id));
            }
        }
        list.push(Reception { tx_id, start, end });
        hit
    }

    /// 接收结束时查询（并清除）碰撞标记
    pub(crate) fn take_collided(&mut self, to: NodeId, tx_id: u64) -> bool {
        self.collided.remove(&(to, tx_id))
    }
}
