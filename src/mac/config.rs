//! 角色配置
//!
//! 构造角色时一次性给定的固定参数；运行中不变。

use serde::{Deserialize, Serialize};

use crate::net::{NodeId, SOUND_SPEED_MPS};
use crate::sim::SimTime;

/// HN 与 AUV 之间是否使用 RTS/CTS 握手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommMode {
    #[default]
    RtsCts,
    /// TRIGGER 后直接发送 DATA
    Direct,
}

impl CommMode {
    pub fn label(self) -> &'static str {
        match self {
            CommMode::RtsCts => "rts-cts",
            CommMode::Direct => "direct",
        }
    }
}

/// 授权窗口内 DATA 之间是否留固定间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    #[default]
    Spaced,
    /// 上一个 DATA 发送结束立即发送下一个
    Burst,
}

impl TxMode {
    /// 两个 DATA 之间的等待；`Burst` 模式下没有等待
    pub fn spacing(self, gap: SimTime) -> Option<SimTime> {
        match self {
            TxMode::Spaced => Some(gap),
            TxMode::Burst => None,
        }
    }
}

/// 传感节点（SN）参数
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// 本地 DATA 队列容量（分组个数）
    pub buffer_size: usize,
    /// PROBE 发出后等待 POLL 的时长
    pub poll_timeout: SimTime,
    /// 等待 CBEACON 的时长
    pub cbeacon_timeout: SimTime,
    /// 相邻两个 DATA 之间的间隔
    pub data_spacing: SimTime,
    /// 保护间隔（听到发给别人的 POLL 时用于延长等待）
    pub guard_interval: SimTime,
    /// DATA 载荷大小（字节）
    pub payload_bytes: u32,
    pub tx_mode: TxMode,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50,
            poll_timeout: SimTime::from_secs(20),
            cbeacon_timeout: SimTime::from_secs(500),
            data_spacing: SimTime::from_secs(1),
            guard_interval: SimTime::from_secs(1),
            payload_bytes: 125,
            tx_mode: TxMode::Spaced,
        }
    }
}

/// 簇头节点（HN）参数
#[derive(Debug, Clone)]
pub struct HeadNodeConfig {
    /// 空闲时等待 AUV TRIGGER 的时长，超时则开始轮询 SN
    pub start_delay: SimTime,
    /// 与 AUV 的交换结束（或失败）后，下一轮 SN 轮询前的等待；期间不接受 TRIGGER
    pub retry_delay: SimTime,
    /// BEACON/CBEACON 中宣告的 PROBE 回退窗口（毫秒）
    pub probe_backoff_min_ms: u32,
    pub probe_backoff_max_ms: u32,
    /// 一轮中最多记录的 PROBE 数，达到后立即开始 POLL
    pub max_polled_nodes: usize,
    /// 等待 PROBE 的时长
    pub probe_timeout: SimTime,
    /// 一个外层周期内最多发送的 CBEACON 数
    pub max_cbeacon: u32,
    /// 每个 SN 一次最多发送的 DATA 数
    pub max_pck_from_node: u32,
    pub guard_interval: SimTime,
    /// 向 AUV 发送时相邻两个 DATA 之间的间隔
    pub data_spacing: SimTime,
    /// 发出 RTS 后等待 CTS 的时长
    pub cts_timeout: SimTime,
    /// 发往 AUV 的 DATA 队列容量
    pub buffer_size: usize,
    /// 本地应用 DATA 队列容量
    pub local_buffer_size: usize,
    pub payload_bytes: u32,
    pub comm_mode: CommMode,
    pub tx_mode: TxMode,
}

impl Default for HeadNodeConfig {
    fn default() -> Self {
        Self {
            start_delay: SimTime::from_secs(30),
            retry_delay: SimTime::from_secs(15),
            probe_backoff_min_ms: 0,
            probe_backoff_max_ms: 3_000,
            max_polled_nodes: 4,
            probe_timeout: SimTime::from_secs(15),
            max_cbeacon: 2,
            max_pck_from_node: 5,
            guard_interval: SimTime::from_secs(1),
            data_spacing: SimTime::from_secs(1),
            cts_timeout: SimTime::from_secs(20),
            buffer_size: 100,
            local_buffer_size: 50,
            payload_bytes: 125,
            comm_mode: CommMode::RtsCts,
            tx_mode: TxMode::Spaced,
        }
    }
}

/// AUV 参数
#[derive(Debug, Clone)]
pub struct AuvConfig {
    /// 回到空闲后发送 TRIGGER 前的延迟
    pub trigger_start_delay: SimTime,
    /// TRIGGER 中宣告的 HN 回退窗口（毫秒）
    pub backoff_min_ms: u32,
    pub backoff_max_ms: u32,
    /// 等待 RTS 的时长
    pub rts_timeout: SimTime,
    pub guard_interval: SimTime,
    /// 一次交换最多想收的 DATA 数
    pub max_data_wanted: u32,
    pub payload_bytes: u32,
    pub comm_mode: CommMode,
    /// 无 RTS/CTS 模式下轮流单播 TRIGGER 的 HN 列表
    pub head_nodes: Vec<NodeId>,
    /// AUV 与 HN 之间往返时延的估计
    pub rtt_estimate: SimTime,
}

impl Default for AuvConfig {
    fn default() -> Self {
        Self {
            trigger_start_delay: SimTime::from_secs(10),
            backoff_min_ms: 0,
            backoff_max_ms: 3_000,
            rts_timeout: SimTime::from_secs(10),
            guard_interval: SimTime::from_secs(1),
            max_data_wanted: 10,
            payload_bytes: 125,
            comm_mode: CommMode::RtsCts,
            head_nodes: Vec::new(),
            // 按 AUV 与 HN 之间最大 4000 m 估计
            rtt_estimate: SimTime::from_secs_f64(4_000.0 / SOUND_SPEED_MPS),
        }
    }
}

/// 等待 `expected` 个 DATA 的窗口：expected × (单包发送时长 + 保护间隔 + RTT)
pub fn data_window(expected: u32, t_data: SimTime, guard: SimTime, rtt: SimTime) -> SimTime {
    t_data
        .saturating_add(guard)
        .saturating_add(rtt)
        .saturating_mul(expected as u64)
}
