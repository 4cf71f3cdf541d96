use serde::{Deserialize, Serialize};

use crate::net::PacketKind;

/// 可视化事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VizEventKind {
    /// 节点与位置（建议作为 t=0 的第一条事件）
    Meta { nodes: Vec<VizNodeInfo> },
    /// 分组交给调制解调器（序列化开始）
    Tx {
        pkt_kind: PacketKind,
        dst: Option<usize>,
        size_bytes: u32,
        depart_ns: u64,
    },
    /// 分组到达 MAC（接收结束）
    Rx {
        pkt_kind: PacketKind,
        src: usize,
        corrupted: bool,
    },
    /// MAC 丢弃分组，`reason` 为短码（DRE/DNE/DWR ...）
    Drop { pkt_kind: PacketKind, reason: String },
    /// 状态机迁移
    State { from: String, to: String },
    /// DATA 上交给应用层
    Deliver {
        origin: usize,
        seq: u64,
        latency_ns: u64,
    },
}

/// 节点角色（用于可视化区分 AUV/HN/SN）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizRole {
    Auv,
    HeadNode,
    Sensor,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizNodeInfo {
    pub id: usize,
    pub name: String,
    pub role: VizRole,
    /// 位置（米）
    pub pos: [f64; 3],
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    pub node: Option<usize>,
    pub pkt_id: Option<u64>,
    #[serde(flatten)]
    pub kind: VizEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct VizLogger {
    pub events: Vec<VizEvent>,
}

impl VizLogger {
    pub fn push(&mut self, ev: VizEvent) {
        self.events.push(ev);
    }

    pub fn count(&self, pred: impl Fn(&VizEventKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }
}
