//! UFetch 分组头
//!
//! 六种控制分组加一种 DATA 分组。回退时间在头部里以毫秒整数携带，
//! 接收方负责换算成仿真时间。

use serde::{Deserialize, Serialize};

use super::id::NodeId;
use crate::sim::SimTime;

/// 分组种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Trigger,
    Rts,
    Cts,
    Beacon,
    Probe,
    Poll,
    Cbeacon,
    Data,
}

impl PacketKind {
    pub const ALL: [PacketKind; 8] = [
        PacketKind::Trigger,
        PacketKind::Rts,
        PacketKind::Cts,
        PacketKind::Beacon,
        PacketKind::Probe,
        PacketKind::Poll,
        PacketKind::Cbeacon,
        PacketKind::Data,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PacketKind::Trigger => "TRIGGER",
            PacketKind::Rts => "RTS",
            PacketKind::Cts => "CTS",
            PacketKind::Beacon => "BEACON",
            PacketKind::Probe => "PROBE",
            PacketKind::Poll => "POLL",
            PacketKind::Cbeacon => "CBEACON",
            PacketKind::Data => "DATA",
        }
    }
}

/// TRIGGER：AUV 请求 HN 开始一轮交换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerHdr {
    pub t_min_ms: u32,
    pub t_max_ms: u32,
    pub max_data_wanted: u32,
}

/// RTS / PROBE：宣告待发 DATA 数量与所用回退时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceHdr {
    pub num_data: u32,
    pub backoff_ms: u32,
}

/// CTS / POLL：授予发送窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantHdr {
    pub max_data: u32,
    pub responder: NodeId,
}

/// BEACON / CBEACON：开启（或延续）一轮轮询
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconHdr {
    pub t_min_ms: u32,
    pub t_max_ms: u32,
    pub max_cbeacon: u32,
}

/// DATA：应用载荷，携带原始来源 SN 以便在 AUV 侧记账
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHdr {
    pub origin: NodeId,
    pub seq: u64,
    pub payload_bytes: u32,
    pub created_at: SimTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Trigger(TriggerHdr),
    Rts(AnnounceHdr),
    Cts(GrantHdr),
    Beacon(BeaconHdr),
    Probe(AnnounceHdr),
    Poll(GrantHdr),
    Cbeacon(BeaconHdr),
    Data(DataHdr),
}

impl Header {
    pub fn kind(&self) -> PacketKind {
        match self {
            Header::Trigger(_) => PacketKind::Trigger,
            Header::Rts(_) => PacketKind::Rts,
            Header::Cts(_) => PacketKind::Cts,
            Header::Beacon(_) => PacketKind::Beacon,
            Header::Probe(_) => PacketKind::Probe,
            Header::Poll(_) => PacketKind::Poll,
            Header::Cbeacon(_) => PacketKind::Cbeacon,
            Header::Data(_) => PacketKind::Data,
        }
    }

    /// 头部字段按 32 位整数计；DATA 以载荷大小计。
    pub fn size_bytes(&self) -> u32 {
        match self {
            Header::Trigger(_) | Header::Beacon(_) | Header::Cbeacon(_) => 12,
            Header::Rts(_) | Header::Probe(_) | Header::Cts(_) | Header::Poll(_) => 8,
            Header::Data(d) => d.payload_bytes,
        }
    }
}

/// 毫秒整数 -> 仿真时间
pub fn ms_to_time(ms: u32) -> SimTime {
    SimTime::from_millis(ms as u64)
}
