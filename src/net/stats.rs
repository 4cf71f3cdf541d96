//! 统计信息
//!
//! 信道层面的计数；各角色自己的计数见 `mac::*Stats`。

use std::collections::BTreeMap;

use serde::Serialize;

use super::header::PacketKind;

#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub tx_pkts: BTreeMap<PacketKind, u64>,
    pub rx_pkts: u64,
    pub rx_corrupted: u64,
    pub collisions: u64,
    /// 被丢包规则直接吞掉的接收
    pub lost: u64,
    /// 按丢弃原因短码计数
    pub drops: BTreeMap<&'static str, u64>,
    pub app_delivered: u64,
}

impl Stats {
    pub fn tx_of(&self, kind: PacketKind) -> u64 {
        self.tx_pkts.get(&kind).copied().unwrap_or(0)
    }

    pub fn drops_of(&self, code: &str) -> u64 {
        self.drops.get(code).copied().unwrap_or(0)
    }
}
