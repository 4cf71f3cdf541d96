//! 数据汇
//!
//! 记录上交给应用层的 DATA：总数、按原始来源计数、端到端时延。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::net::{NodeId, Packet};
use crate::sim::SimTime;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DataSink {
    pub received: u64,
    /// 原始来源节点 -> 收到的 DATA 数
    pub by_origin: BTreeMap<usize, u64>,
    /// 上交节点 -> 收到的 DATA 数
    pub by_receiver: BTreeMap<usize, u64>,
    pub latency_total_s: f64,
    pub latency_max_s: f64,
}

impl DataSink {
    pub fn record(&mut self, at: NodeId, pkt: &Packet, now: SimTime) {
        self.received += 1;
        *self.by_receiver.entry(at.0).or_default() += 1;
        if let Some(d) = pkt.data() {
            *self.by_origin.entry(d.origin.0).or_default() += 1;
            let lat = now.saturating_sub(d.created_at).as_secs_f64();
            self.latency_total_s += lat;
            self.latency_max_s = self.latency_max_s.max(lat);
        }
    }

    pub fn mean_latency_s(&self) -> Option<f64> {
        (self.received > 0).then(|| self.latency_total_s / self.received as f64)
    }
}
