//! 恒定速率（CBR）数据源
//!
//! 周期性地在某节点产生一个 DATA 分组并交给它的 MAC。

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::net::{DataHdr, Header, MacApi, NetWorld, NodeId};
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CbrTraffic {
    /// 产生间隔（秒）
    pub period_s: f64,
    /// 第一个分组的产生时刻（秒）
    #[serde(default)]
    pub start_s: f64,
    /// 产生总数；None 表示不限
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub payload_bytes: Option<u32>,
}

impl CbrTraffic {
    pub fn every(period_s: f64) -> Self {
        Self {
            period_s,
            start_s: 0.0,
            count: None,
            payload_bytes: None,
        }
    }

    /// 构造第一个生成事件
    pub fn first_event(&self, node: NodeId, default_payload: u32) -> (SimTime, AppGenerate) {
        (
            SimTime::from_secs_f64(self.start_s),
            AppGenerate {
                node,
                period: SimTime::from_secs_f64(self.period_s),
                remaining: self.count,
                payload_bytes: self.payload_bytes.unwrap_or(default_payload),
                next_seq: 0,
            },
        )
    }
}

/// 事件：在 `node` 产生一个 DATA，然后按周期重新调度
#[derive(Debug)]
pub struct AppGenerate {
    pub node: NodeId,
    pub period: SimTime,
    pub remaining: Option<u64>,
    pub payload_bytes: u32,
    pub next_seq: u64,
}

impl Event for AppGenerate {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let mut ev = *self;
        if ev.remaining == Some(0) {
            return;
        }
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");

        let hdr = Header::Data(DataHdr {
            origin: ev.node,
            seq: ev.next_seq,
            payload_bytes: ev.payload_bytes,
            created_at: sim.now(),
        });
        let pkt = w.net.make_packet(ev.node, NodeId::BROADCAST, hdr);
        trace!(node = %ev.node, seq = ev.next_seq, "应用层产生 DATA");
        w.net.app_data(ev.node, pkt, sim);

        ev.next_seq += 1;
        ev.remaining = ev.remaining.map(|n| n - 1);
        if ev.remaining != Some(0) && ev.period > SimTime::ZERO {
            sim.schedule_in(ev.period, ev);
        }
    }
}
