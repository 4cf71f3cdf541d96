//! 数据包交付事件
//!
//! 接收结束时刻把分组交给接收节点的 MAC。

use super::id::NodeId;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：把一个 packet 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    /// 所属那次发送的编号
    pub tx_id: u64,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    #[tracing::instrument(level = "debug", skip(self, sim, world), fields(pkt_id = self.pkt.id, kind = self.pkt.kind().label(), to = %self.to))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, tx_id, pkt } = *self;
        trace!(src = %pkt.src, dst = %pkt.dst, error = pkt.error, now = %sim.now(), "📨 接收结束");
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, tx_id, pkt, sim);
    }
}
