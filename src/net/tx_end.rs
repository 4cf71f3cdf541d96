//! 发送结束事件
//!
//! 分组离开发送方调制解调器时回调发送方，用于启动等待类定时器。

use super::id::NodeId;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};

#[derive(Debug)]
pub struct TxEnd {
    pub at: NodeId,
    pub pkt: Packet,
}

impl Event for TxEnd {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TxEnd { at, pkt } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.tx_end(at, pkt, sim);
    }
}

/// 节点启动事件：进入各角色的初始状态
#[derive(Debug)]
pub struct StartNode {
    pub node: NodeId,
}

impl Event for StartNode {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.start_node(self.node, sim);
    }
}
