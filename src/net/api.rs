//! MAC 层向下/向上的接口
//!
//! 状态机只通过这个 trait 与外界交互：分配分组、交给信道发送、
//! 把 DATA 上交应用层、记录丢弃。`Network` 是真实实现，测试里可以换成记录型的替身。

use crate::mac::DropReason;
use crate::sim::{SimTime, Simulator};

use super::{Header, NodeId, Packet};

pub trait MacApi {
    /// 分配一个新分组（id 全局唯一，大小由头部决定）
    fn make_packet(&mut self, src: NodeId, dst: NodeId, hdr: Header) -> Packet;

    /// 交给调制解调器发送；发送结束时发送方会收到 `on_tx_end`
    fn send(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator);

    fn broadcast(&mut self, from: NodeId, mut pkt: Packet, sim: &mut Simulator) {
        pkt.dst = NodeId::BROADCAST;
        self.send(from, pkt, sim);
    }

    /// 发送 `size_bytes` 所需的时间
    fn tx_duration(&self, size_bytes: u32) -> SimTime;

    /// 把一个正确接收的 DATA 上交应用层
    fn deliver_up(&mut self, at: NodeId, pkt: Packet, sim: &Simulator);

    fn drop_packet(&mut self, at: NodeId, pkt: &Packet, reason: DropReason, sim: &Simulator);

    fn state_changed(&mut self, _at: NodeId, _from: &'static str, _to: &'static str, _sim: &Simulator) {}
}
