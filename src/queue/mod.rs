//! 数据队列
//!
//! SN 与 HN 的待发 DATA 队列：有界 FIFO，满时丢弃新到达的分组。

use crate::net::Packet;

mod drop_tail;

pub use drop_tail::DropTailQueue;

/// Packet 队列抽象
pub trait PacketQueue: std::fmt::Debug + Send {
    /// 入队：成功返回 Ok；若被丢弃则返回 Err(pkt)
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet>;
    /// 出队：按 FIFO 返回下一个 packet
    fn dequeue(&mut self) -> Option<Packet>;
    fn front(&self) -> Option<&Packet>;

    fn len(&self) -> usize;
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}
