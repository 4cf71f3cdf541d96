//! DropTail（尾丢弃）队列
//!
//! 容量按分组个数计；队列已满时直接拒绝新到达的 packet，已排队的分组不受影响。

use std::collections::VecDeque;

use crate::net::Packet;

use super::PacketQueue;

#[derive(Debug)]
pub struct DropTailQueue {
    max_pkts: usize,
    q: VecDeque<Packet>,
}

impl DropTailQueue {
    pub fn new(max_pkts: usize) -> Self {
        Self {
            max_pkts,
            q: VecDeque::new(),
        }
    }

    /// 把 `other` 中的分组按序搬入本队列，直到本队列满；返回搬动个数。
    pub fn absorb(&mut self, other: &mut DropTailQueue) -> usize {
        let mut moved = 0;
        while !self.is_full() {
            let Some(pkt) = other.dequeue() else {
                break;
            };
            self.q.push_back(pkt);
            moved += 1;
        }
        moved
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.q.iter()
    }
}

impl PacketQueue for DropTailQueue {
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        if self.q.len() >= self.max_pkts {
            return Err(pkt);
        }
        self.q.push_back(pkt);
        Ok(())
    }

    fn dequeue(&mut self) -> Option<Packet> {
        self.q.pop_front()
    }

    fn front(&self) -> Option<&Packet> {
        self.q.front()
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn capacity(&self) -> usize {
        self.max_pkts
    }
}
