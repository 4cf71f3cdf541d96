//! 授权窗口内的 DATA 发送环
//!
//! SN 回应 POLL、HN 回应 CTS（或直接回应 TRIGGER）时共用：
//! 每发完一个 DATA 再决定是否继续，发送数不超过 min(队列长度, 授权数)。

use crate::net::{MacApi, NodeId, Packet};
use crate::queue::{DropTailQueue, PacketQueue};
use crate::sim::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBurst {
    pub peer: NodeId,
    pub granted: u32,
    pub sent: u32,
}

/// 一个 DATA 发送结束后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstStep {
    More,
    Finished,
}

impl DataBurst {
    pub fn new(peer: NodeId, granted: u32) -> Self {
        Self {
            peer,
            granted,
            sent: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.sent >= self.granted
    }

    /// 从队首取一个分组发给 `peer`；窗口已满或队列为空时返回 false
    pub fn send_next(
        &self,
        from: NodeId,
        queue: &mut DropTailQueue,
        prepare: impl FnOnce(&mut Packet),
        sim: &mut Simulator,
        net: &mut dyn MacApi,
    ) -> bool {
        if self.is_done() {
            return false;
        }
        let Some(mut pkt) = queue.dequeue() else {
            return false;
        };
        pkt.src = from;
        pkt.dst = self.peer;
        pkt.error = false;
        prepare(&mut pkt);
        net.send(from, pkt, sim);
        true
    }

    /// 记一次发送完成
    pub fn on_sent(&mut self, queue_len: usize) -> BurstStep {
        self.sent += 1;
        if self.is_done() || queue_len == 0 {
            BurstStep::Finished
        } else {
            BurstStep::More
        }
    }
}
