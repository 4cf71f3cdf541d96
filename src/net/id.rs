//! 标识符类型
//!
//! 节点标识符同时充当 MAC 地址。

use std::fmt;

/// 节点标识符（MAC 地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// 广播地址：所有在覆盖范围内的节点都会处理。
    pub const BROADCAST: NodeId = NodeId(usize::MAX);

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// 目的地址是否包含 `me`（单播给我或广播）
    pub fn accepts(self, me: NodeId) -> bool {
        self == me || self.is_broadcast()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            f.write_str("*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
