//! 协议事件记录（用于离线回放）
//!
//! 用结构化 JSON 事件记录发送、接收、丢弃、状态迁移与上交，
//! 仿真结束后一次性写出。

mod types;

pub use types::{VizEvent, VizEventKind, VizLogger, VizNodeInfo, VizRole};
