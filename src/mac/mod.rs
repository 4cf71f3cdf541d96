//! UFetch MAC
//!
//! 三个角色的状态机（SN、HN、AUV）以及它们共用的定时器、回退、丢弃原因与配置。

mod auv;
mod backoff;
mod burst;
mod config;
mod drop;
pub mod head;
mod sensor;
mod timer;

pub use auv::{Auv, AuvCycle, AuvIdleReason, AuvState, AuvStats};
pub use backoff::Backoff;
pub use burst::{BurstStep, DataBurst};
pub use config::{AuvConfig, CommMode, HeadNodeConfig, SensorConfig, TxMode, data_window};
pub use drop::DropReason;
pub use head::{HeadIdleReason, HeadNode, HeadState, HeadStats};
pub use sensor::{SensorCycle, SensorNode, SensorState, SensorStats};
pub use timer::{TimerFired, TimerKind, Timers};
