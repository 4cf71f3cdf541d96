//! 上层应用
//!
//! 传感节点上的恒定速率数据源，以及接收 `deliver` 的数据汇。

mod cbr;
mod sink;

pub use cbr::{AppGenerate, CbrTraffic};
pub use sink::DataSink;
