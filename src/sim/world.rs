//! 世界 trait
//!
//! 事件通过 `as_any_mut` 向下转型拿到具体世界（例如 `NetWorld`）。

use super::simulator::Simulator;
use std::any::Any;

/// 仿真世界：由业务层实现（例如水声信道与各节点）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
