//! 节点接口
//!
//! 网络把四类输入分派给节点：分组到达、自己的发送结束、定时器到期、上层数据到达。

use std::any::Any;

use super::api::MacApi;
use super::id::NodeId;
use super::packet::Packet;
use crate::mac::TimerKind;
use crate::sim::Simulator;
use crate::viz::VizRole;

pub trait Node: Send {
    /// 获取节点标识符
    fn id(&self) -> NodeId;

    /// 获取节点名称
    fn name(&self) -> &str;

    fn role(&self) -> VizRole;

    /// 仿真开始时进入初始状态
    fn start(&mut self, sim: &mut Simulator, net: &mut dyn MacApi);

    /// 处理接收完成的分组（可能已损坏）
    fn on_packet(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi);

    /// 自己发出的分组已离开调制解调器
    fn on_tx_end(&mut self, pkt: &Packet, sim: &mut Simulator, net: &mut dyn MacApi);

    fn on_timer(&mut self, kind: TimerKind, token: u64, sim: &mut Simulator, net: &mut dyn MacApi);

    /// 上层产生了一个待发的 DATA
    fn on_app_data(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn MacApi);

    fn as_any(&self) -> &dyn Any;
}
