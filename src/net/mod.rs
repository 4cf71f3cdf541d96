//! 水声网络模块
//!
//! 共享信道、分组与头部、节点接口，以及把事件分派给节点的 `Network`。

// 子模块声明
mod api;
mod channel;
mod deliver_packet;
mod header;
mod id;
mod net_world;
mod network;
mod node;
mod packet;
mod stats;
mod tx_end;

// 重新导出公共接口
pub use api::MacApi;
pub use channel::{
    AcousticChannel, ChannelConfig, LossEffect, LossRule, Position, RxFate, SOUND_SPEED_MPS,
};
pub use deliver_packet::DeliverPacket;
pub use header::{
    AnnounceHdr, BeaconHdr, DataHdr, GrantHdr, Header, PacketKind, TriggerHdr, ms_to_time,
};
pub use id::NodeId;
pub use net_world::NetWorld;
pub use network::Network;
pub use node::Node;
pub use packet::Packet;
pub use stats::Stats;
pub use tx_end::{StartNode, TxEnd};
