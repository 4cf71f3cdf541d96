//! 数据包类型
//!
//! 信道上传输的通用分组：MAC 源/目的地址 + UFetch 头 + 信道标记的错误位。

use super::header::{
    AnnounceHdr, BeaconHdr, DataHdr, GrantHdr, Header, PacketKind, TriggerHdr,
};
use super::id::NodeId;

#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    pub src: NodeId,
    pub dst: NodeId,
    pub size_bytes: u32,
    /// 信道判定本次接收已损坏（噪声或碰撞）
    pub error: bool,
    pub hdr: Header,
}

impl Packet {
    pub fn new(id: u64, src: NodeId, dst: NodeId, hdr: Header) -> Self {
        Self {
            id,
            src,
            dst,
            size_bytes: hdr.size_bytes(),
            error: false,
            hdr,
        }
    }

    pub fn kind(&self) -> PacketKind {
        self.hdr.kind()
    }

    pub fn trigger(&self) -> Option<&TriggerHdr> {
        match &self.hdr {
            Header::Trigger(h) => Some(h),
            _ => None,
        }
    }

    /// RTS 或 PROBE 的宣告字段
    pub fn announce(&self) -> Option<&AnnounceHdr> {
        match &self.hdr {
            Header::Rts(h) | Header::Probe(h) => Some(h),
            _ => None,
        }
    }

    /// CTS 或 POLL 的授权字段
    pub fn grant(&self) -> Option<&GrantHdr> {
        match &self.hdr {
            Header::Cts(h) | Header::Poll(h) => Some(h),
            _ => None,
        }
    }

    /// BEACON 或 CBEACON 的字段
    pub fn beacon(&self) -> Option<&BeaconHdr> {
        match &self.hdr {
            Header::Beacon(h) | Header::Cbeacon(h) => Some(h),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&DataHdr> {
        match &self.hdr {
            Header::Data(h) => Some(h),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut DataHdr> {
        match &mut self.hdr {
            Header::Data(h) => Some(h),
            _ => None,
        }
    }
}
