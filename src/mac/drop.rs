//! 丢弃原因
//!
//! 接收方拒绝一个分组时给出的类型化原因；短码与日志/统计中的键一致。

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Error)]
pub enum DropReason {
    #[error("packet corrupted on the channel")]
    Corrupted,
    #[error("not enabled to receive this packet in the current state")]
    NotEnabled,
    #[error("packet addressed to another node")]
    WrongReceiver,
    #[error("data queue is full")]
    BufferFull,
    #[error("CBEACON received but data already sent in this cycle")]
    CbeaconDataAlreadySent,
    #[error("this role cannot receive this packet kind")]
    CannotReceiveKind,
    #[error("TRIGGER received with no data pending for the AUV")]
    NoPendingData,
}

impl DropReason {
    pub fn code(self) -> &'static str {
        match self {
            DropReason::Corrupted => "DRE",
            DropReason::NotEnabled => "DNE",
            DropReason::WrongReceiver => "DWR",
            DropReason::BufferFull => "DBF",
            DropReason::CbeaconDataAlreadySent => "DCDAT",
            DropReason::CannotReceiveKind => "CNRP",
            DropReason::NoPendingData => "DND",
        }
    }
}
