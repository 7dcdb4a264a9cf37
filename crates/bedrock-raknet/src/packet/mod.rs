//! Wire layouts of every datagram the transport sends or receives.

pub mod ack;
pub mod frame;
pub mod offline;
pub mod online;

/// Bit 7 of the first byte: set on connected datagrams (FrameSet, ACK, NACK).
pub const VALID_FLAG: u8 = 0x80;
/// Bit 6: set on ACK datagrams.
pub const ACK_FLAG: u8 = 0x40;
/// Bit 5: set on NACK datagrams.
pub const NACK_FLAG: u8 = 0x20;

/// Kind of a datagram, from its header byte alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramKind {
    Offline,
    FrameSet,
    Ack,
    Nack,
}

impl DatagramKind {
    pub fn classify(header: u8) -> Self {
        if header & VALID_FLAG == 0 {
            Self::Offline
        } else if header & ACK_FLAG != 0 {
            Self::Ack
        } else if header & NACK_FLAG != 0 {
            Self::Nack
        } else {
            Self::FrameSet
        }
    }
}
