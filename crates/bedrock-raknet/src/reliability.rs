use crate::error::RakNetError;

/// Delivery guarantee attached to every frame, in increasing strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reliability {
    Unreliable = 0,
    /// Newer supersedes older, per channel.
    UnreliableSequenced = 1,
    /// Resent until acknowledged, no ordering.
    Reliable = 2,
    /// Resent until acknowledged, delivered strictly in order per channel.
    ReliableOrdered = 3,
    /// Resent until acknowledged, newer supersedes older per channel.
    ReliableSequenced = 4,
    /// Unreliable, but the sender asks for a delivery receipt.
    UnreliableAck = 5,
}

impl Reliability {
    pub fn from_u8(v: u8) -> Result<Self, RakNetError> {
        match v {
            0 => Ok(Self::Unreliable),
            1 => Ok(Self::UnreliableSequenced),
            2 => Ok(Self::Reliable),
            3 => Ok(Self::ReliableOrdered),
            4 => Ok(Self::ReliableSequenced),
            5 => Ok(Self::UnreliableAck),
            _ => Err(RakNetError::InvalidReliability(v)),
        }
    }

    /// Consumes a reliable index and is kept for resend.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::Reliable | Self::ReliableOrdered | Self::ReliableSequenced
        )
    }

    pub fn is_ordered(self) -> bool {
        self == Self::ReliableOrdered
    }

    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::UnreliableSequenced | Self::ReliableSequenced)
    }

    /// Consumes an order index and channel.
    pub fn is_ordered_or_sequenced(self) -> bool {
        self.is_ordered() || self.is_sequenced()
    }

    /// The sender wants to learn when the frame was acknowledged.
    pub fn wants_receipt(self) -> bool {
        self == Self::UnreliableAck
    }
}

/// When a queued frame is written to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Flush right away.
    Immediate,
    /// Batch with everything else until the next tick.
    #[default]
    Normal,
}
