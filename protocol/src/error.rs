//! Error types shared by the codec, the reassembly buffer and response sinks.

use crate::packet::PacketKind;
use thiserror::Error;

/// A datagram that could not be turned into a [`Packet`](crate::Packet).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too small: {len} bytes, need at least {min}")]
    TooSmall { len: usize, min: usize },

    #[error("invalid magic prefix {0:02x?}")]
    BadMagic([u8; 2]),

    /// Expected noise on UDP; callers drop these without surfacing them.
    #[error("checksum mismatch: header says {expected:#010x}, payload hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("invalid header terminator {0:#04x}")]
    BadTerminator(u8),

    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),

    #[error("{0:?} packet is missing its sequence byte")]
    MissingSequence(PacketKind),
}

impl PacketError {
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, PacketError::ChecksumMismatch { .. })
    }
}

/// Fragments that contradict what was already received for a sequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("sequence {sequence}: fragment declares {actual} parts, expected {expected}")]
    TotalMismatch { sequence: u8, expected: u8, actual: u8 },

    #[error("sequence {sequence}: fragment index {index} out of range for {total} parts")]
    IndexOutOfRange { sequence: u8, index: u8, total: u8 },
}

/// Failure delivered to a command's response sink instead of a payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("no complete response for sequence {sequence}")]
    Timeout { sequence: u8 },

    #[error("corrupt response for sequence {sequence}: {reason}")]
    CorruptResponse { sequence: u8, reason: String },

    #[error("session closed before a response arrived")]
    Disconnected,
}

/// What a response sink eventually receives.
pub type CommandResult = Result<Vec<u8>, CommandError>;
