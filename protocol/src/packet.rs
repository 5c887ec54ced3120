//! Wire format for BattlEye RCon datagrams.
//!
//! Every packet shares the same fixed header:
//!
//! ```text
//! +-----+-----+----------------+------+------+-------------+
//! | 'B' | 'E' | crc32 (u32 LE) | 0xFF | type | body ...    |
//! +-----+-----+----------------+------+------+-------------+
//! ```
//!
//! The checksum is a standard IEEE CRC-32 over everything after the checksum
//! field, starting at the `0xFF` terminator. Bodies by type:
//!
//! - `0x00` login: password on the way out, a single result byte on the way back.
//! - `0x01` command: sequence byte, then either the message or, for multi-part
//!   responses, `MULTI_PACKET_MARKER`, fragment count, fragment index and the
//!   fragment payload.
//! - `0x02` server message: sequence byte and the message. The client acks by
//!   echoing the sequence byte with an empty message.

use crate::error::PacketError;

pub const MAGIC: [u8; 2] = *b"BE";
pub const HEADER_TERMINATOR: u8 = 0xFF;

/// Magic, checksum, terminator and type byte.
pub const HEADER_SIZE: usize = 8;

/// Byte following the sequence number in a multi-part command response.
pub const MULTI_PACKET_MARKER: u8 = 0x00;

pub const LOGIN_SUCCESS: u8 = 0x01;
pub const LOGIN_FAILURE: u8 = 0x00;

const CHECKSUM_RANGE: std::ops::Range<usize> = 2..6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Login = 0x00,
    Command = 0x01,
    ServerMessage = 0x02,
}

impl PacketKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PacketKind::Login),
            0x01 => Some(PacketKind::Command),
            0x02 => Some(PacketKind::ServerMessage),
            _ => None,
        }
    }
}

/// Position of a command-response fragment within its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    pub total: u8,
    pub index: u8,
}

/// A datagram that passed checksum validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    /// Present on command and server-message packets.
    pub sequence: Option<u8>,
    /// Present on multi-part command responses.
    pub fragment: Option<FragmentInfo>,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Result of a login response: `Some(true)` when the password was accepted.
    pub fn login_result(&self) -> Option<bool> {
        match (self.kind, self.payload.as_slice()) {
            (PacketKind::Login, [result]) => Some(*result == LOGIN_SUCCESS),
            _ => None,
        }
    }
}

pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

fn build_packet(kind: PacketKind, body: &[&[u8]]) -> Vec<u8> {
    let body_len: usize = body.iter().map(|part| part.len()).sum();
    let mut packet = Vec::with_capacity(HEADER_SIZE + body_len);

    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&[0; 4]);
    packet.push(HEADER_TERMINATOR);
    packet.push(kind as u8);
    for part in body {
        packet.extend_from_slice(part);
    }

    let crc = checksum(&packet[CHECKSUM_RANGE.end..]);
    packet[CHECKSUM_RANGE].copy_from_slice(&crc.to_le_bytes());
    packet
}

pub fn build_login_packet(password: &str) -> Vec<u8> {
    build_packet(PacketKind::Login, &[password.as_bytes()])
}

/// A command request. An empty payload is the keep-alive heartbeat.
pub fn build_command_packet(sequence: u8, payload: &[u8]) -> Vec<u8> {
    build_packet(PacketKind::Command, &[&[sequence], payload])
}

/// Acknowledges the server message carrying `sequence`.
pub fn build_ack_packet(sequence: u8) -> Vec<u8> {
    build_packet(PacketKind::ServerMessage, &[&[sequence]])
}

/// Server side of the handshake.
pub fn build_login_response(success: bool) -> Vec<u8> {
    let result = if success { LOGIN_SUCCESS } else { LOGIN_FAILURE };
    build_packet(PacketKind::Login, &[&[result]])
}

/// One part of a multi-part command response, as the server sends it.
pub fn build_fragment_packet(sequence: u8, total: u8, index: u8, payload: &[u8]) -> Vec<u8> {
    build_packet(
        PacketKind::Command,
        &[&[sequence, MULTI_PACKET_MARKER, total, index], payload],
    )
}

pub fn build_server_message_packet(sequence: u8, message: &[u8]) -> Vec<u8> {
    build_packet(PacketKind::ServerMessage, &[&[sequence], message])
}

/// Validates and decodes a datagram.
///
/// Length and magic are checked first, then the checksum, and only then is
/// anything past the header interpreted.
pub fn parse_packet(data: &[u8]) -> Result<Packet, PacketError> {
    if data.len() < HEADER_SIZE {
        return Err(PacketError::TooSmall {
            len: data.len(),
            min: HEADER_SIZE,
        });
    }

    if data[..2] != MAGIC {
        return Err(PacketError::BadMagic([data[0], data[1]]));
    }

    let expected = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
    let actual = checksum(&data[CHECKSUM_RANGE.end..]);
    if expected != actual {
        return Err(PacketError::ChecksumMismatch { expected, actual });
    }

    if data[6] != HEADER_TERMINATOR {
        return Err(PacketError::BadTerminator(data[6]));
    }

    let kind = PacketKind::from_byte(data[7]).ok_or(PacketError::UnknownType(data[7]))?;
    let body = &data[HEADER_SIZE..];

    if kind == PacketKind::Login {
        return Ok(Packet {
            kind,
            sequence: None,
            fragment: None,
            payload: body.to_vec(),
        });
    }

    let (&sequence, rest) = body
        .split_first()
        .ok_or(PacketError::MissingSequence(kind))?;

    let (fragment, payload) = match rest {
        [MULTI_PACKET_MARKER, total, index, payload @ ..] if kind == PacketKind::Command => (
            Some(FragmentInfo {
                total: *total,
                index: *index,
            }),
            payload,
        ),
        _ => (None, rest),
    };

    Ok(Packet {
        kind,
        sequence: Some(sequence),
        fragment,
        payload: payload.to_vec(),
    })
}
