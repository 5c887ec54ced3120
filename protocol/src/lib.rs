//! # BattlEye RCon Protocol
//!
//! Transport-free building blocks of the RCon client: the datagram codec,
//! the command sequence ring, the table of commands awaiting responses, and
//! reassembly of responses split over several datagrams.
//!
//! Nothing here touches a socket. The `client` crate drives these types from
//! its session loop and keeps them behind a single lock.
//!
//! ## Modules
//!
//! - `packet`: building and validating login, command and server-message
//!   datagrams, CRC-32 checksums included.
//! - `sequence`: the one-byte wrapping sequence counter.
//! - `reassembly`: per-sequence fragment accumulators.
//! - `pending`: in-flight commands, their response sinks and timeouts.
//! - `error`: codec, reassembly and per-command errors.

pub mod error;
pub mod packet;
pub mod pending;
pub mod reassembly;
pub mod sequence;

pub use error::{CommandError, CommandResult, PacketError, ReassemblyError};
pub use packet::{
    build_ack_packet, build_command_packet, build_fragment_packet, build_login_packet,
    build_login_response, build_server_message_packet, parse_packet, FragmentInfo, Packet,
    PacketKind,
};
pub use pending::{PendingTracker, ResponseOutcome, ResponseSink};
pub use reassembly::ReassemblyBuffer;
pub use sequence::SequenceCounter;
