//! # BattlEye RCon Client
//!
//! Async client for the BattlEye remote console. It logs in to a game
//! server over UDP, sends administrative commands, reassembles their
//! responses and keeps the session alive in the background.
//!
//! ## Architecture Overview
//!
//! ### Session Loop
//! After a successful login a single tokio task owns the receive side of the
//! socket. Each iteration it sends a heartbeat if the link has been idle for
//! `heartbeat_interval` and expires commands that outlived their deadline.
//! It then waits a short moment for a datagram and routes whatever arrives.
//!
//! ### Commands and Responses
//! `send_command` returns as soon as the datagram is written. The response
//! reaches the supplied sink later, possibly after being reassembled from
//! several fragments. Commands that get no answer resolve to
//! `CommandError::Timeout`. They are never resent, since admin commands are
//! not idempotent.
//!
//! ### Server Messages
//! Broadcast and chat lines pushed by the server go to the chat channel and
//! are acknowledged immediately.
//!
//! ## Module Organization
//!
//! - `config`: connection settings and their defaults.
//! - `network`: the [`Client`] facade.
//! - `session`: login handshake and the background loop.
//! - `state`: connection lifecycle shared with the loop.
//! - `error`: errors surfaced to callers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, mut chat) = Client::with_chat_channel(Config::new("127.0.0.1:2306", "secret"));
//!
//!     if !client.connect().await? {
//!         eprintln!("Wrong password");
//!         return Ok(());
//!     }
//!
//!     tokio::spawn(async move {
//!         while let Some(line) = chat.recv().await {
//!             println!("{}", line);
//!         }
//!     });
//!
//!     let players = client.execute("players").await?;
//!     println!("{}", String::from_utf8_lossy(&players));
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
mod session;
mod state;

pub use config::Config;
pub use error::RconError;
pub use network::Client;
pub use protocol::{CommandError, CommandResult, ResponseSink};
pub use state::ConnectionState;
