//! The connected half of the client: one UDP socket and the loop that keeps
//! it alive.

use crate::config::Config;
use crate::error::RconError;
use crate::state::{ConnectionState, StateCell};
use log::{debug, error, info, trace, warn};
use protocol::{
    build_ack_packet, build_command_packet, build_login_packet, parse_packet, CommandError,
    Packet, PacketKind, PendingTracker, ResponseOutcome, ResponseSink, SequenceCounter,
};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;

pub(crate) const MAX_DATAGRAM_SIZE: usize = 4096;

/// ICMP bounces reported on a connected UDP socket. They concern a single
/// datagram, not the socket.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// State touched by both the command path and the session loop.
struct SessionInner {
    sequence: SequenceCounter,
    tracker: PendingTracker,
    last_command: Instant,
    last_server_message: Option<u8>,
    closed: bool,
}

pub(crate) struct Session {
    socket: UdpSocket,
    config: Config,
    inner: Mutex<SessionInner>,
}

/// Sends the login packet on a connected socket and waits for the verdict.
///
/// Datagrams that are not a login response are skipped until
/// `conn_timeout` runs out.
pub(crate) async fn login(socket: &UdpSocket, config: &Config) -> Result<bool, RconError> {
    socket.send(&build_login_packet(&config.password)).await?;

    timeout(config.conn_timeout, wait_for_login_result(socket))
        .await
        .map_err(|_| RconError::LoginTimedOut)?
}

async fn wait_for_login_result(socket: &UdpSocket) -> Result<bool, RconError> {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let len = match socket.recv(&mut buffer).await {
            Ok(len) => len,
            Err(e) if is_transient(&e) => {
                warn!("Server unreachable during login: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        match parse_packet(&buffer[..len]) {
            Ok(packet) => match packet.login_result() {
                Some(accepted) => return Ok(accepted),
                None => debug!("Ignoring {:?} packet during login", packet.kind),
            },
            Err(e) => debug!("Ignoring invalid packet during login: {}", e),
        }
    }
}

impl Session {
    pub(crate) fn new(socket: UdpSocket, config: Config) -> Self {
        Session {
            socket,
            config,
            inner: Mutex::new(SessionInner {
                sequence: SequenceCounter::new(),
                tracker: PendingTracker::new(),
                last_command: Instant::now(),
                last_server_message: None,
                closed: false,
            }),
        }
    }

    /// Assigns a sequence, registers the command and writes it.
    ///
    /// Returns once the datagram is on the wire; the response reaches `sink`
    /// later from the session loop.
    pub(crate) async fn send_command(
        &self,
        payload: &[u8],
        sink: Option<Box<dyn ResponseSink>>,
    ) -> Result<u8, RconError> {
        let (sequence, packet) = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(RconError::NotConnected);
            }

            let sequence = inner.sequence.next_sequence();
            let now = Instant::now();
            if inner.tracker.register(sequence, sink, now) {
                warn!(
                    "Sequence {} wrapped onto an unanswered command, expired it",
                    sequence
                );
            }
            inner.last_command = now;
            (sequence, build_command_packet(sequence, payload))
        };

        match timeout(self.config.response_timeout, self.socket.send(&packet)).await {
            Ok(Ok(_)) => {
                debug!("Sent command {} ({} bytes)", sequence, payload.len());
                Ok(sequence)
            }
            Ok(Err(e)) => {
                self.inner.lock().await.tracker.cancel(sequence);
                Err(e.into())
            }
            Err(_) => {
                self.inner.lock().await.tracker.cancel(sequence);
                Err(RconError::SendTimedOut)
            }
        }
    }

    /// Runs until `shutdown` fires or the socket fails.
    pub(crate) async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        chat: mpsc::UnboundedSender<String>,
        state: StateCell,
    ) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let poll_interval = self.config.poll_interval();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.heartbeat_if_idle().await {
                Ok(()) => {}
                Err(RconError::SendTimedOut) => warn!("Heartbeat write timed out"),
                Err(RconError::Io(e)) if is_transient(&e) => {
                    warn!("Heartbeat bounced: {}", e)
                }
                Err(e) => {
                    error!("Failed to send heartbeat: {}", e);
                    break;
                }
            }

            self.expire_overdue().await;

            let received = tokio::select! {
                _ = shutdown.changed() => None,
                received = timeout(poll_interval, self.socket.recv(&mut buffer)) => Some(received),
            };

            match received {
                None => break,
                // Nothing arrived this tick.
                Some(Err(_)) => continue,
                Some(Ok(Ok(len))) => self.handle_datagram(&buffer[..len], &chat).await,
                Some(Ok(Err(e))) if is_transient(&e) => {
                    warn!("Server unreachable: {}", e);
                }
                Some(Ok(Err(e))) => {
                    error!("Error receiving packet: {}", e);
                    break;
                }
            }
        }

        self.close().await;
        if state.transition(ConnectionState::Connected, ConnectionState::Disconnected) {
            warn!("Session ended without a disconnect request");
        }
        info!("Session loop stopped");
    }

    async fn heartbeat_if_idle(&self) -> Result<(), RconError> {
        let idle = self.inner.lock().await.last_command.elapsed();
        if idle < self.config.heartbeat_interval {
            return Ok(());
        }

        let sequence = self.send_command(&[], None).await?;
        debug!("Sent heartbeat {}", sequence);
        Ok(())
    }

    async fn expire_overdue(&self) {
        let expired = self
            .inner
            .lock()
            .await
            .tracker
            .expire_overdue(Instant::now(), self.config.response_deadline());

        for sequence in expired {
            warn!("Command {} timed out", sequence);
        }
    }

    async fn handle_datagram(&self, data: &[u8], chat: &mpsc::UnboundedSender<String>) {
        let packet = match parse_packet(data) {
            Ok(packet) => packet,
            Err(e) if e.is_checksum_mismatch() => {
                trace!("Dropping datagram: {}", e);
                return;
            }
            Err(e) => {
                warn!("Dropping malformed packet: {}", e);
                return;
            }
        };

        match (packet.kind, packet.sequence) {
            (PacketKind::Login, _) => debug!("Ignoring login packet after handshake"),
            (PacketKind::Command, Some(sequence)) => self.handle_response(sequence, packet).await,
            (PacketKind::ServerMessage, Some(sequence)) => {
                self.handle_server_message(sequence, packet.payload, chat)
                    .await
            }
            (kind, None) => warn!("Dropping {:?} packet without a sequence", kind),
        }
    }

    async fn handle_response(&self, sequence: u8, packet: Packet) {
        let outcome = {
            let mut inner = self.inner.lock().await;
            match packet.fragment {
                Some(fragment) => inner
                    .tracker
                    .on_fragment(sequence, fragment, &packet.payload),
                None => inner.tracker.complete(sequence, packet.payload),
            }
        };

        match outcome {
            ResponseOutcome::Delivered => debug!("Response {} complete", sequence),
            ResponseOutcome::Incomplete {
                received,
                highest_index,
            } => trace!(
                "Stored fragment for {} ({} held, highest index {})",
                sequence,
                received,
                highest_index
            ),
            ResponseOutcome::Unknown => warn!("Response for unknown sequence {}", sequence),
            ResponseOutcome::Rejected(e) => warn!("Discarding response: {}", e),
        }
    }

    async fn handle_server_message(
        &self,
        sequence: u8,
        payload: Vec<u8>,
        chat: &mpsc::UnboundedSender<String>,
    ) {
        let repeated = {
            let mut inner = self.inner.lock().await;
            let repeated = inner.last_server_message == Some(sequence);
            inner.last_server_message = Some(sequence);
            repeated
        };

        if repeated {
            debug!("Server resent message {}, acking again", sequence);
        } else if chat
            .send(String::from_utf8_lossy(&payload).into_owned())
            .is_err()
        {
            debug!("Chat receiver dropped, discarding message {}", sequence);
        }

        match timeout(
            self.config.response_timeout,
            self.socket.send(&build_ack_packet(sequence)),
        )
        .await
        {
            Ok(Ok(_)) => trace!("Acked server message {}", sequence),
            Ok(Err(e)) => warn!("Failed to ack server message {}: {}", sequence, e),
            Err(_) => warn!("Timed out acking server message {}", sequence),
        }
    }

    /// Stops new commands and fails the ones still waiting.
    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let failed = inner.tracker.fail_all(CommandError::Disconnected);
        if failed > 0 {
            info!("Dropped {} pending commands on close", failed);
        }
    }
}
