//! Integration tests for the RCon client against a loopback fake server.
//!
//! These tests drive the public facade end to end over real UDP sockets.

use client::{Client, CommandError, CommandResult, Config, ConnectionState, RconError};
use protocol::{
    build_command_packet, build_fragment_packet, build_login_response,
    build_server_message_packet, parse_packet, Packet, PacketKind,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(2);

/// Minimal server side of the protocol, driven step by step by each test.
struct FakeServer {
    socket: UdpSocket,
    client: Option<SocketAddr>,
}

impl FakeServer {
    async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake server");
        FakeServer {
            socket,
            client: None,
        }
    }

    fn address(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }

    async fn try_recv(&mut self, within: Duration) -> Option<Packet> {
        let mut buffer = [0u8; 4096];
        let (len, addr) = timeout(within, self.socket.recv_from(&mut buffer))
            .await
            .ok()?
            .expect("Fake server receive failed");
        self.client = Some(addr);
        Some(parse_packet(&buffer[..len]).expect("Client sent an invalid packet"))
    }

    async fn recv(&mut self) -> Packet {
        self.try_recv(WAIT)
            .await
            .expect("Timed out waiting for the client")
    }

    async fn send(&self, data: &[u8]) {
        let client = self.client.expect("No client has contacted the server yet");
        self.socket.send_to(data, client).await.unwrap();
    }

    /// Waits for the login packet and answers it.
    async fn accept_login(&mut self, password: &str, accept: bool) {
        let login = self.recv().await;
        assert_eq!(login.kind, PacketKind::Login);
        assert_eq!(login.payload, password.as_bytes());
        self.send(&build_login_response(accept)).await;
    }
}

fn test_config(address: String) -> Config {
    Config {
        conn_timeout: Duration::from_millis(300),
        response_timeout: Duration::from_millis(300),
        multi_response_timeout: Duration::from_millis(200),
        heartbeat_interval: Duration::from_secs(60),
        ..Config::new(address, "secret")
    }
}

async fn connected_pair(config: Config) -> (FakeServer, Client, mpsc::UnboundedReceiver<String>) {
    let mut server = FakeServer::bind().await;
    let (client, chat) = Client::with_chat_channel(Config {
        address: server.address(),
        ..config
    });

    let (connected, _) = tokio::join!(client.connect(), server.accept_login("secret", true));
    assert!(assert_ok!(connected));
    (server, client, chat)
}

async fn default_pair() -> (FakeServer, Client, mpsc::UnboundedReceiver<String>) {
    connected_pair(test_config(String::new())).await
}

/// LOGIN HANDSHAKE TESTS
mod login_tests {
    use super::*;

    /// Tests that a correct password leaves the client Connected.
    #[tokio::test]
    async fn accepted_password_connects() {
        let (_server, client, _chat) = default_pair().await;
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_ok!(client.disconnect().await);
    }

    /// Tests that a rejected login returns `Ok(false)` and stays Disconnected.
    #[tokio::test]
    async fn rejected_password_is_not_an_error() {
        let mut server = FakeServer::bind().await;
        let (client, _chat) = Client::with_chat_channel(test_config(server.address()));

        let (connected, _) = tokio::join!(client.connect(), server.accept_login("secret", false));

        assert!(!assert_ok!(connected));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    /// Tests that a server which never answers the login yields `LoginTimedOut`.
    #[tokio::test]
    async fn silent_server_times_out() {
        let mut server = FakeServer::bind().await;
        let (client, _chat) = Client::with_chat_channel(test_config(server.address()));

        let (connected, login) = tokio::join!(client.connect(), server.recv());

        assert_eq!(login.kind, PacketKind::Login);
        let err = assert_err!(connected);
        assert!(matches!(err, RconError::LoginTimedOut));
        assert!(err.is_timeout());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    /// Tests that a login against a closed port waits out `conn_timeout`
    /// instead of failing on the ICMP bounce.
    #[tokio::test]
    async fn closed_port_login_times_out() {
        let address = FakeServer::bind().await.address();
        let (client, _chat) = Client::with_chat_channel(test_config(address));

        let err = assert_err!(client.connect().await);
        assert!(matches!(err, RconError::LoginTimedOut));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    /// Tests that a login reply with a bad checksum is skipped in favour of the valid one.
    #[tokio::test]
    async fn corrupt_login_response_is_ignored() {
        let mut server = FakeServer::bind().await;
        let (client, _chat) = Client::with_chat_channel(test_config(server.address()));

        let respond = async {
            server.recv().await;
            let mut corrupt = build_login_response(true);
            corrupt[3] ^= 0xFF;
            server.send(&corrupt).await;
            server.send(&build_login_response(true)).await;
        };
        let (connected, _) = tokio::join!(client.connect(), respond);

        assert!(assert_ok!(connected));
        assert_ok!(client.disconnect().await);
    }

    /// Tests that connecting twice reports `AlreadyConnected`.
    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (_server, client, _chat) = default_pair().await;
        assert!(matches!(
            client.connect().await,
            Err(RconError::AlreadyConnected)
        ));
        assert_ok!(client.disconnect().await);
    }
}

/// COMMAND / RESPONSE TESTS
mod command_tests {
    use super::*;

    /// Tests the round trip of a command answered by one packet.
    #[tokio::test]
    async fn single_packet_response() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, rx) = oneshot::channel::<CommandResult>();

        assert_ok!(client.send_command(b"players", tx).await);

        let command = server.recv().await;
        assert_eq!(command.kind, PacketKind::Command);
        assert_eq!(command.sequence, Some(0));
        assert_eq!(command.payload, b"players".to_vec());

        server
            .send(&build_command_packet(0, b"Players on server:"))
            .await;

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Ok(b"Players on server:".to_vec()));
        assert_ok!(client.disconnect().await);
    }

    /// Tests that consecutive commands carry sequences 0, 1, 2.
    #[tokio::test]
    async fn sequences_increment_per_command() {
        let (mut server, client, _chat) = default_pair().await;

        for expected in 0..3u8 {
            let (tx, _rx) = oneshot::channel::<CommandResult>();
            assert_ok!(client.send_command(b"x", tx).await);
            assert_eq!(server.recv().await.sequence, Some(expected));
        }
        assert_ok!(client.disconnect().await);
    }

    /// Tests that shuffled fragments are joined in index order and delivered once.
    #[tokio::test]
    async fn fragments_out_of_order_are_joined_once() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel::<CommandResult>();

        assert_ok!(client.send_command(b"bans", tx).await);
        let sequence = server.recv().await.sequence.unwrap();

        server
            .send(&build_fragment_packet(sequence, 3, 0, b"GUID Bans:\n"))
            .await;
        server
            .send(&build_fragment_packet(sequence, 3, 2, b"1 abc perm\n"))
            .await;
        server
            .send(&build_fragment_packet(sequence, 3, 1, b"0 def 30m\n"))
            .await;
        // Retransmitted fragment after completion.
        server
            .send(&build_fragment_packet(sequence, 3, 1, b"0 def 30m\n"))
            .await;

        let response = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            response,
            Ok(b"GUID Bans:\n0 def 30m\n1 abc perm\n".to_vec())
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        assert_ok!(client.disconnect().await);
    }

    /// Tests that fragments disagreeing on their total fail the command without dropping the session.
    #[tokio::test]
    async fn conflicting_fragment_totals_fail_the_command() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, rx) = oneshot::channel::<CommandResult>();

        assert_ok!(client.send_command(b"bans", tx).await);
        let sequence = server.recv().await.sequence.unwrap();

        server
            .send(&build_fragment_packet(sequence, 3, 0, b"a"))
            .await;
        server
            .send(&build_fragment_packet(sequence, 2, 1, b"b"))
            .await;

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert!(matches!(
            response,
            Err(CommandError::CorruptResponse { .. })
        ));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_ok!(client.disconnect().await);
    }

    /// Tests that an unanswered command resolves to `Timeout` and is never resent.
    #[tokio::test]
    async fn unanswered_command_times_out() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, rx) = oneshot::channel::<CommandResult>();

        assert_ok!(client.send_command(b"#lock", tx).await);
        let sequence = server.recv().await.sequence.unwrap();

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Err(CommandError::Timeout { sequence }));

        // No retransmission.
        assert!(server.try_recv(Duration::from_millis(300)).await.is_none());
        assert_ok!(client.disconnect().await);
    }

    /// Tests that a server gone away after login only times commands out;
    /// the bounced datagrams do not end the session.
    #[tokio::test]
    async fn unreachable_server_times_out_commands() {
        let (server, client, _chat) = default_pair().await;
        drop(server);

        let (tx, rx) = oneshot::channel::<CommandResult>();
        assert_ok!(client.send_command(b"players", tx).await);

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Err(CommandError::Timeout { sequence: 0 }));
        assert_eq!(client.state(), ConnectionState::Connected);

        let (tx, rx) = oneshot::channel::<CommandResult>();
        assert_ok!(client.send_command(b"players", tx).await);
        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Err(CommandError::Timeout { sequence: 1 }));
        assert_ok!(client.disconnect().await);
    }

    /// Tests that corrupt and truncated datagrams are dropped while the real response still arrives.
    #[tokio::test]
    async fn corrupted_response_is_dropped_silently() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, rx) = oneshot::channel::<CommandResult>();

        assert_ok!(client.send_command(b"players", tx).await);
        let sequence = server.recv().await.sequence.unwrap();

        let mut corrupt = build_command_packet(sequence, b"garbage");
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0x55;
        server.send(&corrupt).await;
        server.send(b"BE").await;
        server.send(&build_command_packet(sequence, b"real")).await;

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Ok(b"real".to_vec()));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_ok!(client.disconnect().await);
    }

    /// Tests that `execute` waits for and returns the response payload.
    #[tokio::test]
    async fn execute_returns_response() {
        let (mut server, client, _chat) = default_pair().await;

        let serve = async {
            let command = server.recv().await;
            server
                .send(&build_command_packet(command.sequence.unwrap(), b"ok"))
                .await;
        };
        let (response, _) = tokio::join!(client.execute("say -1 hello"), serve);

        assert_eq!(assert_ok!(response), b"ok".to_vec());
        assert_ok!(client.disconnect().await);
    }
}

/// SESSION MAINTENANCE TESTS
mod session_tests {
    use super::*;

    /// Tests that a server message reaches the chat channel and is acked exactly once.
    #[tokio::test]
    async fn server_message_is_delivered_and_acked_once() {
        let (mut server, client, mut chat) = default_pair().await;

        server
            .send(&build_server_message_packet(5, b"(Global) Admin: restart in 5"))
            .await;

        let message = timeout(WAIT, chat.recv()).await.unwrap().unwrap();
        assert_eq!(message, "(Global) Admin: restart in 5");

        let ack = server.recv().await;
        assert_eq!(ack.kind, PacketKind::ServerMessage);
        assert_eq!(ack.sequence, Some(5));
        assert!(ack.payload.is_empty());

        assert!(server.try_recv(Duration::from_millis(300)).await.is_none());
        assert_ok!(client.disconnect().await);
    }

    /// Tests that a retransmitted server message is acked again but delivered only once.
    #[tokio::test]
    async fn resent_server_message_is_acked_but_not_repeated() {
        let (mut server, client, mut chat) = default_pair().await;

        let message = build_server_message_packet(0, b"Player #1 connected");
        server.send(&message).await;
        assert_eq!(server.recv().await.sequence, Some(0));
        server.send(&message).await;
        assert_eq!(server.recv().await.sequence, Some(0));

        assert_eq!(
            timeout(WAIT, chat.recv()).await.unwrap().unwrap(),
            "Player #1 connected"
        );
        assert!(chat.try_recv().is_err());
        assert_ok!(client.disconnect().await);
    }

    /// Tests that an idle session sends an empty command as a heartbeat.
    #[tokio::test]
    async fn idle_session_sends_heartbeat() {
        let config = Config {
            heartbeat_interval: Duration::from_millis(200),
            ..test_config(String::new())
        };
        let (mut server, client, _chat) = connected_pair(config).await;

        let heartbeat = server.recv().await;
        assert_eq!(heartbeat.kind, PacketKind::Command);
        assert!(heartbeat.payload.is_empty());
        server
            .send(&build_command_packet(heartbeat.sequence.unwrap(), b""))
            .await;

        assert_ok!(client.disconnect().await);
    }

    /// Tests that heartbeats are spaced by the full interval, not sent every tick.
    #[tokio::test]
    async fn heartbeats_wait_a_full_interval() {
        let config = Config {
            heartbeat_interval: Duration::from_millis(400),
            ..test_config(String::new())
        };
        let (mut server, client, _chat) = connected_pair(config).await;

        let first = server.recv().await;
        assert!(first.payload.is_empty());
        assert_eq!(first.sequence, Some(0));
        server.send(&build_command_packet(0, b"")).await;

        assert!(server.try_recv(Duration::from_millis(250)).await.is_none());

        let second = server.recv().await;
        assert!(second.payload.is_empty());
        assert_eq!(second.sequence, Some(1));
        assert_ok!(client.disconnect().await);
    }

    /// Tests that a command sent shortly before the interval elapses
    /// postpones the heartbeat.
    #[tokio::test]
    async fn command_postpones_heartbeat() {
        let config = Config {
            heartbeat_interval: Duration::from_millis(400),
            ..test_config(String::new())
        };
        let (mut server, client, _chat) = connected_pair(config).await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        let (tx, _rx) = oneshot::channel::<CommandResult>();
        assert_ok!(client.send_command(b"players", tx).await);

        let command = server.recv().await;
        assert_eq!(command.payload, b"players".to_vec());
        assert_eq!(command.sequence, Some(0));

        // The heartbeat would have been due about 150ms from here.
        assert!(server.try_recv(Duration::from_millis(300)).await.is_none());

        let heartbeat = server.recv().await;
        assert!(heartbeat.payload.is_empty());
        assert_eq!(heartbeat.sequence, Some(1));
        assert_ok!(client.disconnect().await);
    }

    /// Tests that repeated disconnects succeed and leave the client Disconnected.
    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (_server, client, _chat) = default_pair().await;

        assert_ok!(timeout(WAIT, client.disconnect()).await.unwrap());
        assert_ok!(timeout(WAIT, client.disconnect()).await.unwrap());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    /// Tests that sending after disconnect fails with `NotConnected`.
    #[tokio::test]
    async fn send_after_disconnect_fails_fast() {
        let (_server, client, _chat) = default_pair().await;
        assert_ok!(client.disconnect().await);

        let (tx, _rx) = oneshot::channel::<CommandResult>();
        let err = assert_err!(client.send_command(b"players", tx).await);
        assert!(matches!(err, RconError::NotConnected));
    }

    /// Tests that disconnecting resolves waiting commands with `Disconnected`.
    #[tokio::test]
    async fn disconnect_fails_pending_commands() {
        let (mut server, client, _chat) = default_pair().await;
        let (tx, rx) = oneshot::channel::<CommandResult>();

        assert_ok!(client.send_command(b"players", tx).await);
        server.recv().await;
        assert_ok!(client.disconnect().await);

        let response = timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(response, Err(CommandError::Disconnected));
    }

    /// Tests that a client can log in again after disconnecting.
    #[tokio::test]
    async fn reconnect_after_disconnect() {
        let (mut server, client, _chat) = default_pair().await;
        assert_ok!(client.disconnect().await);

        let (connected, _) = tokio::join!(client.connect(), server.accept_login("secret", true));
        assert!(assert_ok!(connected));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_ok!(client.disconnect().await);
    }
}
