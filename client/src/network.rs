//! Client facade: connect, send commands, disconnect.

use crate::config::Config;
use crate::error::RconError;
use crate::session::{self, Session};
use crate::state::{ConnectionState, StateCell};
use log::{info, warn};
use protocol::{CommandError, CommandResult, ResponseSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// A running session and the means to stop it.
struct ActiveSession {
    session: Arc<Session>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Client {
    config: Config,
    chat_sink: mpsc::UnboundedSender<String>,
    state: StateCell,
    active: Mutex<Option<ActiveSession>>,
}

impl Client {
    /// Creates a disconnected client. Server messages go to `chat_sink`.
    pub fn new(config: Config, chat_sink: mpsc::UnboundedSender<String>) -> Self {
        Client {
            config: config.with_defaults(),
            chat_sink,
            state: StateCell::new(),
            active: Mutex::new(None),
        }
    }

    /// Creates a client together with the receiving end of its chat channel.
    pub fn with_chat_channel(config: Config) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        (Client::new(config, chat_tx), chat_rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Logs in and starts the session loop.
    ///
    /// `Ok(false)` means the server rejected the password.
    pub async fn connect(&self) -> Result<bool, RconError> {
        let mut active = self.active.lock().await;

        if let Some(existing) = active.as_ref() {
            if !existing.task.is_finished() {
                return Err(RconError::AlreadyConnected);
            }
        }
        // A loop that died on its own still has to be joined.
        if let Some(stale) = active.take() {
            if let Err(e) = stale.task.await {
                warn!("Previous session task failed: {}", e);
            }
        }

        self.state.set(ConnectionState::Connecting);

        let socket = match self.open_authenticated_socket().await {
            Ok(Some(socket)) => socket,
            Ok(None) => {
                warn!("Server at {} rejected the password", self.config.address);
                self.state.set(ConnectionState::Disconnected);
                return Ok(false);
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(socket, self.config.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.state.set(ConnectionState::Connected);
        let task = tokio::spawn(Arc::clone(&session).run(
            shutdown_rx,
            self.chat_sink.clone(),
            self.state.clone(),
        ));

        *active = Some(ActiveSession {
            session,
            shutdown: shutdown_tx,
            task,
        });

        info!("Logged in to {}", self.config.address);
        Ok(true)
    }

    async fn open_authenticated_socket(&self) -> Result<Option<UdpSocket>, RconError> {
        let addr = self.resolve().await?;
        let local = if addr.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        info!("Connecting to {}", addr);

        if session::login(&socket, &self.config).await? {
            Ok(Some(socket))
        } else {
            Ok(None)
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, RconError> {
        lookup_host(self.config.address.as_str())
            .await
            .map_err(|_| RconError::AddressResolution(self.config.address.clone()))?
            .next()
            .ok_or_else(|| RconError::AddressResolution(self.config.address.clone()))
    }

    async fn session(&self) -> Result<Arc<Session>, RconError> {
        if self.state.get() != ConnectionState::Connected {
            return Err(RconError::NotConnected);
        }

        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.session))
            .ok_or(RconError::NotConnected)
    }

    /// Sends `payload` as a command; the response is delivered to `sink`.
    ///
    /// Returns once the datagram is written. The command is never resent.
    pub async fn send_command<S>(&self, payload: &[u8], sink: S) -> Result<(), RconError>
    where
        S: ResponseSink + 'static,
    {
        let session = self.session().await?;
        session.send_command(payload, Some(Box::new(sink))).await?;
        Ok(())
    }

    /// Sends a command and waits for its complete response.
    pub async fn execute(&self, command: &str) -> Result<Vec<u8>, RconError> {
        let (tx, rx) = oneshot::channel::<CommandResult>();
        self.send_command(command.as_bytes(), tx).await?;

        let response = rx.await.map_err(|_| CommandError::Disconnected)??;
        Ok(response)
    }

    /// Stops the session loop and waits for it to exit. Safe to repeat.
    pub async fn disconnect(&self) -> Result<(), RconError> {
        let mut active = self.active.lock().await;

        let Some(ActiveSession {
            session,
            shutdown,
            task,
        }) = active.take()
        else {
            self.state.set(ConnectionState::Disconnected);
            return Ok(());
        };

        self.state.set(ConnectionState::Disconnecting);
        // Fails only if the loop already exited.
        let _ = shutdown.send(true);
        let joined = task.await;

        // Last handle to the socket.
        drop(session);
        self.state.set(ConnectionState::Disconnected);
        info!("Disconnected from {}", self.config.address);

        joined.map_err(RconError::from)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            let _ = active.shutdown.send(true);
        }
    }
}
