use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MULTI_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on how long the session loop waits for a datagram per tick.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connection settings. Zero durations are replaced by the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `host:port` of the server's RCon endpoint.
    pub address: String,
    pub password: String,
    /// How long to wait for the login response.
    pub conn_timeout: Duration,
    /// How long a command may wait for its response, and bound on each write.
    pub response_timeout: Duration,
    /// Extra grace after `response_timeout` for trailing fragments.
    pub multi_response_timeout: Duration,
    /// Idle time after which a heartbeat is sent.
    pub heartbeat_interval: Duration,
}

impl Config {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Config {
            address: address.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_defaults(mut self) -> Self {
        fn or_default(value: &mut Duration, default: Duration) {
            if value.is_zero() {
                *value = default;
            }
        }

        or_default(&mut self.conn_timeout, DEFAULT_CONN_TIMEOUT);
        or_default(&mut self.response_timeout, DEFAULT_RESPONSE_TIMEOUT);
        or_default(&mut self.multi_response_timeout, DEFAULT_MULTI_RESPONSE_TIMEOUT);
        or_default(&mut self.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        self
    }

    /// Age at which a pending command is given up on.
    pub fn response_deadline(&self) -> Duration {
        self.response_timeout + self.multi_response_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        MAX_POLL_INTERVAL.min(self.heartbeat_interval / 2)
    }
}
