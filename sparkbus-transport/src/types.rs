use std::time::Duration;

use bytes::Bytes;
use sparkbus_types::topic::QoS;
use thiserror::Error;

/// Username and password presented to the broker.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// TLS settings for the connection.
///
/// `insecure` disables peer verification and is only appropriate for testing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlsOptions {
    pub ca_path: Option<String>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub insecure: bool,
}

/// Connection parameters handed to [Transport::connect](crate::Transport::connect).
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub tls: Option<TlsOptions>,
    /// How long `connect` may block before reporting failure.
    pub timeout: Duration,
}

impl ConnectOptions {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            tls: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(
        mut self,
        username: S,
        password: S1,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Error conditions a [Transport::connect](crate::Transport::connect) attempt can report.
#[derive(Error, Debug, PartialEq)]
pub enum ConnectError {
    #[error("could not reach the broker: {0}")]
    Refused(String),
    #[error("the broker did not accept the connection within {0:?}")]
    Timeout(Duration),
}

/// The message a broker publishes on the entity's behalf if the connection
/// drops without a graceful disconnect.
#[derive(Clone, Debug, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// Events a transport [EventLoop](crate::EventLoop) implementation produces.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message { topic: String, payload: Bytes },
}
