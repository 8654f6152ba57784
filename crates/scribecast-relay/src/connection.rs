//! Outbound WebSocket connection to the event listener.
//!
//! One connection per job, opened before the worker starts and closed once
//! the terminal event has been sent (or the job failed).

use std::future::Future;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use scribecast_core::Event;
use scribecast_core::config::RelayConfig;

/// Destination for relayed events.
///
/// Implemented by [`WsConnection`]; tests substitute in-memory sinks.
pub trait EventSink: Send {
    /// Deliver one event. An error means the peer is gone.
    fn send(&mut self, event: &Event) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Release the transport. Idempotent, never fails.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection (TCP + handshake) timeout.
    pub connect_timeout: Duration,
    /// Per-frame write timeout.
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for ConnectionConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// Connection state. A [`WsConnection`] only exists once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Close handshake in progress.
    Closing,
    /// Closed locally, or the peer went away during a write.
    Closed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client WebSocket connection carrying JSON text frames.
pub struct WsConnection {
    endpoint: String,
    ws: WsStream,
    state: ConnectionState,
    write_timeout: Duration,
}

impl WsConnection {
    /// Open a connection to `endpoint` (`ws://` or `wss://`).
    pub async fn connect(
        endpoint: &str,
        config: &ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        // Ignore error: provider may already be installed by another caller.
        let _ = rustls::crypto::ring::default_provider().install_default();
        info!(endpoint, "Connecting to event listener");

        let connect = connect_async(endpoint);
        let (ws, response) = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| ConnectionError::Connect {
                endpoint: endpoint.to_string(),
                reason: format!("timed out after {:?}", config.connect_timeout),
            })?
            .map_err(|e| ConnectionError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        debug!(endpoint, status = %response.status(), "WebSocket handshake complete");
        info!(endpoint, "Connected to event listener");
        Ok(Self {
            endpoint: endpoint.to_string(),
            ws,
            state: ConnectionState::Connected,
            write_timeout: config.write_timeout,
        })
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    async fn write(&mut self, text: String) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::Closed);
        }

        let outcome = tokio::time::timeout(self.write_timeout, self.ws.send(Message::text(text))).await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.state = ConnectionState::Closed;
                Err(ConnectionError::Transmit(e.to_string()))
            }
            Err(_) => {
                self.state = ConnectionState::Closed;
                Err(ConnectionError::Transmit(format!(
                    "write timed out after {:?}",
                    self.write_timeout
                )))
            }
        }
    }
}

impl EventSink for WsConnection {
    async fn send(&mut self, event: &Event) -> Result<(), ConnectionError> {
        let text = event
            .to_json()
            .map_err(|e| ConnectionError::Transmit(e.to_string()))?;
        self.write(text).await
    }

    async fn close(&mut self) {
        if self.state != ConnectionState::Connected {
            self.state = ConnectionState::Closed;
            return;
        }
        self.state = ConnectionState::Closing;

        match tokio::time::timeout(self.write_timeout, self.ws.close(None)).await {
            Ok(Ok(())) => debug!(endpoint = %self.endpoint, "Connection closed"),
            Ok(Err(e)) => debug!(endpoint = %self.endpoint, error = %e, "Close handshake failed"),
            Err(_) => warn!(endpoint = %self.endpoint, "Close handshake timed out"),
        }
        self.state = ConnectionState::Closed;
    }
}

/// Connection errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Failed to send event: {0}")]
    Transmit(String),

    #[error("Connection closed")]
    Closed,
}
