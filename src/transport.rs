//! Transport session to the ingestion host.
//!
//! The session resolves and dials the configured endpoint, then runs an
//! HTTP/1.1 client connection over that very socket. Every following push is
//! sent on it until it fails or the peer closes it. Calling
//! [`TransportSession::ensure_connected`] on a live session is a no-op.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Errors that can occur while connecting to the ingestion host.
#[derive(Debug)]
pub enum TransportError {
    /// Host name resolution failed
    Resolve { host: String, source: io::Error },

    /// Host name resolved to an empty address list
    NoAddress { host: String },

    /// TCP connect was refused or failed
    Connect { addr: SocketAddr, source: io::Error },

    /// TCP connect did not finish in time
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    /// The HTTP connection could not be set up on the socket
    Handshake(hyper::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Resolve { host, source } => {
                write!(f, "Failed to resolve {}: {}", host, source)
            }
            TransportError::NoAddress { host } => write!(f, "No address found for {}", host),
            TransportError::Connect { addr, source } => {
                write!(f, "Failed to connect to {}: {}", addr, source)
            }
            TransportError::ConnectTimeout { addr, timeout } => {
                write!(f, "Connecting to {} timed out after {:?}", addr, timeout)
            }
            TransportError::Handshake(e) => write!(f, "HTTP handshake failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Resolve { source, .. } | TransportError::Connect { source, .. } => {
                Some(source)
            }
            TransportError::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

/// An established session: the request handle and the address it talks to.
#[derive(Debug)]
struct Connection {
    sender: SendRequest<Full<Bytes>>,
    peer: SocketAddr,
}

/// Owned connection to the ingestion host.
#[derive(Debug)]
pub struct TransportSession {
    host: String,
    port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
    connection: Option<Connection>,
    dial_attempts: u64,
}

impl TransportSession {
    /// Create a disconnected session for the configured endpoint.
    pub fn new(config: &Config) -> Self {
        Self::with_settings(
            config.server_host.clone(),
            config.server_port,
            config.connect_timeout,
            config.request_timeout,
        )
    }

    /// Create a disconnected session with explicit settings.
    pub fn with_settings(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            request_timeout,
            connection: None,
            dial_attempts: 0,
        }
    }

    /// Connect unless already connected.
    ///
    /// A session whose socket was closed by the peer counts as disconnected
    /// and is dialed again.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the host cannot be resolved or dialed. The
    /// session is left disconnected so the next call starts over.
    pub async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if let Some(conn) = &self.connection {
            if !conn.sender.is_closed() {
                debug!(peer = %conn.peer, "Reusing established session");
                return Ok(());
            }
            debug!(peer = %conn.peer, "Peer closed the session");
            self.connection = None;
        }

        self.dial_attempts += 1;
        match self.dial().await {
            Ok(conn) => {
                info!(host = %self.host, peer = %conn.peer, "Connected to ingestion host");
                self.connection = Some(conn);
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, error = %e, "Connect failed");
                self.connection = None;
                Err(e)
            }
        }
    }

    async fn dial(&self) -> Result<Connection, TransportError> {
        let addr = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::NoAddress {
                host: self.host.clone(),
            })?;

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                addr,
                timeout: self.connect_timeout,
            })?
            .map_err(|source| TransportError::Connect { addr, source })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle on session socket");
        }

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(TransportError::Handshake)?;

        // Drives socket IO; ends when the socket closes or the sender is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(peer = %addr, error = %e, "Session connection ended with error");
            }
        });

        Ok(Connection { sender, peer: addr })
    }

    /// Drop the connection; the next `ensure_connected` dials again.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            debug!(peer = %conn.peer, "Session closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| !conn.sender.is_closed())
    }

    /// Request handle bound to the connected socket.
    pub fn sender(&mut self) -> Option<&mut SendRequest<Full<Bytes>>> {
        self.connection.as_mut().map(|c| &mut c.sender)
    }

    /// Address the session is connected to.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(|c| c.peer)
    }

    /// Number of times the endpoint has actually been dialed.
    pub fn dial_attempts(&self) -> u64 {
        self.dial_attempts
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Upper bound for one exchange on this session.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Value of the `Host` header for requests on this session.
    pub fn authority(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
