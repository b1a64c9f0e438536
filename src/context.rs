//! Connection context owned by the scheduler.
//!
//! There is exactly one context per process. It is created at startup, lent
//! by `&mut` to every step of every cycle and never shared.

use crate::client::{DataState, HttpPushClient, PushError, PushSummary, ResponseFragment};
use crate::config::Config;
use crate::payload::PayloadBuffer;
use crate::transport::{TransportError, TransportSession};

/// The connect and push operations the scheduler drives.
#[allow(async_fn_in_trait)]
pub trait Uplink {
    /// Connect to the ingestion host unless already connected.
    async fn ensure_connected(&mut self) -> Result<(), TransportError>;

    /// Push `payload` over the established connection.
    async fn push<H>(&mut self, payload: &PayloadBuffer, handler: H) -> Result<PushSummary, PushError>
    where
        H: FnMut(&ResponseFragment<'_>, DataState);
}

/// Uplink over HTTP: a transport session plus the push client using it.
#[derive(Debug)]
pub struct HttpUplink {
    session: TransportSession,
    client: HttpPushClient,
}

impl HttpUplink {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(TransportSession::new(config), HttpPushClient::new(config))
    }

    pub fn from_parts(session: TransportSession, client: HttpPushClient) -> Self {
        Self { session, client }
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }
}

impl Uplink for HttpUplink {
    async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        self.session.ensure_connected().await
    }

    async fn push<H>(&mut self, payload: &PayloadBuffer, handler: H) -> Result<PushSummary, PushError>
    where
        H: FnMut(&ResponseFragment<'_>, DataState),
    {
        self.client.push(&mut self.session, payload, handler).await
    }
}

/// Process-wide state: the uplink and the payload buffer it sends.
#[derive(Debug)]
pub struct ConnectionContext<U> {
    pub uplink: U,
    pub payload: PayloadBuffer,
}

impl<U: Uplink> ConnectionContext<U> {
    pub fn new(uplink: U, payload_capacity: usize) -> Self {
        Self {
            uplink,
            payload: PayloadBuffer::with_capacity(payload_capacity),
        }
    }
}

impl ConnectionContext<HttpUplink> {
    /// Build the context described by `config`, disconnected.
    pub fn from_config(config: &Config) -> Self {
        Self::new(HttpUplink::new(config), config.payload_capacity)
    }
}
