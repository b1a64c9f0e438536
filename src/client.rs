//! HTTP push client for sending telemetry samples to the ingestion endpoint.
//!
//! One call to [`HttpPushClient::push`] is one POST exchange over the socket
//! held by an already connected [`TransportSession`]. Response data is handed
//! to a caller-supplied handler fragment by fragment as it arrives.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::payload::PayloadBuffer;
use crate::transport::TransportSession;

/// Header carrying the static device token.
pub const DEVICE_TOKEN_HEADER: &str = "Device-Token";

/// Whether a response fragment completes the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    /// More data is pending
    More,

    /// The response is complete
    Final,
}

/// A piece of the response as seen by the handler.
#[derive(Debug)]
pub struct ResponseFragment<'a> {
    /// HTTP status of the response
    pub status: StatusCode,

    /// Bytes received in this fragment
    pub data: &'a [u8],

    /// Bytes received so far, this fragment included
    pub total_bytes: usize,
}

/// Result of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSummary {
    pub status: StatusCode,
    pub bytes: usize,
    pub fragments: usize,
}

/// Errors that can occur during a push.
#[derive(Debug)]
pub enum PushError {
    /// The transport session has not been connected
    NotConnected,

    /// The exchange did not complete in time
    Timeout,

    /// The response could not be parsed
    Malformed(String),

    /// The request could not be built from the configured values
    InvalidRequest(String),

    /// Writing the request or reading the response failed
    Request(hyper::Error),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::NotConnected => write!(f, "Transport session is not connected"),
            PushError::Timeout => write!(f, "Request timed out"),
            PushError::Malformed(e) => write!(f, "Malformed response: {}", e),
            PushError::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            PushError::Request(e) => write!(f, "HTTP request failed: {}", e),
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PushError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<hyper::Error> for PushError {
    fn from(err: hyper::Error) -> Self {
        if err.is_parse() || err.is_incomplete_message() {
            PushError::Malformed(err.to_string())
        } else {
            PushError::Request(err)
        }
    }
}

/// Issues telemetry POST requests over a [`TransportSession`].
#[derive(Debug, Clone)]
pub struct HttpPushClient {
    path: String,
    device_token: Option<String>,
}

impl HttpPushClient {
    pub fn new(config: &Config) -> Self {
        Self::with_settings(config.server_path.clone(), config.device_token.clone())
    }

    pub fn with_settings(path: impl Into<String>, device_token: Option<String>) -> Self {
        Self {
            path: path.into(),
            device_token,
        }
    }

    /// POST the payload and stream the response into `handler`.
    ///
    /// On success the handler has seen zero or more `More` fragments followed
    /// by exactly one `Final` fragment. Any HTTP status counts as delivered.
    ///
    /// # Errors
    ///
    /// Returns `PushError::NotConnected` if the session was never connected;
    /// this client does not dial. Other errors drop the session so the next
    /// cycle reconnects; the handler may not have been called.
    pub async fn push<H>(
        &self,
        session: &mut TransportSession,
        payload: &PayloadBuffer,
        mut handler: H,
    ) -> Result<PushSummary, PushError>
    where
        H: FnMut(&ResponseFragment<'_>, DataState),
    {
        let authority = session.authority();
        let timeout = session.request_timeout();
        let sender = session.sender().ok_or(PushError::NotConnected)?;

        debug!(host = %authority, path = %self.path, bytes = payload.len(), "Pushing payload");

        let exchange = self.exchange(sender, &authority, payload, &mut handler);
        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout),
        };

        match result {
            Ok(summary) => {
                if !summary.status.is_success() {
                    warn!(status = %summary.status, "Ingestion endpoint rejected payload");
                }
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, host = %authority, "Push failed");
                session.disconnect();
                Err(e)
            }
        }
    }

    async fn exchange<H>(
        &self,
        sender: &mut SendRequest<Full<Bytes>>,
        authority: &str,
        payload: &PayloadBuffer,
        handler: &mut H,
    ) -> Result<PushSummary, PushError>
    where
        H: FnMut(&ResponseFragment<'_>, DataState),
    {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.path.as_str())
            .header(HOST, authority)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.device_token {
            builder = builder.header(DEVICE_TOKEN_HEADER, token.as_str());
        }
        let request = builder
            .body(Full::new(Bytes::copy_from_slice(payload.as_bytes())))
            .map_err(|e| PushError::InvalidRequest(e.to_string()))?;

        sender.ready().await?;
        let response = sender.send_request(request).await?;
        let status = response.status();
        let mut body = response.into_body();

        let mut total_bytes = 0;
        let mut fragments = 0;

        // Hold one chunk back so the last one can be tagged Final.
        let mut pending: Option<Bytes> = None;
        while let Some(frame) = body.frame().await {
            let Ok(chunk) = frame?.into_data() else {
                continue;
            };
            if chunk.is_empty() {
                continue;
            }
            if let Some(previous) = pending.replace(chunk) {
                total_bytes += previous.len();
                fragments += 1;
                handler(
                    &ResponseFragment {
                        status,
                        data: &previous,
                        total_bytes,
                    },
                    DataState::More,
                );
            }
        }

        let last = pending.unwrap_or_default();
        total_bytes += last.len();
        fragments += 1;
        handler(
            &ResponseFragment {
                status,
                data: &last,
                total_bytes,
            },
            DataState::Final,
        );

        Ok(PushSummary {
            status,
            bytes: total_bytes,
            fragments,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    /// Local HTTP server answering every request with the same canned parts.
    pub(crate) struct TestServer {
        pub addr: SocketAddr,
        pub requests: mpsc::UnboundedReceiver<String>,
        pub accepts: Arc<AtomicUsize>,
    }

    /// Serve canned responses on every accepted connection.
    ///
    /// Each response is written part by part with a short pause in between,
    /// then the connection waits for the next request. With no parts the
    /// server reads requests and never answers.
    pub(crate) async fn spawn_server(parts: Vec<&'static str>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::unbounded_channel();
        let accepts = Arc::new(AtomicUsize::new(0));
        let accepted = accepts.clone();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(socket, parts.clone(), tx.clone()));
            }
        });

        TestServer {
            addr,
            requests,
            accepts,
        }
    }

    async fn serve_connection(
        mut socket: TcpStream,
        parts: Vec<&'static str>,
        tx: mpsc::UnboundedSender<String>,
    ) {
        while let Some(request) = read_request(&mut socket).await {
            let _ = tx.send(request);

            for part in &parts {
                if socket.write_all(part.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return Some(text);
                }
            }
        }
    }

    pub(crate) async fn connected_session(addr: SocketAddr, request_timeout: Duration) -> TransportSession {
        let mut session = TransportSession::with_settings(
            "127.0.0.1",
            addr.port(),
            Duration::from_secs(2),
            request_timeout,
        );
        session.ensure_connected().await.expect("test server reachable");
        session
    }

    fn payload(text: &str) -> PayloadBuffer {
        let mut buffer = PayloadBuffer::with_capacity(1280);
        buffer.overwrite(format_args!("{}", text));
        buffer
    }

    #[tokio::test]
    async fn test_more_then_final_fragments() {
        let server = spawn_server(vec![
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n6\r\nhello \r\n",
            "5\r\nworld\r\n0\r\n\r\n",
        ])
        .await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", None);

        let mut events: Vec<(DataState, Vec<u8>, usize)> = Vec::new();
        let summary = client
            .push(&mut session, &payload("{}"), |fragment, state| {
                events.push((state, fragment.data.to_vec(), fragment.total_bytes));
            })
            .await
            .expect("push should succeed");

        assert_eq!(summary.status, StatusCode::OK);
        assert_eq!(summary.bytes, 11);
        assert!(events.len() >= 2, "{:?}", events);
        assert_eq!(events.last().unwrap().0, DataState::Final);
        assert!(events[..events.len() - 1]
            .iter()
            .all(|(state, _, _)| *state == DataState::More));

        let body: Vec<u8> = events.iter().flat_map(|(_, data, _)| data.clone()).collect();
        assert_eq!(body, b"hello world");
        assert_eq!(events.last().unwrap().2, 11);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let mut server =
            spawn_server(vec!["HTTP/1.1 202 Accepted\r\ncontent-length: 2\r\n\r\nok"]).await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", Some("secret-token".to_string()));
        let body = r#"{"variable": "luminosity","unit": "lux","value": 100.000000}"#;

        client
            .push(&mut session, &payload(body), |_, _| {})
            .await
            .unwrap();

        let request = server.requests.recv().await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /data HTTP/1.1\r\n"), "{}", request);
        assert!(lower.contains(&format!("host: 127.0.0.1:{}", server.addr.port())));
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("device-token: secret-token"));
        assert!(lower.contains(&format!("content-length: {}", body.len())));
        assert!(request.ends_with(body));
    }

    #[tokio::test]
    async fn test_pushes_reuse_the_dialed_socket() {
        let server =
            spawn_server(vec!["HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok"]).await;
        let mut session = TransportSession::with_settings(
            "127.0.0.1",
            server.addr.port(),
            Duration::from_secs(2),
            Duration::from_secs(2),
        );
        let client = HttpPushClient::with_settings("/data", None);

        for _ in 0..2 {
            session.ensure_connected().await.unwrap();
            client
                .push(&mut session, &payload("{}"), |_, _| {})
                .await
                .unwrap();
        }

        assert_eq!(session.dial_attempts(), 1);
        assert_eq!(server.accepts.load(Ordering::SeqCst), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = spawn_server(vec![]).await;
        let mut session = connected_session(server.addr, Duration::from_secs(1)).await;
        let client = HttpPushClient::with_settings("/data", None);

        let mut called = false;
        let result = client
            .push(&mut session, &payload("{}"), |_, _| called = true)
            .await;

        assert!(matches!(result, Err(PushError::Timeout)), "{:?}", result);
        assert!(!called);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_empty_body_yields_single_final() {
        let server = spawn_server(vec!["HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n"]).await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", None);

        let mut states = Vec::new();
        let summary = client
            .push(&mut session, &payload("{}"), |fragment, state| {
                assert!(fragment.data.is_empty());
                states.push(state);
            })
            .await
            .unwrap();

        assert_eq!(states, vec![DataState::Final]);
        assert_eq!(summary.fragments, 1);
        assert_eq!(summary.bytes, 0);
    }

    #[tokio::test]
    async fn test_error_status_is_still_delivered() {
        let server = spawn_server(vec![
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 12\r\n\r\nbad token!!\n",
        ])
        .await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", None);

        let summary = client
            .push(&mut session, &payload("{}"), |_, _| {})
            .await
            .unwrap();

        assert_eq!(summary.status, StatusCode::UNAUTHORIZED);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_not_connected_is_rejected() {
        let mut session = TransportSession::with_settings(
            "127.0.0.1",
            9,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let client = HttpPushClient::with_settings("/data", None);

        let mut called = false;
        let err = client
            .push(&mut session, &payload("{}"), |_, _| called = true)
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::NotConnected));
        assert!(!called);
        assert_eq!(session.dial_attempts(), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_and_resets_session() {
        let server = spawn_server(vec!["this is not http\r\n\r\n"]).await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", None);

        let mut called = false;
        let result = client
            .push(&mut session, &payload("{}"), |_, _| called = true)
            .await;

        assert!(matches!(result, Err(PushError::Malformed(_))), "{:?}", result);
        assert!(!called);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_before_sending() {
        let mut server =
            spawn_server(vec!["HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n"]).await;
        let mut session = connected_session(server.addr, Duration::from_secs(2)).await;
        let client = HttpPushClient::with_settings("/data", Some("bad\ntoken".to_string()));

        let result = client.push(&mut session, &payload("{}"), |_, _| {}).await;

        assert!(matches!(result, Err(PushError::InvalidRequest(_))), "{:?}", result);
        assert!(server.requests.try_recv().is_err());
    }

    #[test]
    fn test_push_error_display() {
        assert_eq!(PushError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            PushError::NotConnected.to_string(),
            "Transport session is not connected"
        );
        assert!(PushError::Malformed("eof".to_string())
            .to_string()
            .contains("eof"));
    }

    #[test]
    fn test_client_from_config() {
        let mut config = Config::default();
        config.device_token = Some("abc".to_string());
        let client = HttpPushClient::new(&config);

        assert_eq!(client.path(), "/data");
        assert_eq!(client.device_token.as_deref(), Some("abc"));
    }
}
