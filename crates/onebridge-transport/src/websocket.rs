//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The stream is split into a sink half and a stream half, each behind its
//! own lock, so an RPC call can be written while the read loop is parked
//! in `recv()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

fn io_error(
    kind: std::io::ErrorKind,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> std::io::Error {
    std::io::Error::new(kind, e)
}

// ---------------------------------------------------------------------------
// Reverse mode: the OneBot implementation connects to us
// ---------------------------------------------------------------------------

/// Handshake requirements for reverse connections.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Request path the implementation must upgrade on, e.g. `/onebot`.
    pub path: String,
    /// Account id that must appear in the `X-Self-ID` header.
    pub self_id: String,
    /// Access token expected in `Authorization`, if any.
    pub token: Option<String>,
}

/// A WebSocket [`Transport`] that accepts reverse connections from a
/// OneBot implementation.
///
/// The upgrade is refused with `403` unless the request carries
/// `X-Client-Role: Universal` and the configured `X-Self-ID`.
pub struct WebSocketListener {
    listener: TcpListener,
    config: ListenerConfig,
}

impl WebSocketListener {
    /// Binds a new reverse WebSocket listener to the given address.
    pub async fn bind(
        addr: &str,
        config: ListenerConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, path = %config.path, "reverse WebSocket listening");
        Ok(Self { listener, config })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

/// Validates the upgrade request headers of a reverse connection.
fn check_handshake(
    config: &ListenerConfig,
    request: &Request,
) -> Result<(), (StatusCode, String)> {
    if request.uri().path() != config.path {
        return Err((StatusCode::NOT_FOUND, "unknown path".into()));
    }
    let headers = request.headers();
    let role = headers.get("x-client-role").and_then(|v| v.to_str().ok());
    if role != Some("Universal") {
        return Err((StatusCode::FORBIDDEN, "invalid x-client-role".into()));
    }
    let self_id = headers.get("x-self-id").and_then(|v| v.to_str().ok());
    if self_id != Some(config.self_id.as_str()) {
        return Err((StatusCode::FORBIDDEN, "invalid x-self-id".into()));
    }
    if let Some(token) = &config.token {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let presented = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("Token "))
            .unwrap_or_default();
        if presented != token {
            return Err((StatusCode::UNAUTHORIZED, "invalid access token".into()));
        }
    }
    Ok(())
}

impl Transport for WebSocketListener {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let config = self.config.clone();
        let callback = move |request: &Request, response: Response| {
            match check_handshake(&config, request) {
                Ok(()) => Ok(response),
                Err((status, reason)) => {
                    tracing::debug!(%status, %reason, "rejecting reverse connection");
                    let mut error = ErrorResponse::new(Some(reason));
                    *error.status_mut() = status;
                    Err(error)
                }
            }
        };

        let ws = tokio_tungstenite::accept_hdr_async(
            MaybeTlsStream::Plain(stream),
            callback,
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(io_error(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let conn = WebSocketConnection::from_stream(ws);
        tracing::debug!(id = %conn.id, %addr, "accepted reverse WebSocket connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A single WebSocket connection, forward or reverse.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
}

impl WebSocketConnection {
    fn from_stream(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: next_connection_id(),
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    /// Dials a OneBot implementation's forward WebSocket endpoint.
    ///
    /// When `token` is set it is sent as `Authorization: Bearer <token>`.
    pub async fn connect(
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<Self, TransportError> {
        let connect_failed = |source: std::io::Error| {
            TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                source,
            }
        };

        let mut request = endpoint.into_client_request().map_err(|e| {
            connect_failed(io_error(std::io::ErrorKind::InvalidInput, e))
        })?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| {
                    connect_failed(io_error(std::io::ErrorKind::InvalidInput, e))
                })?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (ws, _) =
            tokio_tungstenite::connect_async(request).await.map_err(|e| {
                connect_failed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let conn = Self::from_stream(ws);
        tracing::debug!(id = %conn.id, endpoint, "connected forward WebSocket");
        Ok(conn)
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: &str) -> Result<(), Self::Error> {
        let msg = Message::text(frame.to_owned());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<String>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
