//! WebSocket client transport.
//!
//! Each link spawns a tokio task that owns the socket:
//!
//! - Connects with `tokio_tungstenite::connect_async`
//! - Forwards text frames from the server as [`TransportEvent::Message`]
//! - Writes frames queued through [`Link::send`]
//! - Reports the close code and reason on shutdown

// ============================================================================
// Imports
// ============================================================================

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{CloseInfo, Link, OpenedLink, Transport, TransportEvent};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

/// Internal commands for the link task.
enum LinkCommand {
    /// Write a text frame.
    Send(String),
    /// Close with code and reason.
    Close { code: u16, reason: String },
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over real WebSocket connections.
///
/// `wss://` endpoints need the `native-tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Url) -> Result<OpenedLink> {
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::invalid_endpoint(endpoint.as_str()));
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::connection(format!("no tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        runtime.spawn(run_link(endpoint.to_string(), command_rx, event_tx));

        Ok(OpenedLink {
            link: Box::new(WebSocketLink { command_tx }),
            events,
        })
    }
}

// ============================================================================
// WebSocketLink
// ============================================================================

/// Write half handed to the manager.
struct WebSocketLink {
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl Link for WebSocketLink {
    fn send(&self, frame: String) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.command_tx.send(LinkCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

// ============================================================================
// Link Task
// ============================================================================

/// Owns the socket for one link.
async fn run_link(
    endpoint: String,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let emit = |event: TransportEvent| {
        let _ = event_tx.send(event);
    };

    debug!(%endpoint, "Connecting");

    // Frames queued before the handshake completes are written right after it.
    let mut early_frames = Vec::new();
    let connect = connect_async(endpoint.as_str());
    tokio::pin!(connect);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws_stream, _response)) => break ws_stream,
                Err(e) => {
                    error!(%endpoint, error = %e, "WebSocket connect failed");
                    emit(TransportEvent::Error(e.to_string()));
                    emit(TransportEvent::Closed(CloseInfo::abnormal()));
                    return;
                }
            },

            command = command_rx.recv() => match command {
                Some(LinkCommand::Send(frame)) => early_frames.push(frame),
                Some(LinkCommand::Close { code, reason }) => {
                    debug!(%endpoint, "Closed before handshake completed");
                    emit(TransportEvent::Closed(CloseInfo::new(code, reason)));
                    return;
                }
                None => {
                    debug!(%endpoint, "Link dropped before handshake completed");
                    return;
                }
            },
        }
    };

    info!(%endpoint, "WebSocket connection established");
    emit(TransportEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    for frame in early_frames {
        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
            emit(TransportEvent::Error(e.to_string()));
            emit(TransportEvent::Closed(CloseInfo::abnormal()));
            return;
        }
    }

    let close_info = loop {
        tokio::select! {
            // Incoming frames from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Frame received");
                        emit(TransportEvent::Message(text.as_str().to_owned()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!("WebSocket closed by remote");
                        emit(TransportEvent::Closing);
                        break frame
                            .map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| CloseInfo::new(1005, ""));
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        emit(TransportEvent::Error(e.to_string()));
                        break CloseInfo::abnormal();
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break CloseInfo::abnormal();
                    }

                    // Binary frames are not part of the protocol; pings are answered by tungstenite
                    _ => {}
                }
            }

            // Commands from the manager
            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(frame)) => {
                        if let Err(e) = write_frame(&mut ws_write, frame).await {
                            warn!(error = %e, "Failed to write frame");
                            emit(TransportEvent::Error(e.to_string()));
                            break CloseInfo::abnormal();
                        }
                    }

                    Some(LinkCommand::Close { code, reason }) => {
                        debug!(code, "Close requested");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.clone().into(),
                        };
                        let _ = ws_write.send(Message::Close(Some(frame))).await;
                        break CloseInfo::new(code, reason);
                    }

                    None => {
                        debug!("Link dropped");
                        let _ = ws_write.close().await;
                        break CloseInfo::abnormal();
                    }
                }
            }
        }
    };

    emit(TransportEvent::Closed(close_info));
    debug!("Link task terminated");
}

/// Writes one text frame.
async fn write_frame(ws_write: &mut WsWrite, frame: String) -> Result<()> {
    ws_write.send(Message::Text(frame.into())).await?;
    trace!("Frame sent");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[test]
    fn test_open_outside_runtime_fails() {
        let url = Url::parse("ws://127.0.0.1:9/api/ws/realtime").expect("url");
        let err = WebSocketTransport::new().open(&url).err().expect("should fail");
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_rejects_http_scheme() {
        let url = Url::parse("http://127.0.0.1/api/ws/realtime").expect("url");
        let err = WebSocketTransport::new().open(&url).err().expect("should fail");
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_close() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/api/ws/realtime")).expect("url");
        let mut opened = WebSocketTransport::new().open(&url).expect("open starts");

        assert!(matches!(
            opened.events.recv().await,
            Some(TransportEvent::Error(_))
        ));
        assert_eq!(
            opened.events.recv().await,
            Some(TransportEvent::Closed(CloseInfo::abnormal()))
        );
    }

    #[tokio::test]
    async fn test_round_trip_with_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        // Echo server that greets like the console does
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            ws.send(Message::Text(r#"{"type":"connected","client_id":"c1"}"#.into()))
                .await
                .expect("greet");
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        ws.send(Message::Text(text)).await.expect("echo");
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/api/ws/realtime")).expect("url");
        let mut opened = WebSocketTransport::new().open(&url).expect("open starts");

        assert_eq!(opened.events.recv().await, Some(TransportEvent::Open));
        assert_eq!(
            opened.events.recv().await,
            Some(TransportEvent::Message(
                r#"{"type":"connected","client_id":"c1"}"#.to_string()
            ))
        );

        opened.link.send(r#"{"action":"ping"}"#.to_string()).expect("send");
        assert_eq!(
            opened.events.recv().await,
            Some(TransportEvent::Message(r#"{"action":"ping"}"#.to_string()))
        );

        opened.link.close(1000, "Client disconnect");
        assert_eq!(
            opened.events.recv().await,
            Some(TransportEvent::Closed(CloseInfo::new(1000, "Client disconnect")))
        );
    }
}
