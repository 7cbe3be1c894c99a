// WebSocket server for league clients.

use std::net::SocketAddr;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use pokedraft_core::events::DraftEvent;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::ServerMessage;

/// Outgoing replies buffered per connection.
const REPLY_BUFFER: usize = 32;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the WebSocket handshake.
    Connected { addr: String },
    /// A client's connection ended.
    Disconnected { addr: String },
    /// A text frame from a client (raw JSON). The response goes back through
    /// `reply` to that client only.
    Message {
        addr: String,
        text: String,
        reply: mpsc::Sender<String>,
    },
}

/// Source of incoming connections. Abstracted so the accept loop can be
/// driven without opening real ports.
#[async_trait]
pub trait Listener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> std::io::Result<(Self::Stream, String)>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// TCP listener on `127.0.0.1`.
pub struct TungsteniteListener {
    inner: TcpListener,
}

impl TungsteniteListener {
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let inner = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for TungsteniteListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Accept connections forever, serving each one in its own task.
///
/// Every connection forwards its text frames to `tx` and receives every
/// notification published on `events`. Returns when `tx` is closed or the
/// listener fails.
pub async fn run<L: Listener>(
    mut listener: L,
    tx: mpsc::Sender<WsEvent>,
    events: broadcast::Sender<DraftEvent>,
) -> anyhow::Result<()> {
    info!("WebSocket server listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        info!("Accepted TCP connection from {addr}");

        let tx = tx.clone();
        let notifications = events.subscribe();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let (write, read) = ws.split();
                    serve_connection(read, write, addr, tx, notifications).await;
                }
                Err(e) => warn!("WebSocket handshake failed for {addr}: {e}"),
            }
        });
    }

    Ok(())
}

/// Drive one client connection until it closes.
///
/// Pending replies and notifications are written before the next inbound
/// frame is read, so a client sees the response to a request before the
/// response to anything it sends later. A notification caused by a request
/// is published while that request is handled, so it may reach the client
/// before or after the reply.
///
/// Generic over the stream and sink halves so it can be tested with
/// in-memory channels.
pub async fn serve_connection<St, Si>(
    mut read: St,
    mut write: Si,
    addr: String,
    tx: mpsc::Sender<WsEvent>,
    mut notifications: broadcast::Receiver<DraftEvent>,
) where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    if tx
        .send(WsEvent::Connected { addr: addr.clone() })
        .await
        .is_err()
    {
        return;
    }

    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);
    let mut notifications_open = true;

    loop {
        tokio::select! {
            biased;

            Some(out) = reply_rx.recv() => {
                if let Err(e) = write.send(Message::Text(out.into())).await {
                    warn!("Failed to write reply to {addr}: {e}");
                    break;
                }
            }

            event = notifications.recv(), if notifications_open => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&ServerMessage::Event { event }) else {
                            continue;
                        };
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            warn!("Failed to push event to {addr}: {e}");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {addr} lagged; {skipped} notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Notification channel closed");
                        notifications_open = false;
                    }
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = WsEvent::Message {
                            addr: addr.clone(),
                            text: text.to_string(),
                            reply: reply_tx.clone(),
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {addr} sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {addr}: {e}");
                        break;
                    }
                    None => break,
                    Some(Ok(_)) => {
                        // Ignore Binary, Ping, Pong, Frame variants.
                    }
                }
            }
        }
    }

    let _ = tx.send(WsEvent::Disconnected { addr }).await;
}
