//! Socket.IO client transport over a WebSocket

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{EventSink, Transport};
use crate::codec::{self, Frame};
use crate::error::TransportError;
use crate::events::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the Engine.IO v4 WebSocket endpoint for a server base URL
///
/// `https://host` becomes `wss://host/socket.io/?EIO=4&transport=websocket`.
pub fn socket_io_endpoint(server_url: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::Handshake(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Handshake(format!("cannot use scheme {}", scheme)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

#[derive(Default)]
struct Shared {
    open: AtomicBool,
    /// Bumped on every connect so tasks of an old socket leave the new one alone
    generation: AtomicU64,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    sink: Mutex<Option<EventSink>>,
}

impl Shared {
    fn mark_closed(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.open.store(false, Ordering::SeqCst);
            self.outgoing.lock().take();
        }
    }

    fn send_raw(&self, message: Message) -> Result<(), TransportError> {
        let outgoing = self.outgoing.lock();
        match outgoing.as_ref() {
            Some(tx) if self.open.load(Ordering::SeqCst) => {
                tx.send(message).map_err(|_| TransportError::NotConnected)
            }
            _ => Err(TransportError::NotConnected),
        }
    }

    fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::Message(message) => {
                let mut sink = self.sink.lock();
                let delivered = match sink.as_ref() {
                    Some(tx) => tx.send(message).is_ok(),
                    None => {
                        debug!("No subscriber, dropping inbound message");
                        true
                    }
                };
                if !delivered {
                    debug!("Subscriber went away, detaching sink");
                    sink.take();
                }
            }
            ServerEvent::Other { name } => {
                debug!("Ignoring server event: {}", name);
            }
        }
    }
}

/// One WebSocket connection to a Socket.IO server, default namespace
pub struct SocketIoTransport {
    endpoint: Url,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl SocketIoTransport {
    pub fn new(server_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: socket_io_endpoint(server_url)?,
            connect_timeout,
            shared: Arc::new(Shared::default()),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Engine open, then namespace connect
    ///
    /// Returns once the server acknowledges the namespace. Events must not
    /// be emitted before that ack or the server drops the connection.
    async fn handshake(&self, ws: &mut WsStream) -> Result<(), TransportError> {
        let mut engine_open = false;
        while let Some(next) = ws.next().await {
            let text = match next? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            match codec::decode(text.as_str())? {
                Frame::Open(info) if !engine_open => {
                    debug!(
                        "Engine open: sid={} ping_interval={}ms",
                        info.sid, info.ping_interval
                    );
                    ws.send(Message::Text(codec::connect_frame().into())).await?;
                    engine_open = true;
                }
                Frame::Ping => ws.send(Message::Text(codec::pong_frame().into())).await?,
                Frame::Connected if engine_open => {
                    debug!("Namespace connected");
                    return Ok(());
                }
                Frame::ConnectError(reason) => {
                    return Err(TransportError::Handshake(format!(
                        "namespace connect rejected: {}",
                        reason
                    )))
                }
                Frame::Close | Frame::Disconnected => break,
                other => debug!("Frame during handshake ignored: {:?}", other),
            }
        }
        Err(TransportError::Handshake(
            "connection closed during handshake".to_string(),
        ))
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let connecting = async {
            let (mut ws, _response) = connect_async(self.endpoint.as_str()).await?;
            self.handshake(&mut ws).await?;
            Ok::<_, TransportError>(ws)
        };
        let ws = timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (ws_write, ws_read) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        *self.shared.outgoing.lock() = Some(outgoing_tx);
        self.shared.open.store(true, Ordering::SeqCst);

        tokio::spawn(send_task(
            ws_write,
            outgoing_rx,
            self.shared.clone(),
            generation,
        ));
        tokio::spawn(receive_task(ws_read, self.shared.clone(), generation));

        info!("Connected to {}", self.endpoint);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        let frame = codec::encode_event(&event)?;
        debug!("Emitting {}", event.name());
        self.shared.send_raw(Message::Text(frame.into()))
    }

    fn set_sink(&self, sink: Option<EventSink>) {
        *self.shared.sink.lock() = sink;
    }

    async fn close(&self) {
        let _ = self.shared.send_raw(Message::Close(None));
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.mark_closed(generation);
        info!("Closed connection to {}", self.endpoint);
    }
}

async fn send_task(
    mut ws_write: futures::stream::SplitSink<WsStream, Message>,
    mut outgoing_rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(message) = outgoing_rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = ws_write.send(message).await {
            warn!("WebSocket write failed: {}", err);
            break;
        }
        if closing {
            break;
        }
    }
    shared.mark_closed(generation);
}

async fn receive_task(
    mut ws_read: futures::stream::SplitStream<WsStream>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(next) = ws_read.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                debug!("Server closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!("WebSocket read failed: {}", err);
                break;
            }
        };

        let frame = match codec::decode(text.as_str()) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping undecodable frame: {}", err);
                continue;
            }
        };

        match frame {
            Frame::Ping => {
                if shared
                    .send_raw(Message::Text(codec::pong_frame().into()))
                    .is_err()
                {
                    break;
                }
            }
            Frame::Event(event) => shared.dispatch(event),
            Frame::Connected => debug!("Duplicate namespace ack"),
            Frame::ConnectError(reason) => {
                warn!("Namespace connect rejected: {}", reason);
                break;
            }
            Frame::Close | Frame::Disconnected => {
                info!("Server ended the session");
                break;
            }
            Frame::Open(_) | Frame::Pong | Frame::Ignored => {}
        }
    }
    shared.mark_closed(generation);
}
