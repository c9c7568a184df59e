//! WebSocket Transport
//!
//! tokio + tokio-tungstenite implementation of both transport halves. Every
//! connection gets its own task that owns the socket; the driving loop only
//! sees channels, so `poll` and `send` never block.
//!
//! Both delivery modes share the ordered TCP stream. An unreliable send that
//! does not fit a peer's outbound queue is dropped; a reliable one closes
//! the connection.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_hdr_async, connect_async};
use tracing::{debug, error, info, warn};

use crate::core::ids::ClientId;
use super::key::CONNECT_KEY_HEADER;
use super::{
    lock, ClientEvent, ClientTransport, ConnectKey, DeliveryMode, PeerIdPool, ServerEvent,
    ServerTransport, TransportError,
};

/// Events buffered between connection tasks and `poll`.
const INBOUND_QUEUE: usize = 4096;

enum Inbound {
    Connected {
        client: ClientId,
        outbox: mpsc::Sender<Vec<u8>>,
    },
    Message {
        from: ClientId,
        data: Vec<u8>,
    },
    Disconnected(ClientId),
}

fn http_error(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

// =============================================================================
// SERVER SIDE
// =============================================================================

/// Listening WebSocket transport.
pub struct WsServer {
    local_addr: SocketAddr,
    inbound: mpsc::Receiver<Inbound>,
    peers: BTreeMap<ClientId, mpsc::Sender<Vec<u8>>>,
    /// Torn down by us, `Disconnected` not yet seen.
    closing: BTreeSet<ClientId>,
    pool: Arc<Mutex<PeerIdPool>>,
    accept_task: JoinHandle<()>,
}

impl WsServer {
    /// Bind `host:port` and start accepting.
    pub async fn listen(
        host: &str,
        port: u16,
        key: &str,
        max_connections: usize,
        outbound_queue: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        let key = ConnectKey::new(key);
        info!("WebSocket transport listening on {} (key {})", local_addr, key.fingerprint());

        let pool = Arc::new(Mutex::new(PeerIdPool::new(max_connections)));
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);

        let accept_pool = pool.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("set_nodelay failed for {}: {}", addr, e);
                }
                tokio::spawn(run_peer(
                    stream,
                    addr,
                    key.clone(),
                    accept_pool.clone(),
                    inbound_tx.clone(),
                    outbound_queue.max(1),
                ));
            }
        });

        Ok(Self {
            local_addr,
            inbound,
            peers: BTreeMap::new(),
            closing: BTreeSet::new(),
            pool,
            accept_task,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close a peer's connection. `Disconnected` follows from `poll`.
    pub fn disconnect(&mut self, client: ClientId) {
        if self.peers.remove(&client).is_some() {
            self.closing.insert(client);
        }
    }

    /// Connections not yet reported as disconnected.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }
}

impl ServerTransport for WsServer {
    fn send(&mut self, to: ClientId, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        let outbox = self.peers.get(&to).ok_or(TransportError::UnknownPeer(to))?;
        match outbox.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) if mode == DeliveryMode::Unreliable => {
                debug!("Outbound queue full for {}, dropping unreliable message", to);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, closing connection", to);
                self.disconnect(to);
                Err(TransportError::QueueFull(to))
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::UnknownPeer(to)),
        }
    }

    fn poll(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(inbound) = self.inbound.try_recv() {
            match inbound {
                Inbound::Connected { client, outbox } => {
                    self.peers.insert(client, outbox);
                    events.push(ServerEvent::Connected(client));
                }
                Inbound::Message { from, data } => {
                    if !self.closing.contains(&from) {
                        events.push(ServerEvent::Message { from, data });
                    }
                }
                Inbound::Disconnected(client) => {
                    self.peers.remove(&client);
                    self.closing.remove(&client);
                    lock(&self.pool).release(client);
                    events.push(ServerEvent::Disconnected(client));
                }
            }
        }
        events
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Handshake, then pump frames until either side goes away.
async fn run_peer(
    stream: TcpStream,
    addr: SocketAddr,
    key: ConnectKey,
    pool: Arc<Mutex<PeerIdPool>>,
    inbound: mpsc::Sender<Inbound>,
    outbound_queue: usize,
) {
    let mut assigned: Option<ClientId> = None;
    let handshake = accept_hdr_async(stream, |request: &Request, response: Response| {
        let presented = request
            .headers()
            .get(CONNECT_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !key.accepts(presented) {
            return Err(http_error(StatusCode::FORBIDDEN, "invalid connect key"));
        }
        match lock(&pool).acquire() {
            Some(client) => {
                assigned = Some(client);
                Ok(response)
            }
            None => Err(http_error(StatusCode::SERVICE_UNAVAILABLE, "server full")),
        }
    })
    .await;

    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Rejected connection from {}: {}", addr, e);
            if let Some(client) = assigned {
                lock(&pool).release(client);
            }
            return;
        }
    };
    let Some(client) = assigned else {
        return;
    };

    let (outbox, mut outbox_rx) = mpsc::channel::<Vec<u8>>(outbound_queue);
    if inbound.send(Inbound::Connected { client, outbox }).await.is_err() {
        lock(&pool).release(client);
        return;
    }
    debug!("Peer {} connected from {}", client, addr);

    let (mut sink, mut frames) = ws.split();
    loop {
        tokio::select! {
            outgoing = outbox_rx.recv() => match outgoing {
                Some(data) => {
                    if let Err(e) = sink.send(Message::Binary(data)).await {
                        debug!("Write to {} failed: {}", client, e);
                        break;
                    }
                }
                // Server dropped its handle.
                None => break,
            },
            incoming = frames.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    if inbound.send(Inbound::Message { from: client, data }).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read from {} failed: {}", client, e);
                    break;
                }
            },
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = inbound.send(Inbound::Disconnected(client)).await;
    debug!("Peer {} disconnected", client);
}

// =============================================================================
// CLIENT SIDE
// =============================================================================

/// Connecting WebSocket transport. Dropping it closes the connection.
pub struct WsClient {
    outbox: Option<mpsc::Sender<Vec<u8>>>,
    inbound: mpsc::Receiver<ClientEvent>,
    connected: bool,
}

impl WsClient {
    /// Open `ws://address:port/` presenting `key`.
    pub async fn connect(
        address: &str,
        port: u16,
        key: &str,
        outbound_queue: usize,
    ) -> Result<Self, TransportError> {
        let mut request = format!("ws://{}:{}/", address, port).into_client_request()?;
        let header = HeaderValue::from_str(&ConnectKey::new(key).to_header_value())
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        request.headers_mut().insert(CONNECT_KEY_HEADER, header);

        let (ws, _) = match connect_async(request).await {
            Ok(connected) => connected,
            Err(tungstenite::Error::Http(response)) => {
                return Err(TransportError::Rejected(response.status().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        info!("Connected to ws://{}:{}/", address, port);

        let (outbox, mut outbox_rx) = mpsc::channel::<Vec<u8>>(outbound_queue.max(1));
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let _ = inbound_tx.try_send(ClientEvent::Connected);

        tokio::spawn(async move {
            let (mut sink, mut frames) = ws.split();
            loop {
                tokio::select! {
                    outgoing = outbox_rx.recv() => match outgoing {
                        Some(data) => {
                            if let Err(e) = sink.send(Message::Binary(data)).await {
                                debug!("Write to server failed: {}", e);
                                break;
                            }
                        }
                        None => break,
                    },
                    incoming = frames.next() => match incoming {
                        Some(Ok(Message::Binary(data))) => {
                            if inbound_tx.send(ClientEvent::Message(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Read from server failed: {}", e);
                            break;
                        }
                    },
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = inbound_tx.send(ClientEvent::Disconnected).await;
        });

        Ok(Self {
            outbox: Some(outbox),
            inbound,
            connected: false,
        })
    }

    /// Close the connection. `Disconnected` follows from `poll`.
    pub fn disconnect(&mut self) {
        self.outbox = None;
    }
}

impl ClientTransport for WsClient {
    fn send(&mut self, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        let outbox = self.outbox.as_ref().ok_or(TransportError::NotConnected)?;
        match outbox.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) if mode == DeliveryMode::Unreliable => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue to server full, closing connection");
                self.outbox = None;
                Err(TransportError::NotConnected)
            }
            Err(TrySendError::Closed(_)) => {
                self.outbox = None;
                Err(TransportError::NotConnected)
            }
        }
    }

    fn poll(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbound.try_recv() {
            match event {
                ClientEvent::Connected => self.connected = true,
                ClientEvent::Disconnected => {
                    self.connected = false;
                    self.outbox = None;
                }
                ClientEvent::Message(_) => {}
            }
            events.push(event);
        }
        events
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
