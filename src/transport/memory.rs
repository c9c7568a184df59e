//! In-Process Transport
//!
//! A hub that hands bytes between one listening server and any number of
//! clients living in the same process. Used by tests and local simulations;
//! it honours the same key check, id assignment and delivery contract as the
//! socket transport, and can be told to lose every unreliable message.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::core::ids::ClientId;
use super::{
    lock, ClientEvent, ClientTransport, ConnectKey, DeliveryMode, PeerIdPool, ServerEvent,
    ServerTransport, TransportError,
};

type Inbox = Arc<Mutex<VecDeque<ClientEvent>>>;

struct Peer {
    inbox: Inbox,
    open: bool,
}

#[derive(Default)]
struct Hub {
    key: Option<ConnectKey>,
    pool: PeerIdPool,
    server_events: VecDeque<ServerEvent>,
    peers: BTreeMap<ClientId, Peer>,
    drop_unreliable: bool,
}

impl Hub {
    /// Mark a peer closed and tell both sides. Idempotent.
    fn close(&mut self, client: ClientId) {
        let Some(peer) = self.peers.get_mut(&client) else {
            return;
        };
        if !peer.open {
            return;
        }
        peer.open = false;
        lock(&peer.inbox).push_back(ClientEvent::Disconnected);
        self.server_events.push_back(ServerEvent::Disconnected(client));
    }
}

/// Shared in-process network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    /// Create an empty network with nobody listening.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the (single) server side.
    pub fn listen(&self, key: &str, max_connections: usize) -> Result<MemoryServer, TransportError> {
        let mut hub = lock(&self.hub);
        if hub.key.is_some() {
            return Err(TransportError::Rejected("already listening".to_string()));
        }
        hub.key = Some(ConnectKey::new(key));
        hub.pool = PeerIdPool::new(max_connections);
        Ok(MemoryServer { hub: self.hub.clone() })
    }

    /// Connect a new client presenting `key`.
    pub fn connect(&self, key: &str) -> Result<MemoryClient, TransportError> {
        let mut hub = lock(&self.hub);
        let Some(server_key) = hub.key.clone() else {
            return Err(TransportError::Rejected("nobody listening".to_string()));
        };
        if !server_key.accepts(&ConnectKey::new(key).to_header_value()) {
            warn!("Rejected in-process connection: key mismatch");
            return Err(TransportError::Rejected("invalid key".to_string()));
        }
        let Some(client) = hub.pool.acquire() else {
            warn!("Rejected in-process connection: server full");
            return Err(TransportError::Rejected("server full".to_string()));
        };

        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::from([ClientEvent::Connected])));
        hub.peers.insert(client, Peer { inbox: inbox.clone(), open: true });
        hub.server_events.push_back(ServerEvent::Connected(client));
        debug!("In-process peer {} connected", client);

        Ok(MemoryClient {
            hub: self.hub.clone(),
            inbox,
            client,
            connected: false,
        })
    }

    /// Lose (`true`) or deliver (`false`) all unreliable traffic.
    pub fn set_drop_unreliable(&self, drop: bool) {
        lock(&self.hub).drop_unreliable = drop;
    }
}

// =============================================================================
// SERVER SIDE
// =============================================================================

/// Listening end of a `MemoryNetwork`.
pub struct MemoryServer {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryServer {
    /// Close a peer's connection from the server side.
    pub fn disconnect(&mut self, client: ClientId) {
        lock(&self.hub).close(client);
    }

    /// Connections not yet reported as disconnected.
    pub fn connection_count(&self) -> usize {
        lock(&self.hub).peers.values().filter(|p| p.open).count()
    }
}

impl ServerTransport for MemoryServer {
    fn send(&mut self, to: ClientId, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        let hub = lock(&self.hub);
        let peer = hub
            .peers
            .get(&to)
            .filter(|p| p.open)
            .ok_or(TransportError::UnknownPeer(to))?;
        if mode == DeliveryMode::Unreliable && hub.drop_unreliable {
            return Ok(());
        }
        lock(&peer.inbox).push_back(ClientEvent::Message(data.to_vec()));
        Ok(())
    }

    fn poll(&mut self) -> Vec<ServerEvent> {
        let mut hub = lock(&self.hub);
        let events: Vec<ServerEvent> = hub.server_events.drain(..).collect();
        for event in &events {
            if let ServerEvent::Disconnected(client) = event {
                hub.peers.remove(client);
                hub.pool.release(*client);
            }
        }
        events
    }
}

// =============================================================================
// CLIENT SIDE
// =============================================================================

/// Connecting end of a `MemoryNetwork`. Dropping it disconnects.
pub struct MemoryClient {
    hub: Arc<Mutex<Hub>>,
    inbox: Inbox,
    client: ClientId,
    connected: bool,
}

impl MemoryClient {
    /// Id the server knows this connection by.
    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// Close the connection from the client side.
    pub fn disconnect(&mut self) {
        lock(&self.hub).close(self.client);
    }

    fn is_current(&self, hub: &Hub) -> bool {
        hub.peers
            .get(&self.client)
            .is_some_and(|p| p.open && Arc::ptr_eq(&p.inbox, &self.inbox))
    }
}

impl ClientTransport for MemoryClient {
    fn send(&mut self, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        if !self.is_current(&hub) {
            return Err(TransportError::NotConnected);
        }
        if mode == DeliveryMode::Unreliable && hub.drop_unreliable {
            return Ok(());
        }
        hub.server_events.push_back(ServerEvent::Message {
            from: self.client,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn poll(&mut self) -> Vec<ClientEvent> {
        let events: Vec<ClientEvent> = lock(&self.inbox).drain(..).collect();
        for event in &events {
            match event {
                ClientEvent::Connected => self.connected = true,
                ClientEvent::Disconnected => self.connected = false,
                ClientEvent::Message(_) => {}
            }
        }
        events
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        let mut hub = lock(&self.hub);
        if self.is_current(&hub) {
            hub.close(self.client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (MemoryNetwork, MemoryServer) {
        let net = MemoryNetwork::new();
        let server = net.listen("secret", 4).unwrap();
        (net, server)
    }

    #[test]
    fn test_connect_assigns_ids() {
        let (net, mut server) = setup();
        let a = net.connect("secret").unwrap();
        let b = net.connect("secret").unwrap();
        assert_eq!(a.client_id().get(), 1);
        assert_eq!(b.client_id().get(), 2);
        assert_eq!(
            server.poll(),
            vec![ServerEvent::Connected(a.client_id()), ServerEvent::Connected(b.client_id())]
        );
    }

    #[test]
    fn test_bad_key_rejected_without_events() {
        let (net, mut server) = setup();
        assert!(matches!(net.connect("wrong"), Err(TransportError::Rejected(_))));
        assert!(server.poll().is_empty());
    }

    #[test]
    fn test_connect_without_listener() {
        let net = MemoryNetwork::new();
        assert!(net.connect("secret").is_err());
    }

    #[test]
    fn test_full_server_rejects() {
        let net = MemoryNetwork::new();
        let _server = net.listen("k", 1).unwrap();
        let _a = net.connect("k").unwrap();
        assert!(net.connect("k").is_err());
    }

    #[test]
    fn test_messages_flow_both_ways() {
        let (net, mut server) = setup();
        let mut client = net.connect("secret").unwrap();
        assert_eq!(client.poll(), vec![ClientEvent::Connected]);
        assert!(client.is_connected());

        client.send(b"up", DeliveryMode::ReliableOrdered).unwrap();
        server.send(client.client_id(), b"down", DeliveryMode::ReliableOrdered).unwrap();

        let events = server.poll();
        assert_eq!(events.last(), Some(&ServerEvent::Message {
            from: client.client_id(),
            data: b"up".to_vec(),
        }));
        assert_eq!(client.poll(), vec![ClientEvent::Message(b"down".to_vec())]);
    }

    #[test]
    fn test_send_to_unknown_peer() {
        let (_net, mut server) = setup();
        let ghost = ClientId::from_peer(9).unwrap();
        assert!(matches!(
            server.send(ghost, b"x", DeliveryMode::ReliableOrdered),
            Err(TransportError::UnknownPeer(id)) if id == ghost
        ));
    }

    #[test]
    fn test_disconnect_releases_id_after_poll() {
        let (net, mut server) = setup();
        let mut a = net.connect("secret").unwrap();
        let id = a.client_id();
        server.poll();

        a.disconnect();
        // Not yet observed by the server: id still reserved.
        let b = net.connect("secret").unwrap();
        assert_ne!(b.client_id(), id);

        let events = server.poll();
        assert!(events.contains(&ServerEvent::Disconnected(id)));
        let c = net.connect("secret").unwrap();
        assert_eq!(c.client_id(), id);

        assert!(matches!(a.send(b"late", DeliveryMode::ReliableOrdered), Err(TransportError::NotConnected)));
        assert_eq!(a.poll(), vec![ClientEvent::Connected, ClientEvent::Disconnected]);
        assert!(!a.is_connected());
    }

    #[test]
    fn test_drop_disconnects() {
        let (net, mut server) = setup();
        let a = net.connect("secret").unwrap();
        let id = a.client_id();
        drop(a);
        assert_eq!(server.poll(), vec![ServerEvent::Connected(id), ServerEvent::Disconnected(id)]);
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_server_kick() {
        let (net, mut server) = setup();
        let mut a = net.connect("secret").unwrap();
        server.poll();
        server.disconnect(a.client_id());
        assert_eq!(server.poll(), vec![ServerEvent::Disconnected(a.client_id())]);
        assert_eq!(a.poll(), vec![ClientEvent::Connected, ClientEvent::Disconnected]);
    }

    #[test]
    fn test_unreliable_loss() {
        let (net, mut server) = setup();
        let mut client = net.connect("secret").unwrap();
        server.poll();
        net.set_drop_unreliable(true);
        client.send(b"pose", DeliveryMode::Unreliable).unwrap();
        client.send(b"spawn", DeliveryMode::ReliableOrdered).unwrap();
        assert_eq!(server.poll(), vec![ServerEvent::Message {
            from: client.client_id(),
            data: b"spawn".to_vec(),
        }]);
    }
}
