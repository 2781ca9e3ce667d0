//! Client connection management and intent buffering for the arena server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Buffering of the most recent movement intent and pending shots
//! - Connection health monitoring and capacity limits
//!
//! Intents arrive whenever the network delivers them, but the world only
//! changes inside a tick. The manager keeps the latest value per client and
//! hands everything over in one batch at the start of each tick.

use log::info;
use shared::PlayerIntent;
use std::collections::HashMap;
use std::mem;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Input collected for one client since the previous tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferedInput {
    /// Latest movement intent, if any arrived. Later packets overwrite earlier ones.
    pub intent: Option<PlayerIntent>,
    /// Set when at least one `ReleaseArrow` arrived.
    pub release: bool,
}

impl BufferedInput {
    pub fn is_empty(&self) -> bool {
        self.intent.is_none() && !self.release
    }
}

/// Represents a connected client and its buffered input
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Input waiting for the next tick
    pub pending: BufferedInput,
}

impl Client {
    /// Creates a new client with the given ID and network address
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            pending: BufferedInput::default(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Replaces the buffered intent; the newest one wins.
    pub fn set_intent(&mut self, intent: PlayerIntent) {
        self.touch();
        self.pending.intent = Some(intent);
    }

    /// Latches a shot request until the next tick consumes it.
    pub fn request_release(&mut self) {
        self.touch();
        self.pending.release = true;
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their buffered input
///
/// The ClientManager provides centralized control over client connections,
/// enforces server capacity limits and hands buffered input to the tick.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and are never reused while the server runs.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks a client as alive. Returns false if the client ID is unknown.
    pub fn touch(&mut self, client_id: u32) -> bool {
        self.clients
            .get_mut(&client_id)
            .map(Client::touch)
            .is_some()
    }

    /// Buffers a movement intent for a client. Returns false if the client ID is unknown.
    pub fn set_intent(&mut self, client_id: u32, intent: PlayerIntent) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.set_intent(intent);
            true
        } else {
            false
        }
    }

    /// Buffers a shot request for a client. Returns false if the client ID is unknown.
    pub fn request_release(&mut self, client_id: u32) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.request_release();
            true
        } else {
            false
        }
    }

    /// Takes every client's buffered input, leaving the buffers empty
    ///
    /// Clients with nothing pending are omitted. The result is sorted by
    /// client ID so the tick applies input in a stable order.
    pub fn drain_inputs(&mut self) -> Vec<(u32, BufferedInput)> {
        let mut drained: Vec<(u32, BufferedInput)> = self
            .clients
            .iter_mut()
            .filter(|(_, client)| !client.pending.is_empty())
            .map(|(id, client)| (*id, mem::take(&mut client.pending)))
            .collect();

        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so the game can drop their players.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses
    ///
    /// Used for broadcasting to every connected client.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
