//! Server network layer handling UDP communications and the simulation clock

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::utils::{get_timestamp, truncate_text};
use crate::BoxError;
use bincode::serialize;
use log::{debug, error, info, warn};
use shared::{Packet, PlayerIntent, DEFAULT_USERNAME, MAX_MESSAGE_LEN, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
///
/// Only the task running [`Server::run`] touches `game_state`; joins, leaves
/// and ticks are serialized through its select loop.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(),
            tick_duration,
            client_timeout,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping the main loop from another task
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = Packet::decode(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast packet: {}", e);
                                continue;
                            }
                        };

                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    info!("Client {} timed out", client_id);
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Registers a connection, spawns its player and announces it
    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A reconnect from the same address replaces the old session
        let existing_client_id = {
            let mut clients = self.clients.write().await;
            let existing = clients.find_client_by_addr(addr);
            if let Some(existing_id) = existing {
                clients.remove_client(&existing_id);
            }
            existing
        };
        if let Some(existing_id) = existing_client_id {
            info!("Replacing existing client {} from {}", existing_id, addr);
            self.remove_player(existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        let player = self.game_state.add_player(client_id);
        self.send_packet(Packet::Connected { client_id }, addr);
        self.send_packet(
            Packet::CurrentPlayers {
                players: self.game_state.snapshot(),
            },
            addr,
        );
        self.broadcast_packet(
            Packet::NewPlayer {
                id: client_id,
                player,
            },
            Some(client_id),
        );
    }

    /// Drops a player and tells everyone still connected
    fn remove_player(&mut self, client_id: u32) {
        if self.game_state.remove_player(&client_id) {
            self.broadcast_packet(Packet::PlayerDisconnected { id: client_id }, None);
        }
    }

    fn relay_chat(&self, client_id: u32, text: &str) {
        let message = truncate_text(text, MAX_MESSAGE_LEN);
        if message.is_empty() {
            return;
        }

        let username = self
            .game_state
            .username(client_id)
            .unwrap_or(DEFAULT_USERNAME)
            .to_string();
        debug!("Chat from {} ({}): {}", client_id, username, message);
        self.broadcast_packet(Packet::ReceiveMessage { username, message }, None);
    }

    /// Processes incoming packets
    ///
    /// Anything other than `Connect` from an unregistered address is dropped.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        let Some(client_id) = client_id else {
            debug!("Dropping packet from unknown address {}", addr);
            return;
        };

        match packet {
            Packet::SetUsername { name } => {
                self.game_state.set_username(client_id, name.as_deref());
            }

            Packet::MovePlayer { intent } => {
                self.buffer_intent(client_id, intent).await;
            }

            Packet::ReleaseArrow => {
                let mut clients = self.clients.write().await;
                clients.request_release(client_id);
            }

            Packet::SendMessage { text } => {
                self.relay_chat(client_id, &text);
            }

            Packet::Heartbeat => {}

            Packet::Disconnect => {
                {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
                self.remove_player(client_id);
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn buffer_intent(&self, client_id: u32, intent: PlayerIntent) {
        let mut clients = self.clients.write().await;
        clients.set_intent(client_id, intent);
    }

    /// Runs one simulation step and publishes the result
    async fn run_tick(&mut self) {
        let now = get_timestamp();

        let inputs = {
            let mut clients = self.clients.write().await;
            clients.drain_inputs()
        };

        let report = self.game_state.step(inputs, now);
        self.broadcast_game_state(now).await;

        if self.game_state.tick % 60 == 0 {
            let client_count = self.clients.read().await.len();
            if client_count > 0 {
                debug!(
                    "Tick {}: {} clients, {} arrows in flight, {} hits",
                    self.game_state.tick,
                    client_count,
                    self.game_state.live_arrows(),
                    report.hits.len()
                );
            }
        }
    }

    /// Broadcasts current game state to all connected clients
    async fn broadcast_game_state(&self, timestamp: u64) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let packet = Packet::GameState {
            tick: self.game_state.tick,
            timestamp,
            players: self.game_state.snapshot(),
        };

        self.broadcast_packet(packet, None);
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.remove_player(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                },
            }
        }

        Ok(())
    }
}
