//! Headless bot for poking a running arena server from the command line.
//!
//! Joins, names itself, walks, aims, shoots, says hello and leaves, logging
//! what the server sends back along the way.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use shared::{Packet, PlayerIntent, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name to play under
    #[arg(short, long, default_value = "bot")]
    username: String,

    /// How long to stay connected
    #[arg(long, default_value = "10")]
    seconds: u64,
}

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> Result<(), BoxError> {
    let data = serialize(packet)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

/// Intent the bot holds during a given second of the session.
fn script(second: u64) -> Option<Packet> {
    let intent = match second % 5 {
        0 => PlayerIntent {
            right: true,
            ..PlayerIntent::default()
        },
        1 => PlayerIntent {
            left: true,
            jump: true,
            ..PlayerIntent::default()
        },
        2 => PlayerIntent {
            aiming: true,
            rotate_left: true,
            ..PlayerIntent::default()
        },
        3 => return Some(Packet::ReleaseArrow),
        _ => PlayerIntent::default(),
    };
    Some(Packet::MovePlayer { intent })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let args = Args::parse();
    let server_addr = args.server.parse::<SocketAddr>()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let mut buf = vec![0u8; 65536];
    let client_id = loop {
        let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
        match deserialize::<Packet>(&buf[..len]) {
            Ok(Packet::Connected { client_id }) => break client_id,
            Ok(Packet::Disconnected { reason }) => {
                warn!("Server refused connection: {}", reason);
                return Ok(());
            }
            Ok(other) => debug!("Ignoring {:?} while connecting", other),
            Err(e) => warn!("Failed to deserialize response: {}", e),
        }
    };
    info!("Connected with client ID {}", client_id);

    send(
        &socket,
        &Packet::SetUsername {
            name: Some(args.username.clone()),
        },
        server_addr,
    )
    .await?;
    send(
        &socket,
        &Packet::SendMessage {
            text: format!("hello from {}", args.username),
        },
        server_addr,
    )
    .await?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let started = Instant::now();
    let mut ticker = interval(Duration::from_secs(1));
    let mut states = 0u64;
    let mut last_tick = 0u32;

    while Instant::now() < deadline {
        tokio::select! {
            _ = ticker.tick() => {
                let second = started.elapsed().as_secs();
                if let Some(packet) = script(second) {
                    send(&socket, &packet, server_addr).await?;
                }
                send(&socket, &Packet::Heartbeat, server_addr).await?;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(Packet::GameState { tick, players, .. }) => {
                        states += 1;
                        last_tick = tick;
                        if let Some(me) = players.get(&client_id) {
                            debug!(
                                "Tick {}: at ({:.1}, {:.1}) dead={} arrow={}",
                                tick, me.x, me.y, me.is_dead, me.arrow.is_some()
                            );
                        }
                    }
                    Ok(Packet::ReceiveMessage { username, message }) => {
                        info!("[chat] {}: {}", username, message);
                    }
                    Ok(Packet::NewPlayer { id, player }) => {
                        info!("Player {} joined as {}", id, player.username);
                    }
                    Ok(Packet::PlayerDisconnected { id }) => info!("Player {} left", id),
                    Ok(Packet::Disconnected { reason }) => {
                        warn!("Disconnected by server: {}", reason);
                        return Ok(());
                    }
                    Ok(other) => debug!("Received {:?}", other),
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    info!(
        "Test client finished: {} snapshots received, last tick {}",
        states, last_tick
    );

    Ok(())
}
