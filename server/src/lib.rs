//! # Arena Server Library
//!
//! This library provides the authoritative server for a side-view arena shooter.
//! Players run, jump, aim and fire arrows; the server owns physics, hit detection
//! and life/death state, and broadcasts the canonical world to every client at
//! the tick rate.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every tick advances the world by one fixed step. Clients never move their own
//! players: they send held intents and render whatever the server broadcasts.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment, capacity limits and id assignment
//! - Buffering of the latest intent and pending shots per connection
//! - Timeout detection and cleanup of silent clients
//!
//! ### State Broadcasting
//! A full snapshot of all players, dead ones included, is sent to every
//! connection after each tick. Joins and leaves are pushed immediately.
//!
//! ## Tick Pipeline
//!
//! One tick runs these stages in order, all on the task that owns the world:
//!
//! 1. apply buffered intents and shots ([`game::GameState::step`])
//! 2. integrate players and arrows ([`physics`])
//! 3. resolve arrow hits and arena exits ([`collision`])
//! 4. run the dead/respawn state machine ([`lifecycle`])
//! 5. broadcast the snapshot ([`network`])
//!
//! ## Concurrency Model
//!
//! The network receiver, sender and timeout checker run as separate tasks, but
//! only the main server loop mutates [`game::GameState`]. Joins, leaves and
//! username changes are handled between ticks on that loop, so the player
//! collection is never modified while a tick iterates over it.
//!
//! ## Scaling
//!
//! Hit detection is an O(n²) scan over shooters and targets. That is fine for a
//! few dozen players; beyond that the arena needs spatial partitioning.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_micros(16_667), // 60Hz
//!         32,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collision;
pub mod game;
pub mod lifecycle;
pub mod network;
pub mod physics;
pub mod utils;

/// Error type for fallible server I/O.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
