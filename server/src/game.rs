use crate::client_manager::BufferedInput;
use crate::collision::{self, Hit, ShotOutcome};
use crate::{lifecycle, physics};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{sanitize_username, Player, PlayerIntent};
use std::collections::BTreeMap;

/// What happened during one tick, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub shots: Vec<u32>,
    pub hits: Vec<Hit>,
    pub expired_arrows: Vec<u32>,
    pub respawned: Vec<u32>,
}

/// The authoritative world: every connected player keyed by connection id.
///
/// Ordered by id so that hit resolution is deterministic.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    pub players: BTreeMap<u32, Player>,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// A world whose spawn positions and colours are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            rng,
        }
    }

    /// Creates the player for a new connection and returns a copy of it.
    pub fn add_player(&mut self, client_id: u32) -> Player {
        let player = lifecycle::spawn_player(client_id, &mut self.rng);

        info!(
            "Added player {} at x={:.1} with color {}",
            client_id, player.x, player.color
        );
        self.players.insert(client_id, player.clone());
        player
    }

    pub fn remove_player(&mut self, client_id: &u32) -> bool {
        let removed = self.players.remove(client_id).is_some();
        if removed {
            info!("Removed player {}", client_id);
        }
        removed
    }

    /// Sets a username, falling back to "Guest". Unknown ids are ignored.
    pub fn set_username(&mut self, client_id: u32, name: Option<&str>) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.username = sanitize_username(name);
                info!("Player {} is now known as {}", client_id, player.username);
                true
            }
            None => false,
        }
    }

    pub fn username(&self, client_id: u32) -> Option<&str> {
        self.players.get(&client_id).map(|p| p.username.as_str())
    }

    /// Stores the held intent for the next physics step.
    ///
    /// Ignored for unknown or dead players.
    pub fn apply_input(&mut self, client_id: u32, intent: PlayerIntent) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) if !player.is_dead => {
                player.intent = intent;
                true
            }
            _ => false,
        }
    }

    pub fn release_arrow(&mut self, client_id: u32, now: u64) -> ShotOutcome {
        match self.players.get_mut(&client_id) {
            Some(player) => collision::try_fire(player, now),
            None => ShotOutcome::UnknownPlayer,
        }
    }

    /// Runs one fixed step: buffered input, physics, collisions, lifecycle.
    ///
    /// `now` is wall-clock milliseconds and only drives cooldowns and respawn
    /// timers; motion always advances by exactly one tick.
    pub fn step(&mut self, inputs: Vec<(u32, BufferedInput)>, now: u64) -> TickReport {
        let mut report = TickReport::default();

        for (client_id, input) in inputs {
            if let Some(intent) = input.intent {
                self.apply_input(client_id, intent);
            }
            if input.release && self.release_arrow(client_id, now) == ShotOutcome::Fired {
                report.shots.push(client_id);
            }
        }

        physics::step(&mut self.players);

        let collisions = collision::resolve(&mut self.players, now);
        report.hits = collisions.hits;
        report.expired_arrows = collisions.expired;

        report.respawned = lifecycle::step(&mut self.players, now, &mut self.rng);

        self.tick = self.tick.wrapping_add(1);
        report
    }

    /// Full copy of the player collection for broadcasting.
    pub fn snapshot(&self) -> BTreeMap<u32, Player> {
        self.players.clone()
    }

    pub fn live_arrows(&self) -> usize {
        self.players.values().filter(|p| p.arrow.is_some()).count()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
