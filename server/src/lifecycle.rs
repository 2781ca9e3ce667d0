//! Spawning and the alive → dead → alive cycle of a player.

use log::{info, warn};
use rand::Rng;
use shared::{Color, Player, RESPAWN_DELAY_MS, WORLD_WIDTH};
use std::collections::BTreeMap;

/// Builds a fresh player: random x across the arena, dropped from the top,
/// random colour, default name and all motion and flags cleared.
pub fn spawn_player<R: Rng>(id: u32, rng: &mut R) -> Player {
    let x = rng.gen_range(0.0..WORLD_WIDTH);
    let color = Color::from_rgb24(rng.gen_range(0..0xFF_FFFF));
    Player::new(id, x, 0.0, color)
}

/// Marks a player dead and schedules the respawn. Any arrow in flight is lost.
pub fn kill(player: &mut Player, now: u64) {
    player.is_dead = true;
    player.respawn_at = now.saturating_add(RESPAWN_DELAY_MS);
    player.arrow = None;
    player.is_aiming = false;
    player.intent = Default::default();
}

/// True from the first tick at or after `respawn_at`. Firing exactly on the
/// deadline is not early, and a late tick never misses it.
pub fn is_respawn_due(player: &Player, now: u64) -> bool {
    player.is_dead && now >= player.respawn_at
}

/// Replaces every transient field with fresh spawn values, keeping the
/// connection id and username.
pub fn respawn<R: Rng>(player: &mut Player, rng: &mut R) {
    let username = std::mem::take(&mut player.username);
    *player = spawn_player(player.id, rng);
    player.username = username;
}

/// Respawns every player whose timer has elapsed and restores any player whose
/// state went non-finite. Returns the ids that were reset.
pub fn step<R: Rng>(players: &mut BTreeMap<u32, Player>, now: u64, rng: &mut R) -> Vec<u32> {
    let mut reset = Vec::new();

    for (id, player) in players.iter_mut() {
        if is_respawn_due(player, now) {
            respawn(player, rng);
            info!(
                "Player {} ({}) respawned at x={:.1}",
                id, player.username, player.x
            );
            reset.push(*id);
        } else if !player.is_dead && !player.is_finite() {
            warn!("Player {} had corrupted state, respawning in place", id);
            respawn(player, rng);
            reset.push(*id);
        }
    }

    reset
}
