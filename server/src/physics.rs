//! Fixed-step integration of players and their arrows.
//!
//! Every function here advances state by exactly one tick. Constants come from
//! `shared` and are tuned for [`shared::TICK_RATE`].

use log::warn;
use shared::{
    Arrow, Player, PlayerIntent, ACCELERATION, AIM_STEP, ARROW_GRAVITY, FRICTION, GRAVITY,
    GROUND_Y, JUMP_IMPULSE, MAX_SPEED, WORLD_WIDTH,
};
use std::collections::BTreeMap;

/// Applies the held intent to a player's horizontal motion, aim and jump.
///
/// While aiming, horizontal velocity is left untouched (no acceleration and no
/// friction) and the left/right rotate flags turn the aim instead.
pub fn steer(player: &mut Player, intent: &PlayerIntent) {
    if intent.aiming {
        player.is_aiming = true;
        if intent.rotate_left {
            player.aim_angle -= AIM_STEP;
        }
        if intent.rotate_right {
            player.aim_angle += AIM_STEP;
        }
    } else {
        player.is_aiming = false;
        if intent.left {
            player.vel_x -= ACCELERATION;
        }
        if intent.right {
            player.vel_x += ACCELERATION;
        }
        player.vel_x = player.vel_x.clamp(-MAX_SPEED, MAX_SPEED);
        player.vel_x *= FRICTION;
    }

    // No double jump and no air control over vertical speed.
    if intent.jump && player.on_ground {
        player.vel_y = -JUMP_IMPULSE;
        player.on_ground = false;
    }
}

/// Gravity, position integration and the ground/wall clamps for one player.
pub fn integrate_player(player: &mut Player) {
    player.vel_y += GRAVITY;
    player.y += player.vel_y;
    player.x += player.vel_x;

    if player.y + player.radius >= GROUND_Y {
        player.y = GROUND_Y - player.radius;
        player.vel_y = 0.0;
        player.on_ground = true;
    } else {
        player.on_ground = false;
    }

    // Walls clip position only; velocity is kept.
    player.x = player.x.clamp(player.radius, WORLD_WIDTH - player.radius);
}

pub fn integrate_arrow(arrow: &mut Arrow) {
    arrow.vel_y += ARROW_GRAVITY;
    arrow.x += arrow.vel_x;
    arrow.y += arrow.vel_y;
}

/// Advances one living player, and its arrow if one is in flight.
pub fn step_player(player: &mut Player) {
    let intent = player.intent;
    steer(player, &intent);
    integrate_player(player);

    if let Some(arrow) = player.arrow.as_mut() {
        integrate_arrow(arrow);
    }
}

/// Runs one physics tick over every living player.
///
/// Dead players are frozen. Players whose state is no longer finite are
/// skipped so they cannot poison the rest of the tick; the lifecycle stage
/// restores them.
pub fn step(players: &mut BTreeMap<u32, Player>) {
    for (id, player) in players.iter_mut() {
        if player.is_dead {
            continue;
        }
        if !player.is_finite() {
            warn!("Skipping physics for player {} with corrupted state", id);
            continue;
        }
        step_player(player);
    }
}
