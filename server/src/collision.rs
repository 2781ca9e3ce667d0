//! Arrow hits, arena exits and the rate-limited shooting action.

use crate::lifecycle;
use log::{debug, info};
use shared::{arrow_hits_player, Arrow, Player, SHOT_COOLDOWN_MS};
use std::collections::BTreeMap;

/// Result of a shoot request. Everything except `Fired` is a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Fired,
    CoolingDown,
    Dead,
    UnknownPlayer,
}

/// A kill produced by one arrow this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub shooter: u32,
    pub target: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollisionReport {
    pub hits: Vec<Hit>,
    /// Shooters whose arrow left the arena.
    pub expired: Vec<u32>,
}

/// Fires an arrow from the player's position along its aim angle.
///
/// Replaces any arrow still in flight. Inside the cooldown window nothing
/// changes, including `last_shot_at`.
pub fn try_fire(player: &mut Player, now: u64) -> ShotOutcome {
    if player.is_dead {
        return ShotOutcome::Dead;
    }
    // A clock that went backwards reads as still cooling down.
    if now.saturating_sub(player.last_shot_at) < SHOT_COOLDOWN_MS {
        return ShotOutcome::CoolingDown;
    }

    player.arrow = Some(Arrow::launch(
        player.x,
        player.y,
        player.aim_angle,
        player.color,
    ));
    player.is_aiming = false;
    player.last_shot_at = now;

    debug!(
        "Player {} fired at angle {:.2} from ({:.1}, {:.1})",
        player.id, player.aim_angle, player.x, player.y
    );
    ShotOutcome::Fired
}

/// First living, non-shooter player in id order whose hit square the arrow overlaps.
fn first_target(players: &BTreeMap<u32, Player>, shooter: u32, arrow: &Arrow) -> Option<u32> {
    players
        .iter()
        .find(|(id, target)| {
            **id != shooter
                && !target.is_dead
                && target.is_finite()
                && arrow_hits_player(arrow, target)
        })
        .map(|(id, _)| *id)
}

/// Resolves every in-flight arrow against the other players and the arena.
///
/// Shooters are visited in ascending id order. Each arrow kills at most one
/// target per tick, the first in id order; a victim's own arrow is discarded
/// immediately and so never resolves later in the same pass. Arrows that hit
/// nobody are discarded once they touch an arena edge.
pub fn resolve(players: &mut BTreeMap<u32, Player>, now: u64) -> CollisionReport {
    let mut report = CollisionReport::default();
    let shooter_ids: Vec<u32> = players.keys().copied().collect();

    for shooter_id in shooter_ids {
        let arrow = match players.get(&shooter_id) {
            Some(shooter) if !shooter.is_dead && shooter.is_finite() => match shooter.arrow {
                Some(arrow) => arrow,
                None => continue,
            },
            _ => continue,
        };

        if let Some(target_id) = first_target(players, shooter_id, &arrow) {
            if let Some(target) = players.get_mut(&target_id) {
                lifecycle::kill(target, now);
            }
            if let Some(shooter) = players.get_mut(&shooter_id) {
                shooter.arrow = None;
            }
            info!("Player {} was hit by player {}", target_id, shooter_id);
            report.hits.push(Hit {
                shooter: shooter_id,
                target: target_id,
            });
            continue;
        }

        if arrow.is_out_of_bounds() {
            if let Some(shooter) = players.get_mut(&shooter_id) {
                shooter.arrow = None;
            }
            report.expired.push(shooter_id);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Color, GROUND_Y, PLAYER_RADIUS, RESPAWN_DELAY_MS};

    const NOW: u64 = 100_000;

    fn player_at(id: u32, x: f32, y: f32) -> Player {
        Player::new(id, x, y, Color::from_rgb24(id * 1000))
    }

    fn arrow_at(x: f32, y: f32) -> Arrow {
        Arrow::launch(x, y, 0.0, Color::default())
    }

    #[test]
    fn test_fire_spawns_arrow_from_shooter() {
        let mut shooter = player_at(1, 100.0, GROUND_Y - PLAYER_RADIUS);
        shooter.is_aiming = true;

        assert_eq!(try_fire(&mut shooter, NOW), ShotOutcome::Fired);

        let arrow = shooter.arrow.expect("arrow should be in flight");
        assert_eq!((arrow.x, arrow.y), (100.0, 585.0));
        assert_eq!((arrow.vel_x, arrow.vel_y), (3.0, 0.0));
        assert_eq!(arrow.color, shooter.color);
        assert!(!shooter.is_aiming);
        assert_eq!(shooter.last_shot_at, NOW);
    }

    #[test]
    fn test_fire_is_rate_limited() {
        let mut shooter = player_at(1, 100.0, 300.0);
        assert_eq!(try_fire(&mut shooter, NOW), ShotOutcome::Fired);
        let first_arrow = shooter.arrow;

        shooter.aim_angle = 1.0;
        assert_eq!(
            try_fire(&mut shooter, NOW + SHOT_COOLDOWN_MS - 1),
            ShotOutcome::CoolingDown
        );
        assert_eq!(shooter.last_shot_at, NOW);
        assert_eq!(shooter.arrow, first_arrow);

        assert_eq!(
            try_fire(&mut shooter, NOW + SHOT_COOLDOWN_MS),
            ShotOutcome::Fired
        );
        assert_eq!(shooter.last_shot_at, NOW + SHOT_COOLDOWN_MS);
    }

    #[test]
    fn test_fire_with_clock_behind_last_shot() {
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.last_shot_at = NOW;
        assert_eq!(try_fire(&mut shooter, NOW - 10_000), ShotOutcome::CoolingDown);
        assert_eq!(shooter.last_shot_at, NOW);
    }

    #[test]
    fn test_dead_player_cannot_fire() {
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.is_dead = true;
        assert_eq!(try_fire(&mut shooter, NOW), ShotOutcome::Dead);
        assert!(shooter.arrow.is_none());
    }

    #[test]
    fn test_hit_kills_target_and_consumes_arrow() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(190.0, 298.0));
        players.insert(1, shooter);
        players.insert(2, player_at(2, 200.0, 300.0));

        let report = resolve(&mut players, NOW);

        assert_eq!(
            report.hits,
            vec![Hit {
                shooter: 1,
                target: 2
            }]
        );
        assert!(players[&2].is_dead);
        assert_eq!(players[&2].respawn_at, NOW + RESPAWN_DELAY_MS);
        assert!(players[&1].arrow.is_none());
    }

    #[test]
    fn test_shooter_is_never_its_own_target() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(100.0, 300.0));
        players.insert(1, shooter);

        let report = resolve(&mut players, NOW);

        assert!(report.hits.is_empty());
        assert!(!players[&1].is_dead);
        assert!(players[&1].arrow.is_some());
    }

    #[test]
    fn test_first_target_in_id_order_wins() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(5, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(395.0, 298.0));
        players.insert(5, shooter);
        // Both stacked on the arrow; only the lower id dies.
        players.insert(9, player_at(9, 400.0, 300.0));
        players.insert(3, player_at(3, 405.0, 300.0));

        let report = resolve(&mut players, NOW);

        assert_eq!(report.hits.len(), 1);
        assert_eq!(report.hits[0].target, 3);
        assert!(players[&3].is_dead);
        assert!(!players[&9].is_dead);
    }

    #[test]
    fn test_dead_players_are_not_targets() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(395.0, 298.0));
        players.insert(1, shooter);
        let mut corpse = player_at(2, 400.0, 300.0);
        corpse.is_dead = true;
        corpse.respawn_at = NOW + 1;
        players.insert(2, corpse);

        let report = resolve(&mut players, NOW);

        assert!(report.hits.is_empty());
        assert_eq!(players[&2].respawn_at, NOW + 1);
        assert!(players[&1].arrow.is_some());
    }

    #[test]
    fn test_victim_arrow_is_discarded_before_its_turn() {
        let mut players = BTreeMap::new();
        let mut first = player_at(1, 100.0, 300.0);
        first.arrow = Some(arrow_at(495.0, 298.0));
        players.insert(1, first);

        let mut second = player_at(2, 500.0, 300.0);
        second.arrow = Some(arrow_at(95.0, 298.0));
        players.insert(2, second);

        let report = resolve(&mut players, NOW);

        assert_eq!(
            report.hits,
            vec![Hit {
                shooter: 1,
                target: 2
            }]
        );
        assert!(!players[&1].is_dead);
        assert!(players[&2].arrow.is_none());
    }

    #[test]
    fn test_arrow_leaving_arena_is_discarded() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(780.0, 300.0));
        players.insert(1, shooter);

        let report = resolve(&mut players, NOW);

        assert_eq!(report.expired, vec![1]);
        assert!(players[&1].arrow.is_none());
    }

    #[test]
    fn test_hit_takes_priority_over_bounds() {
        let mut players = BTreeMap::new();
        let mut shooter = player_at(1, 100.0, 300.0);
        shooter.arrow = Some(arrow_at(780.0, 300.0));
        players.insert(1, shooter);
        players.insert(2, player_at(2, 785.0, 300.0));

        let report = resolve(&mut players, NOW);

        assert_eq!(report.hits.len(), 1);
        assert!(report.expired.is_empty());
    }
}
