//! Wire protocol and world model shared by the arena server and its clients.
//!
//! All tuning values are expressed per simulation tick and assume the fixed
//! [`TICK_RATE`]; nothing here is scaled by elapsed wall time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const TICK_RATE: u32 = 60;
pub const PROTOCOL_VERSION: u32 = 1;

pub const WORLD_WIDTH: f32 = 800.0;
pub const GROUND_Y: f32 = 600.0;

pub const GRAVITY: f32 = 0.05;
pub const ARROW_GRAVITY: f32 = 0.003;
pub const FRICTION: f32 = 0.85;
pub const MAX_SPEED: f32 = 5.5;
pub const ACCELERATION: f32 = 0.2;
pub const JUMP_IMPULSE: f32 = 3.0;
pub const AIM_STEP: f32 = 0.05;

pub const PLAYER_RADIUS: f32 = 15.0;
pub const ARROW_SPEED: f32 = 3.0;
pub const ARROW_WIDTH: f32 = 20.0;
pub const ARROW_HEIGHT: f32 = 5.0;

/// Minimum wall-clock gap between two shots of the same player.
pub const SHOT_COOLDOWN_MS: u64 = 2000;
/// Time a player stays dead before respawning.
pub const RESPAWN_DELAY_MS: u64 = 5000;

pub const DEFAULT_USERNAME: &str = "Guest";
pub const MAX_USERNAME_LEN: usize = 24;
pub const MAX_MESSAGE_LEN: usize = 256;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // client -> server
    Connect {
        client_version: u32,
    },
    SetUsername {
        name: Option<String>,
    },
    MovePlayer {
        intent: PlayerIntent,
    },
    ReleaseArrow,
    SendMessage {
        text: String,
    },
    Heartbeat,
    Disconnect,

    // server -> client
    Connected {
        client_id: u32,
    },
    Disconnected {
        reason: String,
    },
    CurrentPlayers {
        players: BTreeMap<u32, Player>,
    },
    NewPlayer {
        id: u32,
        player: Player,
    },
    GameState {
        tick: u32,
        timestamp: u64,
        players: BTreeMap<u32, Player>,
    },
    PlayerDisconnected {
        id: u32,
    },
    ReceiveMessage {
        username: String,
        message: String,
    },
}

impl Packet {
    /// Decodes one datagram.
    ///
    /// A `MovePlayer` whose intent byte is missing still decodes, with every
    /// flag cleared, so a damaged movement packet stops the player instead of
    /// leaving the previous intent held.
    pub fn decode(bytes: &[u8]) -> bincode::Result<Packet> {
        bincode::deserialize(bytes).or_else(|err| {
            let released = Packet::MovePlayer {
                intent: PlayerIntent::default(),
            };
            let tag = bincode::serialize(&released)?;
            if bytes.len() >= 4 && bytes[..4] == tag[..4] {
                Ok(released)
            } else {
                Err(err)
            }
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Builds a colour from the low 24 bits of `rgb` (0xRRGGBB).
    pub fn from_rgb24(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >> 8) & 0xFF) as u8,
            b: (rgb & 0xFF) as u8,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Held movement/aim state sent by a client every frame.
///
/// Travels as a single flag byte, so any byte decodes: unknown bits are
/// ignored and absent flags read as `false`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "u8", into = "u8")]
pub struct PlayerIntent {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub aiming: bool,
    pub rotate_left: bool,
    pub rotate_right: bool,
}

impl PlayerIntent {
    const LEFT: u8 = 1 << 0;
    const RIGHT: u8 = 1 << 1;
    const JUMP: u8 = 1 << 2;
    const AIMING: u8 = 1 << 3;
    const ROTATE_LEFT: u8 = 1 << 4;
    const ROTATE_RIGHT: u8 = 1 << 5;
}

impl From<u8> for PlayerIntent {
    fn from(bits: u8) -> Self {
        Self {
            left: bits & Self::LEFT != 0,
            right: bits & Self::RIGHT != 0,
            jump: bits & Self::JUMP != 0,
            aiming: bits & Self::AIMING != 0,
            rotate_left: bits & Self::ROTATE_LEFT != 0,
            rotate_right: bits & Self::ROTATE_RIGHT != 0,
        }
    }
}

impl From<PlayerIntent> for u8 {
    fn from(intent: PlayerIntent) -> Self {
        let flag = |set: bool, bit: u8| if set { bit } else { 0 };
        flag(intent.left, PlayerIntent::LEFT)
            | flag(intent.right, PlayerIntent::RIGHT)
            | flag(intent.jump, PlayerIntent::JUMP)
            | flag(intent.aiming, PlayerIntent::AIMING)
            | flag(intent.rotate_left, PlayerIntent::ROTATE_LEFT)
            | flag(intent.rotate_right, PlayerIntent::ROTATE_RIGHT)
    }
}

/// A single in-flight arrow, owned by the player that shot it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Arrow {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
}

impl Arrow {
    /// Creates an arrow at `(x, y)` travelling along `angle` at [`ARROW_SPEED`].
    pub fn launch(x: f32, y: f32, angle: f32, color: Color) -> Self {
        Self {
            x,
            y,
            vel_x: angle.cos() * ARROW_SPEED,
            vel_y: angle.sin() * ARROW_SPEED,
            width: ARROW_WIDTH,
            height: ARROW_HEIGHT,
            color,
        }
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// True once the arrow touches or crosses any edge of the arena.
    pub fn is_out_of_bounds(&self) -> bool {
        self.x <= 0.0
            || self.x + self.width >= WORLD_WIDTH
            || self.y <= 0.0
            || self.y + self.height >= GROUND_Y
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.vel_x.is_finite() && self.vel_y.is_finite()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
    pub on_ground: bool,
    pub color: Color,
    pub username: String,
    pub is_aiming: bool,
    /// Radians, accumulated without normalisation.
    pub aim_angle: f32,
    pub is_dead: bool,
    /// Epoch milliseconds; meaningful only while `is_dead`.
    pub respawn_at: u64,
    /// Epoch milliseconds of the last shot, 0 before the first one.
    pub last_shot_at: u64,
    pub arrow: Option<Arrow>,
    /// Latest held intent. Never serialized, so clients never see it.
    #[serde(skip)]
    pub intent: PlayerIntent,
}

impl Player {
    /// A freshly spawned, motionless player with default name and cleared flags.
    pub fn new(id: u32, x: f32, y: f32, color: Color) -> Self {
        Self {
            id,
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            radius: PLAYER_RADIUS,
            on_ground: false,
            color,
            username: DEFAULT_USERNAME.to_string(),
            is_aiming: false,
            aim_angle: 0.0,
            is_dead: false,
            respawn_at: 0,
            last_shot_at: 0,
            arrow: None,
            intent: PlayerIntent::default(),
        }
    }

    /// Square hit region of side `2 * radius` centred on the player.
    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.x - self.radius,
            self.y - self.radius,
            self.x + self.radius,
            self.y + self.radius,
        )
    }

    /// False when any kinematic value has gone NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.vel_x.is_finite()
            && self.vel_y.is_finite()
            && self.aim_angle.is_finite()
            && self.arrow.as_ref().map_or(true, Arrow::is_finite)
    }
}

/// Normalises a requested username: trimmed, capped in length, "Guest" when empty.
pub fn sanitize_username(name: Option<&str>) -> String {
    let trimmed = name.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return DEFAULT_USERNAME.to_string();
    }
    trimmed.chars().take(MAX_USERNAME_LEN).collect()
}

/// Strict overlap between an arrow's rectangle and a player's square hit region.
pub fn arrow_hits_player(arrow: &Arrow, player: &Player) -> bool {
    let (ax1, ay1, ax2, ay2) = arrow.get_bounds();
    let (px1, py1, px2, py2) = player.get_bounds();

    ax1 < px2 && ax2 > px1 && ay1 < py2 && ay2 > py1
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn red() -> Color {
        Color::new(255, 0, 0)
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new(1, 100.0, 0.0, red());
        assert_eq!(player.id, 1);
        assert_eq!(player.x, 100.0);
        assert_eq!(player.y, 0.0);
        assert_eq!(player.vel_x, 0.0);
        assert_eq!(player.vel_y, 0.0);
        assert_eq!(player.radius, PLAYER_RADIUS);
        assert_eq!(player.username, "Guest");
        assert_eq!(player.last_shot_at, 0);
        assert!(!player.on_ground);
        assert!(!player.is_dead);
        assert!(!player.is_aiming);
        assert!(player.arrow.is_none());
    }

    #[test]
    fn test_player_bounds() {
        let player = Player::new(1, 100.0, 200.0, red());
        let (x1, y1, x2, y2) = player.get_bounds();
        assert_eq!(x1, 85.0);
        assert_eq!(y1, 185.0);
        assert_eq!(x2, 115.0);
        assert_eq!(y2, 215.0);
    }

    #[test]
    fn test_color_from_rgb24() {
        let color = Color::from_rgb24(0x12ab34);
        assert_eq!(color, Color::new(0x12, 0xab, 0x34));
        assert_eq!(color.to_hex(), "#12ab34");
        assert_eq!(Color::from_rgb24(0).to_string(), "#000000");
    }

    #[test]
    fn test_arrow_launch_velocity() {
        let arrow = Arrow::launch(100.0, 585.0, 0.0, red());
        assert_approx_eq!(arrow.vel_x, ARROW_SPEED, 1e-6);
        assert_approx_eq!(arrow.vel_y, 0.0, 1e-6);
        assert_eq!(arrow.width, 20.0);
        assert_eq!(arrow.height, 5.0);
        assert_eq!(arrow.color, red());

        let down = Arrow::launch(0.0, 0.0, std::f32::consts::FRAC_PI_2, red());
        assert_approx_eq!(down.vel_x, 0.0, 1e-6);
        assert_approx_eq!(down.vel_y, ARROW_SPEED, 1e-6);
    }

    #[test]
    fn test_arrow_bounds_exit() {
        let inside = Arrow::launch(400.0, 300.0, 0.0, red());
        assert!(!inside.is_out_of_bounds());

        let mut right = inside;
        right.x = WORLD_WIDTH - ARROW_WIDTH;
        assert!(right.is_out_of_bounds());

        let mut left = inside;
        left.x = 0.0;
        assert!(left.is_out_of_bounds());

        let mut top = inside;
        top.y = -1.0;
        assert!(top.is_out_of_bounds());

        let mut floor = inside;
        floor.y = GROUND_Y - ARROW_HEIGHT;
        assert!(floor.is_out_of_bounds());
    }

    #[test]
    fn test_arrow_hits_player_overlap() {
        let target = Player::new(2, 200.0, 300.0, red());
        let arrow = Arrow::launch(190.0, 298.0, 0.0, red());
        assert!(arrow_hits_player(&arrow, &target));
    }

    #[test]
    fn test_arrow_hits_player_square_corner() {
        // Inside the square but outside the circle: still a hit.
        let target = Player::new(2, 200.0, 300.0, red());
        let arrow = Arrow::launch(213.0, 286.0, 0.0, red());
        assert!(arrow_hits_player(&arrow, &target));
    }

    #[test]
    fn test_arrow_hits_player_exact_touch() {
        let target = Player::new(2, 200.0, 300.0, red());
        let arrow = Arrow::launch(215.0, 300.0, 0.0, red());
        assert!(!arrow_hits_player(&arrow, &target));

        let above = Arrow::launch(200.0, 280.0, 0.0, red());
        assert!(!arrow_hits_player(&above, &target));
    }

    #[test]
    fn test_sanitize_username() {
        assert_eq!(sanitize_username(None), "Guest");
        assert_eq!(sanitize_username(Some("")), "Guest");
        assert_eq!(sanitize_username(Some("   ")), "Guest");
        assert_eq!(sanitize_username(Some("  robin ")), "robin");
        let long = "x".repeat(100);
        assert_eq!(sanitize_username(Some(&long)).len(), MAX_USERNAME_LEN);
    }

    #[test]
    fn test_player_finite_check() {
        let mut player = Player::new(1, 100.0, 200.0, red());
        assert!(player.is_finite());
        player.vel_y = f32::NAN;
        assert!(!player.is_finite());

        let mut with_arrow = Player::new(2, 100.0, 200.0, red());
        let mut arrow = Arrow::launch(0.0, 0.0, 0.0, red());
        arrow.x = f32::INFINITY;
        with_arrow.arrow = Some(arrow);
        assert!(!with_arrow.is_finite());
    }

    #[test]
    fn test_unbounded_aim_angle_survives_encoding() {
        let mut player = Player::new(7, 10.0, 20.0, red());
        player.aim_angle = 1.0e6;
        player.intent.left = true;

        let bytes = bincode::serialize(&player).unwrap();
        let decoded: Player = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.aim_angle, 1.0e6);
        // Intent is server-local and never crosses the wire.
        assert_eq!(decoded.intent, PlayerIntent::default());
    }

    #[test]
    fn test_packet_serialization_game_state() {
        let mut players = BTreeMap::new();
        players.insert(1, Player::new(1, 100.0, 200.0, red()));
        let mut dead = Player::new(2, 300.0, 400.0, red());
        dead.is_dead = true;
        dead.respawn_at = 5_000;
        players.insert(2, dead);

        let packet = Packet::GameState {
            tick: 42,
            timestamp: 123456789,
            players,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::GameState {
                tick,
                timestamp,
                players,
            } => {
                assert_eq!(tick, 42);
                assert_eq!(timestamp, 123456789);
                assert_eq!(players.len(), 2);
                assert!(players[&2].is_dead);
                assert!(players[&2].arrow.is_none());
                assert_eq!(players.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_intent_flag_byte() {
        let intent = PlayerIntent {
            left: true,
            jump: true,
            rotate_right: true,
            ..PlayerIntent::default()
        };
        let bits = u8::from(intent);
        assert_eq!(bits, 0b10_0101);
        assert_eq!(PlayerIntent::from(bits), intent);

        // High bits carry nothing.
        assert_eq!(PlayerIntent::from(0b1100_0000), PlayerIntent::default());
        assert_eq!(bincode::serialize(&intent).unwrap(), vec![bits]);
    }

    #[test]
    fn test_any_intent_byte_decodes() {
        let mut bytes = bincode::serialize(&Packet::MovePlayer {
            intent: PlayerIntent {
                left: true,
                ..PlayerIntent::default()
            },
        })
        .unwrap();
        let last = bytes.len() - 1;

        bytes[last] = 7;
        match Packet::decode(&bytes).unwrap() {
            Packet::MovePlayer { intent } => {
                assert!(intent.left && intent.right && intent.jump);
                assert!(!intent.aiming);
            }
            other => panic!("Expected MovePlayer, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_move_player_clears_intent() {
        let mut bytes = bincode::serialize(&Packet::MovePlayer {
            intent: PlayerIntent {
                right: true,
                ..PlayerIntent::default()
            },
        })
        .unwrap();
        bytes.pop();

        assert!(bincode::deserialize::<Packet>(&bytes).is_err());
        assert_eq!(
            Packet::decode(&bytes).unwrap(),
            Packet::MovePlayer {
                intent: PlayerIntent::default()
            }
        );
    }

    #[test]
    fn test_decode_rejects_other_garbage() {
        assert!(Packet::decode(&[]).is_err());
        assert!(Packet::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).is_err());

        // A truncated chat message is not mistaken for movement.
        let mut chat = bincode::serialize(&Packet::SendMessage {
            text: "hello".to_string(),
        })
        .unwrap();
        chat.truncate(chat.len() - 2);
        assert!(Packet::decode(&chat).is_err());
    }

    #[test]
    fn test_packet_serialization_move_player() {
        let packet = Packet::MovePlayer {
            intent: PlayerIntent {
                aiming: true,
                rotate_right: true,
                ..PlayerIntent::default()
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::MovePlayer { intent } => {
                assert!(intent.aiming);
                assert!(intent.rotate_right);
                assert!(!intent.left);
                assert!(!intent.jump);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
