use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type RoomCode = String;

/// Alphabet used for room codes. The full alphanumeric set, no
/// ambiguous-character exclusions (codes are typed from a projected screen,
/// not read aloud).
pub const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LENGTH: usize = 6;

/// How long a room survives without a single write.
pub const ROOM_TTL_SECONDS: u64 = 28_800;

/// Store key layout: `room:<CODE>`
pub fn room_key(code: &str) -> String {
    format!("room:{code}")
}

/// Current wall-clock time as an RFC 3339 string, the format every
/// timestamp in the room document uses.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    WouldYouRather,
    Paranoia,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::WouldYouRather => "would-you-rather",
            GameKind::Paranoia => "paranoia",
        }
    }
}

impl std::str::FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "would-you-rather" => Ok(GameKind::WouldYouRather),
            "paranoia" => Ok(GameKind::Paranoia),
            other => Err(format!("Unknown game '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_host: bool,
    pub joined_at: String,
    /// Cosmetic avatar reference, irrelevant to game logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_character_id: Option<String>,
}

impl Player {
    pub fn new(player_name: String, is_host: bool) -> Self {
        Self {
            player_id: ulid::Ulid::new().to_string(),
            player_name,
            is_host,
            joined_at: now_rfc3339(),
            selected_character_id: None,
        }
    }
}

/// The single document stored per room code. `game_state` is free-form
/// JSON whose shape is owned by the active game's controller; the service
/// only ever merges it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_code: RoomCode,
    pub name: String,
    pub host_id: PlayerId,
    pub current_game: GameKind,
    pub game_state: serde_json::Value,
    pub players: Vec<Player>,
    pub created_at: String,
    /// Monotonically increasing write counter, bumped by the service on
    /// every persist. Callers that pass it back on `update` get stale-write
    /// rejection instead of last-write-wins.
    #[serde(default)]
    pub revision: u64,
}

impl Room {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn has_player_named(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.player_name == name)
    }
}

/// Local identity a browser carries into a room. Passed explicitly into the
/// session instead of being read from ambient storage inside game logic.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerIdentity {
    pub player_id: PlayerId,
    pub player_name: String,
}
