//! The Room Access Service: the only reader/writer of the room store.
//!
//! All operations are read-modify-write with no locking. Two concurrent
//! updates on the same room race and the later write wins; callers that
//! care can pass the revision they read to turn a silent clobber into an
//! explicit stale-write rejection.

use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RoomError;
use crate::merge::{merge, MergeStrategy};
use crate::store::RoomStore;
use crate::types::*;

/// Bounded retry count for room-code generation. Collisions are
/// astronomically unlikely (36^6 codes) but exhaustion must surface as an
/// error, not a hang.
const CODE_GENERATION_ATTEMPTS: usize = 10;

fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_CHARS[rng.random_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}

/// The `gameState` every room starts with, regardless of game type. Game
/// controllers replace it on their first transition.
pub fn initial_lobby_state() -> Value {
    serde_json::json!({
        "phase": "lobby",
        "votes": {},
        "currentQuestion": null,
    })
}

/// Options for [`RoomService::update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub strategy: MergeStrategy,
    /// When set, the update is rejected with [`RoomError::StaleWrite`] if
    /// the stored revision differs. When absent, last write wins.
    pub expected_revision: Option<u64>,
}

#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    ttl: Duration,
}

impl RoomService {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(ROOM_TTL_SECONDS))
    }

    pub fn with_ttl(store: Arc<dyn RoomStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a room, returning the full document including the generated
    /// host player id. The caller must remember that id as "this browser is
    /// the host".
    pub async fn create(&self, player_name: &str, selected_game: &str) -> Result<Room, RoomError> {
        let player_name = non_empty(player_name, "playerName")?;
        let selected_game = non_empty(selected_game, "selectedGame")?;
        let current_game: GameKind = selected_game
            .parse()
            .map_err(RoomError::Validation)?;

        let room_code = self.allocate_code().await?;

        let host = Player::new(player_name.to_string(), true);
        let room = Room {
            room_code: room_code.clone(),
            name: format!("{player_name}'s room"),
            host_id: host.player_id.clone(),
            current_game,
            game_state: initial_lobby_state(),
            players: vec![host],
            created_at: now_rfc3339(),
            revision: 0,
        };

        let room = self.persist(room).await?;

        // Do not report success on an unverifiable write. Read the entry
        // back and confirm it parses; a half-written blob gets deleted so
        // the code can be reused.
        match self.store.get(&room_key(&room.room_code)).await? {
            Some(doc) if serde_json::from_str::<Room>(&doc).is_ok() => {
                tracing::info!("Created room {} for host {}", room.room_code, room.host_id);
                Ok(room)
            }
            _ => {
                self.store.delete(&room_key(&room.room_code)).await?;
                Err(RoomError::PersistenceFailed)
            }
        }
    }

    /// Join an existing room. Never mutates the store on failure.
    pub async fn join(
        &self,
        room_code: &str,
        player_name: &str,
    ) -> Result<(Room, PlayerId), RoomError> {
        let player_name = non_empty(player_name, "playerName")?;
        let mut room = self.read_room(room_code).await?;

        if room.has_player_named(player_name) {
            return Err(RoomError::NameTaken);
        }

        let player = Player::new(player_name.to_string(), false);
        let player_id = player.player_id.clone();
        room.players.push(player);

        let room = self.persist(room).await?;
        tracing::info!("Player {} ({}) joined room {}", player_name, player_id, room_code);
        Ok((room, player_id))
    }

    /// Remove a player. Host-only; re-checked here no matter what the UI
    /// hid. Kicking an already-absent player is `PlayerNotFound`, so a
    /// retried kick fails cleanly instead of crashing.
    pub async fn kick(
        &self,
        room_code: &str,
        target_player_id: &str,
        host_id: &str,
    ) -> Result<Room, RoomError> {
        let mut room = self.read_room(room_code).await?;

        if host_id != room.host_id {
            return Err(RoomError::NotAuthorized);
        }
        if room.player(target_player_id).is_none() {
            return Err(RoomError::PlayerNotFound);
        }
        if target_player_id == room.host_id {
            // Host reassignment is an unresolved product decision; until it
            // exists, a room must keep its host.
            return Err(RoomError::Validation(
                "The host cannot be kicked".to_string(),
            ));
        }

        room.players.retain(|p| p.player_id != target_player_id);
        let room = self.persist(room).await?;
        tracing::info!("Kicked player {} from room {}", target_player_id, room_code);
        Ok(room)
    }

    /// Merge `updates` onto the stored document and persist with a fresh
    /// TTL. Shallow by default: top-level keys in `updates` replace the
    /// stored keys wholesale.
    pub async fn update(
        &self,
        room_code: &str,
        updates: serde_json::Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Room, RoomError> {
        if updates.contains_key("roomCode") {
            return Err(RoomError::Validation(
                "roomCode is immutable".to_string(),
            ));
        }

        let room = self.read_room(room_code).await?;

        if let Some(expected) = options.expected_revision {
            if expected != room.revision {
                return Err(RoomError::StaleWrite {
                    expected,
                    found: room.revision,
                });
            }
        }

        let revision = room.revision;
        let mut document = serde_json::to_value(&room)
            .map_err(|_| RoomError::PersistenceFailed)?;
        merge(&mut document, Value::Object(updates), options.strategy);

        let mut merged: Room = serde_json::from_value(document)
            .map_err(|_| RoomError::Validation("Updates produced an invalid room document".to_string()))?;
        merged.revision = revision;

        self.persist(merged).await
    }

    pub async fn get(&self, room_code: &str) -> Result<Room, RoomError> {
        self.read_room(room_code).await
    }

    async fn allocate_code(&self) -> Result<RoomCode, RoomError> {
        for _ in 0..CODE_GENERATION_ATTEMPTS {
            let code = generate_room_code();
            if !self.store.exists(&room_key(&code)).await? {
                return Ok(code);
            }
        }
        Err(RoomError::RoomCodeExhausted)
    }

    /// Load and parse a room document. A blob that fails to parse is
    /// deleted on the spot so a fresh room can reuse the code.
    async fn read_room(&self, room_code: &str) -> Result<Room, RoomError> {
        let key = room_key(room_code);
        let document = self
            .store
            .get(&key)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        match serde_json::from_str::<Room>(&document) {
            Ok(room) => Ok(room),
            Err(e) => {
                tracing::warn!("Deleting corrupted room {}: {}", room_code, e);
                self.store.delete(&key).await?;
                Err(RoomError::RoomCorrupted)
            }
        }
    }

    async fn persist(&self, mut room: Room) -> Result<Room, RoomError> {
        room.revision += 1;
        let document =
            serde_json::to_string(&room).map_err(|_| RoomError::PersistenceFailed)?;
        self.store
            .set(&room_key(&room.room_code), &document, self.ttl)
            .await?;
        Ok(room)
    }
}

fn non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, RoomError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RoomError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}
