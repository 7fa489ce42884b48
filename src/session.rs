//! Client Room Session: the browser-side view of a room.
//!
//! Wraps a rooms API (in-process service or HTTP) behind a cached
//! `{room, players, current_player}` view plus an `update_room` mutator.
//! The only way one client observes another's writes is the fixed-interval
//! polling loop; there is no push channel on this path.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::merge::{shallow_merge, MergeStrategy};
use crate::service::{RoomService, UpdateOptions};
use crate::types::{Player, PlayerIdentity, Room, RoomCode};

/// How often every session re-fetches the room, unconditionally.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Identity was never established; the session refuses to start rather
    /// than silently minting one.
    #[error("Not a proper member of this room")]
    MissingIdentity,

    /// The room exists but our player id is not in it (kicked, or the room
    /// was recreated under the same code).
    #[error("You are no longer part of this room")]
    RemovedFromRoom,

    /// The service rejected the request.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The request never reached the service.
    #[error("Request failed: {0}")]
    Transport(String),
}

/// What a session needs from the Room Access Service. Implemented by the
/// in-process service and by the HTTP client; game controllers and tests
/// do not care which.
#[async_trait]
pub trait RoomsApi: Send + Sync {
    async fn fetch_room(&self, room_code: &str) -> Result<Room, SessionError>;

    async fn update_room(
        &self,
        room_code: &str,
        updates: serde_json::Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Room, SessionError>;

    async fn kick_player(
        &self,
        room_code: &str,
        target_player_id: &str,
        host_id: &str,
    ) -> Result<Room, SessionError>;
}

#[async_trait]
impl RoomsApi for RoomService {
    async fn fetch_room(&self, room_code: &str) -> Result<Room, SessionError> {
        self.get(room_code).await.map_err(api_error)
    }

    async fn update_room(
        &self,
        room_code: &str,
        updates: serde_json::Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Room, SessionError> {
        self.update(room_code, updates, options)
            .await
            .map_err(api_error)
    }

    async fn kick_player(
        &self,
        room_code: &str,
        target_player_id: &str,
        host_id: &str,
    ) -> Result<Room, SessionError> {
        self.kick(room_code, target_player_id, host_id)
            .await
            .map_err(api_error)
    }
}

fn api_error(error: crate::error::RoomError) -> SessionError {
    SessionError::Api {
        status: error.status().as_u16(),
        message: error.to_string(),
    }
}

/// Rooms API over the wire protocol, for sessions running outside the
/// server process.
pub struct HttpRoomsClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WireError {
    error: String,
}

impl HttpRoomsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn decode_room(&self, response: reqwest::Response) -> Result<Room, SessionError> {
        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?;
            // POST responses wrap the room in an envelope; GET is bare.
            let room_value = body.get("room").cloned().unwrap_or(body);
            serde_json::from_value(room_value)
                .map_err(|e| SessionError::Transport(format!("Malformed room document: {e}")))
        } else {
            let message = response
                .json::<WireError>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| status.to_string());
            Err(SessionError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn post(&self, body: Value) -> Result<Room, SessionError> {
        let response = self
            .client
            .post(format!("{}/rooms-service", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        self.decode_room(response).await
    }
}

#[async_trait]
impl RoomsApi for HttpRoomsClient {
    async fn fetch_room(&self, room_code: &str) -> Result<Room, SessionError> {
        let response = self
            .client
            .get(format!("{}/rooms-service", self.base_url))
            .query(&[("roomCode", room_code)])
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        self.decode_room(response).await
    }

    async fn update_room(
        &self,
        room_code: &str,
        updates: serde_json::Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Room, SessionError> {
        let mut body = serde_json::json!({
            "action": "update",
            "roomCode": room_code,
            "updates": updates,
        });
        if options.strategy == MergeStrategy::Deep {
            body["mergeStrategy"] = serde_json::json!("deep");
        }
        if let Some(revision) = options.expected_revision {
            body["expectedRevision"] = serde_json::json!(revision);
        }
        self.post(body).await
    }

    async fn kick_player(
        &self,
        room_code: &str,
        target_player_id: &str,
        host_id: &str,
    ) -> Result<Room, SessionError> {
        self.post(serde_json::json!({
            "action": "kick",
            "roomCode": room_code,
            "targetPlayerId": target_player_id,
            "hostId": host_id,
        }))
        .await
    }
}

/// A consistent snapshot handed to game logic and UI code.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub room: Room,
    pub current_player: Player,
}

pub struct RoomSession {
    api: Arc<dyn RoomsApi>,
    room_code: RoomCode,
    identity: PlayerIdentity,
    cached: RwLock<Option<Room>>,
}

impl RoomSession {
    /// Requires an already-established identity; an absent one is a hard
    /// error, not an invitation to invent a player.
    pub fn new(
        api: Arc<dyn RoomsApi>,
        room_code: RoomCode,
        identity: PlayerIdentity,
    ) -> Result<Self, SessionError> {
        if identity.player_id.trim().is_empty() || identity.player_name.trim().is_empty() {
            return Err(SessionError::MissingIdentity);
        }
        Ok(Self {
            api,
            room_code,
            identity,
            cached: RwLock::new(None),
        })
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    /// Re-fetch the room and refresh the cache. The cache is updated even
    /// when our player turns out to be gone, so the UI can render the final
    /// state alongside the error.
    pub async fn load(&self) -> Result<RoomView, SessionError> {
        let room = self.api.fetch_room(&self.room_code).await?;
        *self.cached.write().await = Some(room.clone());

        let current_player = room
            .player(&self.identity.player_id)
            .cloned()
            .ok_or(SessionError::RemovedFromRoom)?;

        Ok(RoomView {
            room,
            current_player,
        })
    }

    /// Latest cached snapshot, if any poll has succeeded yet.
    pub async fn room(&self) -> Option<Room> {
        self.cached.read().await.clone()
    }

    pub async fn current_player(&self) -> Option<Player> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .and_then(|r| r.player(&self.identity.player_id))
            .cloned()
    }

    /// Persist a partial update, then apply the same shallow overwrite to
    /// the cached room immediately instead of waiting for the next poll.
    pub async fn update_room(
        &self,
        partial: serde_json::Map<String, Value>,
    ) -> Result<Room, SessionError> {
        self.update_room_with(partial, UpdateOptions::default()).await
    }

    pub async fn update_room_with(
        &self,
        partial: serde_json::Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Room, SessionError> {
        let persisted = self
            .api
            .update_room(&self.room_code, partial.clone(), options)
            .await?;

        let mut cached = self.cached.write().await;
        if let Some(room) = cached.as_ref() {
            let mut document = serde_json::to_value(room)
                .map_err(|e| SessionError::Transport(e.to_string()))?;
            shallow_merge(&mut document, Value::Object(partial));
            if let Ok(merged) = serde_json::from_value::<Room>(document) {
                *cached = Some(merged);
            }
        } else {
            *cached = Some(persisted.clone());
        }

        Ok(persisted)
    }

    /// Only meaningful for the host; the service re-checks authorization,
    /// this is not the enforcement point.
    pub async fn kick_player(&self, target_player_id: &str) -> Result<Room, SessionError> {
        let room = self
            .api
            .kick_player(&self.room_code, target_player_id, &self.identity.player_id)
            .await?;
        *self.cached.write().await = Some(room.clone());
        Ok(room)
    }

    /// Re-invoke `load()` on a fixed interval for the life of the session.
    /// Poll failures are logged and the previous snapshot stays rendered;
    /// no mutual exclusion with manual updates.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match session.load().await {
                    Ok(_) => {}
                    Err(SessionError::RemovedFromRoom) => {
                        tracing::warn!(
                            "Player {} is no longer in room {}",
                            session.identity.player_id,
                            session.room_code
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Poll of room {} failed: {}", session.room_code, e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn setup() -> (Arc<RoomService>, Room) {
        let service = Arc::new(RoomService::new(Arc::new(MemoryStore::new())));
        let room = service.create("Ana", "would-you-rather").await.unwrap();
        (service, room)
    }

    fn host_session(service: &Arc<RoomService>, room: &Room) -> Arc<RoomSession> {
        Arc::new(
            RoomSession::new(
                service.clone() as Arc<dyn RoomsApi>,
                room.room_code.clone(),
                PlayerIdentity {
                    player_id: room.host_id.clone(),
                    player_name: "Ana".to_string(),
                },
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_requires_identity() {
        let (service, room) = setup().await;
        let result = RoomSession::new(
            service as Arc<dyn RoomsApi>,
            room.room_code,
            PlayerIdentity {
                player_id: String::new(),
                player_name: "Ana".to_string(),
            },
        );
        assert!(matches!(result, Err(SessionError::MissingIdentity)));
    }

    #[tokio::test]
    async fn test_load_resolves_current_player() {
        let (service, room) = setup().await;
        let session = host_session(&service, &room);

        let view = session.load().await.unwrap();
        assert_eq!(view.current_player.player_id, room.host_id);
        assert!(view.current_player.is_host);
        assert!(session.room().await.is_some());
    }

    #[tokio::test]
    async fn test_load_after_kick_reports_removed() {
        let (service, room) = setup().await;
        let (_, ben_id) = service.join(&room.room_code, "Ben").await.unwrap();

        let ben_session = Arc::new(
            RoomSession::new(
                service.clone() as Arc<dyn RoomsApi>,
                room.room_code.clone(),
                PlayerIdentity {
                    player_id: ben_id.clone(),
                    player_name: "Ben".to_string(),
                },
            )
            .unwrap(),
        );
        ben_session.load().await.unwrap();

        service.kick(&room.room_code, &ben_id, &room.host_id).await.unwrap();

        let result = ben_session.load().await;
        assert!(matches!(result, Err(SessionError::RemovedFromRoom)));
        // The cache still holds the final state for rendering.
        assert!(ben_session.room().await.is_some());
        assert!(ben_session.current_player().await.is_none());
    }

    #[tokio::test]
    async fn test_update_room_applies_optimistically() {
        let (service, room) = setup().await;
        let session = host_session(&service, &room);
        session.load().await.unwrap();

        let mut partial = serde_json::Map::new();
        partial.insert("gameState".to_string(), json!({"phase": "playing", "votes": {}}));
        session.update_room(partial).await.unwrap();

        // Visible in the cache immediately, before any poll.
        let cached = session.room().await.unwrap();
        assert_eq!(cached.game_state["phase"], "playing");
    }

    #[tokio::test]
    async fn test_kick_via_session() {
        let (service, room) = setup().await;
        let (_, ben_id) = service.join(&room.room_code, "Ben").await.unwrap();

        let session = host_session(&service, &room);
        session.load().await.unwrap();

        let updated = session.kick_player(&ben_id).await.unwrap();
        assert!(updated.player(&ben_id).is_none());
    }

    #[tokio::test]
    async fn test_kick_via_session_rejected_for_non_host() {
        let (service, room) = setup().await;
        let (_, ben_id) = service.join(&room.room_code, "Ben").await.unwrap();
        let (_, carl_id) = service.join(&room.room_code, "Carl").await.unwrap();

        let ben_session = Arc::new(
            RoomSession::new(
                service.clone() as Arc<dyn RoomsApi>,
                room.room_code.clone(),
                PlayerIdentity {
                    player_id: ben_id,
                    player_name: "Ben".to_string(),
                },
            )
            .unwrap(),
        );

        let result = ben_session.kick_player(&carl_id).await;
        assert!(matches!(result, Err(SessionError::Api { status: 403, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_picks_up_remote_writes() {
        let (service, room) = setup().await;
        let session = host_session(&service, &room);
        session.load().await.unwrap();

        let handle = session.spawn_polling(POLL_INTERVAL);

        // Another client renames the room behind our back.
        let mut updates = serde_json::Map::new();
        updates.insert("name".to_string(), json!("Renamed elsewhere"));
        service
            .update(&room.room_code, updates, UpdateOptions::default())
            .await
            .unwrap();

        tokio::time::advance(POLL_INTERVAL + Duration::from_millis(100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let cached = session.room().await.unwrap();
        assert_eq!(cached.name, "Renamed elsewhere");
        handle.abort();
    }
}
