//! HTTP surface of the Room Access Service.
//!
//! A single action-dispatched POST endpoint plus a bare GET used by the
//! polling loop. Browsers poll; there is no push channel on this path.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::RoomError;
use crate::merge::MergeStrategy;
use crate::service::{RoomService, UpdateOptions};
use crate::types::{PlayerId, Room};

#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rooms-service", post(rooms_action).get(get_room))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RoomsRequest {
    #[serde(rename_all = "camelCase")]
    Create {
        player_name: String,
        selected_game: String,
    },
    #[serde(rename_all = "camelCase")]
    Join {
        room_code: String,
        player_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Kick {
        room_code: String,
        target_player_id: String,
        host_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        room_code: String,
        updates: serde_json::Map<String, Value>,
        #[serde(default)]
        merge_strategy: MergeStrategy,
        #[serde(default)]
        expected_revision: Option<u64>,
    },
}

#[derive(Debug, Serialize)]
pub struct RoomEnvelope {
    pub success: bool,
    pub room: Room,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinEnvelope {
    pub success: bool,
    pub room: Room,
    pub player_id: PlayerId,
}

async fn rooms_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RoomsRequest>,
) -> Response {
    match request {
        RoomsRequest::Create {
            player_name,
            selected_game,
        } => match state.rooms.create(&player_name, &selected_game).await {
            Ok(room) => (
                StatusCode::CREATED,
                Json(RoomEnvelope { success: true, room }),
            )
                .into_response(),
            Err(e) => error_response(e),
        },
        RoomsRequest::Join {
            room_code,
            player_name,
        } => match state.rooms.join(&room_code, &player_name).await {
            Ok((room, player_id)) => Json(JoinEnvelope {
                success: true,
                room,
                player_id,
            })
            .into_response(),
            Err(e) => error_response(e),
        },
        RoomsRequest::Kick {
            room_code,
            target_player_id,
            host_id,
        } => match state.rooms.kick(&room_code, &target_player_id, &host_id).await {
            Ok(room) => Json(RoomEnvelope { success: true, room }).into_response(),
            Err(e) => error_response(e),
        },
        RoomsRequest::Update {
            room_code,
            updates,
            merge_strategy,
            expected_revision,
        } => {
            let options = UpdateOptions {
                strategy: merge_strategy,
                expected_revision,
            };
            match state.rooms.update(&room_code, updates, options).await {
                Ok(room) => Json(RoomEnvelope { success: true, room }).into_response(),
                Err(e) => error_response(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoomQuery {
    room_code: String,
}

/// GET returns the bare room document, no success wrapper. This is the
/// poll path, hit every few seconds by every connected client.
async fn get_room(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GetRoomQuery>,
) -> Response {
    match state.rooms.get(&query.room_code).await {
        Ok(room) => Json(room).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(error: RoomError) -> Response {
    let status = error.status();
    if status.is_server_error() {
        tracing::error!("Room operation failed: {}", error);
    } else {
        tracing::debug!("Room operation rejected: {}", error);
    }
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}
