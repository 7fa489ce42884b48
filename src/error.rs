use axum::http::StatusCode;

/// Errors the room store itself can produce. The in-memory store never
/// fails, but the trait boundary keeps the semantics of a remote backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unreachable: {0}")]
    Backend(String),
}

/// Everything a room operation can fail with, mapped 1:1 onto the wire
/// status codes in `api`.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    Validation(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Name already taken in this room")]
    NameTaken,

    #[error("Could not allocate an unused room code")]
    RoomCodeExhausted,

    #[error("Stored room document is corrupted")]
    RoomCorrupted,

    #[error("Room could not be persisted")]
    PersistenceFailed,

    #[error("Only the host may do that")]
    NotAuthorized,

    #[error("Stale write: room is at revision {found}, caller expected {expected}")]
    StaleWrite { expected: u64, found: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl RoomError {
    pub fn status(&self) -> StatusCode {
        match self {
            RoomError::Validation(_) => StatusCode::BAD_REQUEST,
            RoomError::RoomNotFound | RoomError::PlayerNotFound => StatusCode::NOT_FOUND,
            RoomError::NameTaken | RoomError::RoomCodeExhausted | RoomError::StaleWrite { .. } => {
                StatusCode::CONFLICT
            }
            RoomError::RoomCorrupted => StatusCode::GONE,
            RoomError::PersistenceFailed => StatusCode::INTERNAL_SERVER_ERROR,
            RoomError::NotAuthorized => StatusCode::FORBIDDEN,
            RoomError::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
