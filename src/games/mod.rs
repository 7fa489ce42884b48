//! Game phase controllers.
//!
//! Each game is a pure state machine over the room's `gameState` document:
//! current state + player action -> next state. Controllers never talk to
//! the store themselves; the async drivers in each game module persist the
//! computed document through the room session, so a persistence failure
//! leaves local state untouched.

pub mod paranoia;
pub mod would_you_rather;

use rand::Rng;
use serde_json::Value;

use crate::session::SessionError;
use crate::types::{GameKind, Room};

pub use paranoia::{ParanoiaAction, ParanoiaPhase, ParanoiaState};
pub use would_you_rather::{WyrAction, WyrChoice, WyrPhase, WyrQuestion, WyrState};

/// Randomness seam. Production uses the thread RNG; tests hand in scripted
/// sequences to pin down target selection and coin-flip outcomes.
pub trait RandomSource: Send {
    /// Uniform index into `0..len`. `len` must be non-zero.
    fn pick_index(&mut self, len: usize) -> usize;

    /// Fair coin.
    fn coin_flip(&mut self) -> bool;
}

#[derive(Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick_index(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }

    fn coin_flip(&mut self) -> bool {
        rand::rng().random_bool(0.5)
    }
}

/// Fisher-Yates over the injected source, so shuffles are scriptable too.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.pick_index(i + 1);
        items.swap(i, j);
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GameError {
    #[error("Only the host can do that")]
    NotHost,

    #[error("The host doesn't vote")]
    HostDoesNotVote,

    #[error("It's not your turn")]
    NotYourTurn,

    #[error("Only the asked player can answer")]
    NotTheTarget,

    #[error("You're not in this room")]
    UnknownPlayer,

    #[error("Not enough players for that")]
    NotEnoughPlayers,

    #[error("Can't {action} during the {phase} phase")]
    WrongPhase {
        action: &'static str,
        phase: String,
    },

    #[error("This action belongs to a different game")]
    WrongGame,

    #[error("Game state document is malformed: {0}")]
    MalformedState(String),
}

/// Who is acting, against which room snapshot.
pub struct ActionContext<'a> {
    pub actor: &'a str,
    pub room: &'a Room,
}

impl ActionContext<'_> {
    pub fn is_host(&self) -> bool {
        self.actor == self.room.host_id
    }

    pub fn is_member(&self) -> bool {
        self.room.player(self.actor).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameState {
    WouldYouRather(WyrState),
    Paranoia(ParanoiaState),
}

#[derive(Debug, Clone)]
pub enum GameAction {
    WouldYouRather(WyrAction),
    Paranoia(ParanoiaAction),
}

impl GameState {
    pub fn initial(kind: GameKind) -> Self {
        match kind {
            GameKind::WouldYouRather => GameState::WouldYouRather(WyrState::initial()),
            GameKind::Paranoia => GameState::Paranoia(ParanoiaState::initial()),
        }
    }

    /// Parse the room's free-form `gameState` document as the active
    /// game's typed state.
    pub fn from_room(room: &Room) -> Result<Self, GameError> {
        match room.current_game {
            GameKind::WouldYouRather => serde_json::from_value(room.game_state.clone())
                .map(GameState::WouldYouRather)
                .map_err(|e| GameError::MalformedState(e.to_string())),
            GameKind::Paranoia => {
                // Rooms are created with a generic lobby document; for
                // paranoia that maps to the pre-game waiting state.
                if room.game_state.get("phase").and_then(Value::as_str) == Some("lobby") {
                    return Ok(GameState::Paranoia(ParanoiaState::initial()));
                }
                serde_json::from_value(room.game_state.clone())
                    .map(GameState::Paranoia)
                    .map_err(|e| GameError::MalformedState(e.to_string()))
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            // Serialization of these states cannot fail; they are plain data.
            GameState::WouldYouRather(state) => {
                serde_json::to_value(state).unwrap_or(Value::Null)
            }
            GameState::Paranoia(state) => serde_json::to_value(state).unwrap_or(Value::Null),
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            GameState::WouldYouRather(state) => state.phase.as_str(),
            GameState::Paranoia(state) => state.phase.as_str(),
        }
    }

    /// Compute the next state. Pure apart from the injected randomness.
    pub fn apply(
        &self,
        ctx: &ActionContext<'_>,
        action: GameAction,
        rng: &mut dyn RandomSource,
    ) -> Result<GameState, GameError> {
        match (self, action) {
            (GameState::WouldYouRather(state), GameAction::WouldYouRather(action)) => {
                state.apply(ctx, action).map(GameState::WouldYouRather)
            }
            (GameState::Paranoia(state), GameAction::Paranoia(action)) => {
                state.apply(ctx, action, rng).map(GameState::Paranoia)
            }
            _ => Err(GameError::WrongGame),
        }
    }
}

/// Errors surfaced to the player as a transient notification. Previously
/// rendered state stays intact in both cases.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Player;

    /// Scripted random source for deterministic tests.
    pub(crate) struct ScriptedRandom {
        pub indices: Vec<usize>,
        pub flips: Vec<bool>,
    }

    impl RandomSource for ScriptedRandom {
        fn pick_index(&mut self, len: usize) -> usize {
            let next = if self.indices.is_empty() {
                0
            } else {
                self.indices.remove(0)
            };
            next % len
        }

        fn coin_flip(&mut self) -> bool {
            if self.flips.is_empty() {
                false
            } else {
                self.flips.remove(0)
            }
        }
    }

    pub(crate) fn test_room(player_names: &[&str]) -> Room {
        let players: Vec<Player> = player_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut p = Player::new(name.to_string(), i == 0);
                p.player_id = format!("p{i}");
                p
            })
            .collect();

        Room {
            room_code: "TEST00".to_string(),
            name: "test".to_string(),
            host_id: "p0".to_string(),
            current_game: GameKind::WouldYouRather,
            game_state: serde_json::json!({}),
            players,
            created_at: crate::types::now_rfc3339(),
            revision: 1,
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_with_scripted_source() {
        let mut rng = ScriptedRandom {
            indices: vec![0, 0, 0],
            flips: vec![],
        };
        let mut items = vec!["a", "b", "c", "d"];
        shuffle(&mut items, &mut rng);
        // Every swap targets index 0.
        assert_eq!(items, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_mismatched_action_rejected() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p0",
            room: &room,
        };
        let state = GameState::initial(GameKind::WouldYouRather);
        let result = state.apply(
            &ctx,
            GameAction::Paranoia(ParanoiaAction::StartGame),
            &mut ThreadRandom,
        );
        assert_eq!(result.unwrap_err(), GameError::WrongGame);
    }

    #[test]
    fn test_initial_states_have_expected_phases() {
        assert_eq!(GameState::initial(GameKind::WouldYouRather).phase(), "lobby");
        assert_eq!(GameState::initial(GameKind::Paranoia).phase(), "waiting");
    }
}
