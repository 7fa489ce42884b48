//! Would You Rather: host loads a question, everyone else votes A or B,
//! results reveal automatically once the last vote lands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{ActionContext, ControllerError, GameError, GameState};
use crate::questions::QuestionChain;
use crate::session::RoomSession;
use crate::types::{PlayerId, Room};

/// Grace period between the final vote and the automatic reveal, so the
/// last voter sees their own choice land before the tally flips in.
pub const AUTO_REVEAL_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WyrPhase {
    Lobby,
    Playing,
}

impl WyrPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WyrPhase::Lobby => "lobby",
            WyrPhase::Playing => "playing",
        }
    }
}

/// Question shape as delivered by the generator service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WyrQuestion {
    pub option_a: String,
    pub option_b: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum WyrChoice {
    A,
    B,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WyrState {
    pub phase: WyrPhase,
    pub current_question: Option<WyrQuestion>,
    pub votes: BTreeMap<PlayerId, WyrChoice>,
    #[serde(default)]
    pub show_results: bool,
}

impl WyrState {
    pub fn initial() -> Self {
        Self {
            phase: WyrPhase::Lobby,
            current_question: None,
            votes: BTreeMap::new(),
            show_results: false,
        }
    }

    /// Voters are every non-host player; the host drives the questions.
    pub fn eligible_voters(room: &Room) -> usize {
        room.players.iter().filter(|p| !p.is_host).count()
    }

    pub fn all_voted(&self, room: &Room) -> bool {
        let eligible = Self::eligible_voters(room);
        eligible > 0 && self.votes.len() >= eligible
    }

    pub fn tally(&self) -> (usize, usize) {
        let a = self.votes.values().filter(|c| **c == WyrChoice::A).count();
        (a, self.votes.len() - a)
    }

    pub fn apply(&self, ctx: &ActionContext<'_>, action: WyrAction) -> Result<WyrState, GameError> {
        match action {
            WyrAction::LoadQuestion(question) => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                Ok(WyrState {
                    phase: WyrPhase::Playing,
                    current_question: Some(question),
                    votes: BTreeMap::new(),
                    show_results: false,
                })
            }
            WyrAction::Vote(choice) => {
                if !ctx.is_member() {
                    return Err(GameError::UnknownPlayer);
                }
                if ctx.is_host() {
                    return Err(GameError::HostDoesNotVote);
                }
                if self.phase != WyrPhase::Playing || self.current_question.is_none() {
                    return Err(GameError::WrongPhase {
                        action: "vote",
                        phase: self.phase.as_str().to_string(),
                    });
                }
                if self.show_results {
                    return Err(GameError::WrongPhase {
                        action: "vote",
                        phase: "results".to_string(),
                    });
                }
                // Second vote from the same player is a no-op, not an error
                // escalation; the first choice stands.
                if self.votes.contains_key(ctx.actor) {
                    return Ok(self.clone());
                }
                let mut next = self.clone();
                next.votes.insert(ctx.actor.to_string(), choice);
                Ok(next)
            }
            WyrAction::ShowResults => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                if self.phase != WyrPhase::Playing {
                    return Err(GameError::WrongPhase {
                        action: "show results",
                        phase: self.phase.as_str().to_string(),
                    });
                }
                let mut next = self.clone();
                next.show_results = true;
                Ok(next)
            }
            WyrAction::BackToLobby => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                // Unconditional full replace, never a merge.
                Ok(WyrState::initial())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum WyrAction {
    LoadQuestion(WyrQuestion),
    Vote(WyrChoice),
    ShowResults,
    BackToLobby,
}

/// Host action: pick the next question through the three-tier source chain
/// and reset the voting state.
pub async fn load_next_question(
    session: &Arc<RoomSession>,
    questions: &QuestionChain,
) -> Result<Room, ControllerError> {
    let question = questions.next_would_you_rather().await;
    let view = session.load().await?;

    let state = GameState::from_room(&view.room)?;
    let ctx = ActionContext {
        actor: &session.identity().player_id,
        room: &view.room,
    };
    let next = state.apply(
        &ctx,
        super::GameAction::WouldYouRather(WyrAction::LoadQuestion(question)),
        &mut super::ThreadRandom,
    )?;

    Ok(persist(session, &next).await?)
}

/// Player action: record a vote. When this was the last outstanding vote,
/// schedule the automatic reveal; no host action needed from here.
pub async fn cast_vote(
    session: &Arc<RoomSession>,
    choice: WyrChoice,
) -> Result<Room, ControllerError> {
    let view = session.load().await?;

    let state = GameState::from_room(&view.room)?;
    let ctx = ActionContext {
        actor: &session.identity().player_id,
        room: &view.room,
    };
    let next = state.apply(
        &ctx,
        super::GameAction::WouldYouRather(WyrAction::Vote(choice)),
        &mut super::ThreadRandom,
    )?;

    let room = persist(session, &next).await?;

    if let GameState::WouldYouRather(wyr) = &next {
        if wyr.all_voted(&room) && !wyr.show_results {
            spawn_auto_reveal(Arc::clone(session), AUTO_REVEAL_DELAY);
        }
    }

    Ok(room)
}

/// Host action: flip the results early without waiting for stragglers.
pub async fn show_results(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    let view = session.load().await?;

    let state = GameState::from_room(&view.room)?;
    let ctx = ActionContext {
        actor: &session.identity().player_id,
        room: &view.room,
    };
    let next = state.apply(
        &ctx,
        super::GameAction::WouldYouRather(WyrAction::ShowResults),
        &mut super::ThreadRandom,
    )?;

    Ok(persist(session, &next).await?)
}

pub async fn back_to_lobby(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    let view = session.load().await?;

    let state = GameState::from_room(&view.room)?;
    let ctx = ActionContext {
        actor: &session.identity().player_id,
        room: &view.room,
    };
    let next = state.apply(
        &ctx,
        super::GameAction::WouldYouRather(WyrAction::BackToLobby),
        &mut super::ThreadRandom,
    )?;

    Ok(persist(session, &next).await?)
}

async fn persist(
    session: &Arc<RoomSession>,
    state: &GameState,
) -> Result<Room, crate::session::SessionError> {
    let mut updates = serde_json::Map::new();
    updates.insert("gameState".to_string(), state.to_value());
    session.update_room(updates).await
}

/// After the delay, re-read the room and flip `showResults` if the vote is
/// still complete. Skips quietly if the host already revealed or moved on.
pub fn spawn_auto_reveal(session: Arc<RoomSession>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let view = match session.load().await {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!("Auto-reveal poll failed: {}", e);
                return;
            }
        };

        let mut wyr = match GameState::from_room(&view.room) {
            Ok(GameState::WouldYouRather(wyr)) => wyr,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!("Auto-reveal found malformed state: {}", e);
                return;
            }
        };

        if wyr.phase != WyrPhase::Playing || wyr.show_results || !wyr.all_voted(&view.room) {
            return;
        }

        wyr.show_results = true;
        if let Err(e) = persist(&session, &GameState::WouldYouRather(wyr)).await {
            tracing::warn!("Auto-reveal persist failed: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_room;
    use super::super::GameAction;
    use super::*;

    fn question() -> WyrQuestion {
        WyrQuestion {
            option_a: "Always whisper".to_string(),
            option_b: "Always shout".to_string(),
        }
    }

    fn playing_state() -> WyrState {
        WyrState {
            phase: WyrPhase::Playing,
            current_question: Some(question()),
            votes: BTreeMap::new(),
            show_results: false,
        }
    }

    #[test]
    fn test_load_question_resets_votes() {
        let room = test_room(&["Ana", "Ben", "Carl"]);
        let ctx = ActionContext {
            actor: "p0",
            room: &room,
        };

        let mut state = playing_state();
        state.votes.insert("p1".to_string(), WyrChoice::A);
        state.show_results = true;

        let next = state
            .apply(&ctx, WyrAction::LoadQuestion(question()))
            .unwrap();
        assert_eq!(next.phase, WyrPhase::Playing);
        assert!(next.votes.is_empty());
        assert!(!next.show_results);
        assert!(next.current_question.is_some());
    }

    #[test]
    fn test_load_question_is_host_only() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p1",
            room: &room,
        };
        let result = WyrState::initial().apply(&ctx, WyrAction::LoadQuestion(question()));
        assert_eq!(result.unwrap_err(), GameError::NotHost);
    }

    #[test]
    fn test_vote_recorded_once() {
        let room = test_room(&["Ana", "Ben", "Carl"]);
        let ctx = ActionContext {
            actor: "p1",
            room: &room,
        };

        let state = playing_state();
        let voted = state.apply(&ctx, WyrAction::Vote(WyrChoice::A)).unwrap();
        assert_eq!(voted.votes.len(), 1);

        // Second vote is a no-op: count unchanged, first choice stands.
        let again = voted.apply(&ctx, WyrAction::Vote(WyrChoice::B)).unwrap();
        assert_eq!(again.votes.len(), 1);
        assert_eq!(again.votes["p1"], WyrChoice::A);
    }

    #[test]
    fn test_host_cannot_vote() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p0",
            room: &room,
        };
        let result = playing_state().apply(&ctx, WyrAction::Vote(WyrChoice::A));
        assert_eq!(result.unwrap_err(), GameError::HostDoesNotVote);
    }

    #[test]
    fn test_vote_requires_active_question() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p1",
            room: &room,
        };
        let result = WyrState::initial().apply(&ctx, WyrAction::Vote(WyrChoice::A));
        assert!(matches!(result, Err(GameError::WrongPhase { .. })));
    }

    #[test]
    fn test_all_voted_counts_non_host_players() {
        let room = test_room(&["Ana", "Ben", "Carl"]);
        let mut state = playing_state();
        assert!(!state.all_voted(&room));

        state.votes.insert("p1".to_string(), WyrChoice::A);
        assert!(!state.all_voted(&room));

        state.votes.insert("p2".to_string(), WyrChoice::B);
        assert!(state.all_voted(&room));
        assert_eq!(state.tally(), (1, 1));
    }

    #[test]
    fn test_back_to_lobby_is_full_reset() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p0",
            room: &room,
        };

        let mut state = playing_state();
        state.votes.insert("p1".to_string(), WyrChoice::A);
        state.show_results = true;

        let next = state.apply(&ctx, WyrAction::BackToLobby).unwrap();
        assert_eq!(next, WyrState::initial());
    }

    #[test]
    fn test_state_parses_creation_placeholder() {
        // The document `create` seeds for every room.
        let value = crate::service::initial_lobby_state();
        let state: WyrState = serde_json::from_value(value).unwrap();
        assert_eq!(state.phase, WyrPhase::Lobby);
        assert!(state.votes.is_empty());
        assert!(state.current_question.is_none());
        assert!(!state.show_results);
    }

    #[test]
    fn test_state_wire_shape() {
        let mut state = playing_state();
        state.votes.insert("p1".to_string(), WyrChoice::A);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["phase"], "playing");
        assert_eq!(value["currentQuestion"]["option_a"], "Always whisper");
        assert_eq!(value["votes"]["p1"], "A");
        assert_eq!(value["showResults"], false);
    }

    #[test]
    fn test_apply_through_union() {
        let room = test_room(&["Ana", "Ben"]);
        let ctx = ActionContext {
            actor: "p0",
            room: &room,
        };
        let state = GameState::WouldYouRather(WyrState::initial());
        let next = state
            .apply(
                &ctx,
                GameAction::WouldYouRather(WyrAction::LoadQuestion(question())),
                &mut super::super::ThreadRandom,
            )
            .unwrap();
        assert_eq!(next.phase(), "playing");
    }
}
