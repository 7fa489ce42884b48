//! Paranoia: players take turns whispering a question to a target, the
//! target answers with someone's name, and a coin flip decides whether the
//! question itself gets revealed to the room.
//!
//! The defining turn-order rule: whoever just answered becomes the next
//! asker, regardless of the flip outcome. Index increment is not the
//! policy; target handoff is.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{shuffle, ActionContext, ControllerError, GameError, GameState, RandomSource};
use crate::questions::QuestionChain;
use crate::session::RoomSession;
use crate::types::{PlayerId, Room};

/// Suspense pause before the flip resolves.
pub const COIN_FLIP_DELAY: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParanoiaPhase {
    Waiting,
    Playing,
    Answering,
    WaitingForFlip,
    CoinFlip,
    Revealed,
    NotRevealed,
    Ended,
}

impl ParanoiaPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParanoiaPhase::Waiting => "waiting",
            ParanoiaPhase::Playing => "playing",
            ParanoiaPhase::Answering => "answering",
            ParanoiaPhase::WaitingForFlip => "waiting_for_flip",
            ParanoiaPhase::CoinFlip => "coin_flip",
            ParanoiaPhase::Revealed => "revealed",
            ParanoiaPhase::NotRevealed => "not_revealed",
            ParanoiaPhase::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParanoiaState {
    pub phase: ParanoiaPhase,
    /// Shuffled permutation of player ids, fixed for one round of turns.
    pub player_order: Vec<PlayerId>,
    pub current_turn_index: usize,
    /// Everyone who has asked this round; a full set triggers a reshuffle.
    pub used_askers: Vec<PlayerId>,
    pub current_round: u32,
    #[serde(default)]
    pub current_question: Option<String>,
    #[serde(default)]
    pub current_target_id: Option<PlayerId>,
    #[serde(default)]
    pub current_answer: Option<String>,
}

impl ParanoiaState {
    pub fn initial() -> Self {
        Self {
            phase: ParanoiaPhase::Waiting,
            player_order: Vec::new(),
            current_turn_index: 0,
            used_askers: Vec::new(),
            current_round: 0,
            current_question: None,
            current_target_id: None,
            current_answer: None,
        }
    }

    pub fn current_asker(&self) -> Option<&PlayerId> {
        self.player_order.get(self.current_turn_index)
    }

    pub fn apply(
        &self,
        ctx: &ActionContext<'_>,
        action: ParanoiaAction,
        rng: &mut dyn RandomSource,
    ) -> Result<ParanoiaState, GameError> {
        match action {
            ParanoiaAction::StartGame => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                if self.phase != ParanoiaPhase::Waiting {
                    return Err(self.wrong_phase("start the game"));
                }
                if ctx.room.players.len() < 2 {
                    return Err(GameError::NotEnoughPlayers);
                }

                let mut order: Vec<PlayerId> =
                    ctx.room.players.iter().map(|p| p.player_id.clone()).collect();
                shuffle(&mut order, rng);

                Ok(ParanoiaState {
                    phase: ParanoiaPhase::Playing,
                    player_order: order,
                    current_turn_index: 0,
                    used_askers: Vec::new(),
                    current_round: 1,
                    current_question: None,
                    current_target_id: None,
                    current_answer: None,
                })
            }
            ParanoiaAction::SelectQuestion { question } => {
                if self.phase != ParanoiaPhase::Playing {
                    return Err(self.wrong_phase("ask"));
                }
                if self.current_asker().map(String::as_str) != Some(ctx.actor) {
                    return Err(GameError::NotYourTurn);
                }

                let mut next = self.clone();

                // A full set of askers closes the round: new shuffle, next
                // round number, clean slate. The acting asker keeps their
                // turn under the fresh order.
                if next.used_askers.len() >= ctx.room.players.len() {
                    let mut order: Vec<PlayerId> =
                        ctx.room.players.iter().map(|p| p.player_id.clone()).collect();
                    shuffle(&mut order, rng);
                    next.current_turn_index = order
                        .iter()
                        .position(|id| id == ctx.actor)
                        .unwrap_or(0);
                    next.player_order = order;
                    next.current_round += 1;
                    next.used_askers.clear();
                }

                if !next.used_askers.iter().any(|id| id == ctx.actor) {
                    next.used_askers.push(ctx.actor.to_string());
                }

                let candidates: Vec<&PlayerId> = ctx
                    .room
                    .players
                    .iter()
                    .map(|p| &p.player_id)
                    .filter(|id| id.as_str() != ctx.actor)
                    .collect();
                if candidates.is_empty() {
                    return Err(GameError::NotEnoughPlayers);
                }
                let target = candidates[rng.pick_index(candidates.len())].clone();

                next.current_question = Some(question);
                next.current_target_id = Some(target);
                next.current_answer = None;
                next.phase = ParanoiaPhase::Answering;
                Ok(next)
            }
            ParanoiaAction::SubmitAnswer { answer } => {
                if self.phase != ParanoiaPhase::Answering {
                    return Err(self.wrong_phase("answer"));
                }
                if self.current_target_id.as_deref() != Some(ctx.actor) {
                    return Err(GameError::NotTheTarget);
                }
                let mut next = self.clone();
                next.current_answer = Some(answer);
                next.phase = ParanoiaPhase::WaitingForFlip;
                Ok(next)
            }
            ParanoiaAction::StartCoinFlip => {
                if !ctx.is_member() {
                    return Err(GameError::UnknownPlayer);
                }
                if self.phase != ParanoiaPhase::WaitingForFlip {
                    return Err(self.wrong_phase("flip"));
                }
                let mut next = self.clone();
                next.phase = ParanoiaPhase::CoinFlip;
                Ok(next)
            }
            ParanoiaAction::ResolveCoinFlip => {
                if self.phase != ParanoiaPhase::CoinFlip {
                    return Err(self.wrong_phase("resolve the flip"));
                }
                let target = self
                    .current_target_id
                    .clone()
                    .ok_or_else(|| GameError::MalformedState("coin flip without a target".to_string()))?;

                let mut next = self.clone();
                next.phase = if rng.coin_flip() {
                    ParanoiaPhase::Revealed
                } else {
                    ParanoiaPhase::NotRevealed
                };

                // The answerer becomes the next asker, in both outcomes.
                next.current_turn_index = match next.player_order.iter().position(|id| *id == target)
                {
                    Some(index) => index,
                    None => {
                        // Target joined after the round's shuffle; fold them
                        // into the order rather than losing the handoff.
                        next.player_order.push(target);
                        next.player_order.len() - 1
                    }
                };
                Ok(next)
            }
            ParanoiaAction::NextTurn => {
                if !ctx.is_member() {
                    return Err(GameError::UnknownPlayer);
                }
                if !matches!(
                    self.phase,
                    ParanoiaPhase::Revealed | ParanoiaPhase::NotRevealed
                ) {
                    return Err(self.wrong_phase("continue"));
                }
                let mut next = self.clone();
                next.phase = ParanoiaPhase::Playing;
                next.current_question = None;
                next.current_target_id = None;
                next.current_answer = None;
                Ok(next)
            }
            ParanoiaAction::EndGame => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                let mut next = self.clone();
                next.phase = ParanoiaPhase::Ended;
                Ok(next)
            }
            ParanoiaAction::ResetGame => {
                if !ctx.is_host() {
                    return Err(GameError::NotHost);
                }
                // Force-reset from any phase.
                Ok(ParanoiaState::initial())
            }
        }
    }

    fn wrong_phase(&self, action: &'static str) -> GameError {
        GameError::WrongPhase {
            action,
            phase: self.phase.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParanoiaAction {
    StartGame,
    SelectQuestion { question: String },
    SubmitAnswer { answer: String },
    StartCoinFlip,
    ResolveCoinFlip,
    NextTurn,
    EndGame,
    ResetGame,
}

async fn apply_and_persist(
    session: &Arc<RoomSession>,
    action: ParanoiaAction,
) -> Result<Room, ControllerError> {
    let view = session.load().await?;

    let state = GameState::from_room(&view.room)?;
    let ctx = ActionContext {
        actor: &session.identity().player_id,
        room: &view.room,
    };
    let next = state.apply(
        &ctx,
        super::GameAction::Paranoia(action),
        &mut super::ThreadRandom,
    )?;

    let mut updates = serde_json::Map::new();
    updates.insert("gameState".to_string(), next.to_value());
    Ok(session.update_room(updates).await?)
}

pub async fn start_game(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    apply_and_persist(session, ParanoiaAction::StartGame).await
}

/// Asker action: draw a question from the source chain and a random target
/// from everyone else.
pub async fn select_question(
    session: &Arc<RoomSession>,
    questions: &QuestionChain,
) -> Result<Room, ControllerError> {
    let question = questions.next_paranoia().await;
    apply_and_persist(session, ParanoiaAction::SelectQuestion { question }).await
}

pub async fn submit_answer(
    session: &Arc<RoomSession>,
    answer: String,
) -> Result<Room, ControllerError> {
    apply_and_persist(session, ParanoiaAction::SubmitAnswer { answer }).await
}

/// Enter the coin-flip phase and schedule its resolution after the fixed
/// suspense delay.
pub async fn start_coin_flip(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    let room = apply_and_persist(session, ParanoiaAction::StartCoinFlip).await?;
    spawn_coin_flip_resolution(Arc::clone(session), COIN_FLIP_DELAY);
    Ok(room)
}

pub async fn next_turn(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    apply_and_persist(session, ParanoiaAction::NextTurn).await
}

pub async fn end_game(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    apply_and_persist(session, ParanoiaAction::EndGame).await
}

pub async fn reset_game(session: &Arc<RoomSession>) -> Result<Room, ControllerError> {
    apply_and_persist(session, ParanoiaAction::ResetGame).await
}

/// After the delay, resolve the flip if the room is still mid-flip.
/// Someone else (or a reset) may have moved the game on; that is fine.
pub fn spawn_coin_flip_resolution(session: Arc<RoomSession>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        match apply_and_persist(&session, ParanoiaAction::ResolveCoinFlip).await {
            Ok(_) => {}
            Err(ControllerError::Game(GameError::WrongPhase { .. })) => {}
            Err(e) => tracing::warn!("Coin flip resolution failed: {}", e),
        }
    });
}
