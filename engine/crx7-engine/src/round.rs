//! Round lifecycle state machine.
//!
//! Stage graph:
//! `IDLE → ROUND_START → DRAW_PREP → SPINNING → WINNER_REVEAL →
//! {INTERMISSION | ROUND_COMPLETE} → DISTRIBUTION`, with INTERMISSION
//! looping back to DRAW_PREP until seven winners exist.
//!
//! Forward progress is driven only by the winner count, never by
//! counting stage calls, so duplicate or re-entrant advance calls
//! cannot skip a draw. Stage transitions are persisted best-effort:
//! the in-memory state stays authoritative until a restart, at which
//! point `recover_active_round` resumes from the persisted position.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use crx7_common::types::{DrawStage, RoundStatus};
use crx7_common::wheel::winner_index;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::{HolderBalance, RoundStore};
use crate::selector::{select_candidates, Candidate};
use crate::state::{Participant, Round, Winner};

/// Message emitted by the spin timer task. SPINNING is the only stage
/// that auto-advances; every other transition is an explicit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundSignal {
    SpinElapsed { spin_token: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRound {
    pub round_id: String,
    pub round_number: u32,
}

/// In-memory state of the round in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    pub round_id: Option<String>,
    pub round_number: u32,
    pub stage: DrawStage,
    /// 1-based index of the draw in progress.
    pub current_draw: u8,
    pub started_at: Option<DateTime<Utc>>,
    /// Base units.
    pub prize_pool: u64,
    pub candidates: Vec<Candidate>,
    pub winners: Vec<Winner>,
    /// Every candidate seen across the round's draws, deduplicated by
    /// address; persisted as participants at completion.
    pub participants: Vec<Participant>,
    pub completed: bool,
    /// Bumped on every spin start; stale timer signals carry an old
    /// token and are ignored.
    pub spin_token: u64,
}

impl RoundState {
    fn idle() -> Self {
        RoundState {
            round_id: None,
            round_number: 0,
            stage: DrawStage::Idle,
            current_draw: 1,
            started_at: None,
            prize_pool: 0,
            candidates: vec![],
            winners: vec![],
            participants: vec![],
            completed: false,
            spin_token: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.round_id.is_some() && !self.completed
    }
}

/// Drives one round at a time through its stages. Single-writer: the
/// application owns the controller (typically behind a
/// `tokio::sync::Mutex`) and calls it from one logical flow.
pub struct RoundController<S> {
    store: S,
    config: EngineConfig,
    state: RoundState,
    signals: Option<mpsc::Sender<RoundSignal>>,
}

impl<S: RoundStore> RoundController<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        RoundController {
            store,
            config,
            state: RoundState::idle(),
            signals: None,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Create the channel the spin timer reports on. The caller owns
    /// the receiving end and feeds signals back via `handle_signal`.
    pub fn signal_channel(&mut self, buffer: usize) -> mpsc::Receiver<RoundSignal> {
        let (tx, rx) = mpsc::channel(buffer);
        self.signals = Some(tx);
        rx
    }

    /// Begin a new round with the given prize pool (base units).
    ///
    /// At most one round may be active system-wide; a conflicting call
    /// is rejected, checked against both in-memory state and the
    /// store.
    pub async fn start_round(&mut self, prize_pool: u64) -> Result<StartedRound, EngineError> {
        if self.state.is_active() {
            return Err(EngineError::RoundAlreadyActive {
                round_id: self.state.round_id.clone().unwrap_or_default(),
            });
        }
        if let Some(active) = self.store.find_active_round().await? {
            return Err(EngineError::RoundAlreadyActive { round_id: active.id });
        }

        let round_number = self.store.next_round_number().await?;
        let round = Round::start_now(round_number);
        self.store.create_round(&round).await?;

        self.state = RoundState {
            round_id: Some(round.id.clone()),
            round_number,
            stage: DrawStage::RoundStart,
            started_at: round.executed_at,
            prize_pool,
            ..RoundState::idle()
        };

        info!(round_id = %round.id, round_number, prize_pool, "round started");

        Ok(StartedRound {
            round_id: round.id,
            round_number,
        })
    }

    /// Reconstruct state for an already-active persisted round after a
    /// process restart. The caller-supplied draw index is trusted as
    /// the resumption point.
    pub fn recover_active_round(&mut self, round_id: &str, draw_index: u8) {
        info!(round_id, draw_index, "recovering active round");
        self.state = RoundState {
            round_id: Some(round_id.to_string()),
            stage: DrawStage::RoundStart,
            current_draw: draw_index.clamp(1, self.config.winners_per_round),
            started_at: Some(Utc::now()),
            ..RoundState::idle()
        };
    }

    /// Advance to the next stage. Pure function of the current stage
    /// name and the winner count; stages with no defined successor are
    /// a warned no-op, never a crash.
    pub async fn advance_stage(&mut self) -> DrawStage {
        let winners = self.state.winners.len();
        let max = self.config.winners_per_round as usize;

        let next = match self.state.stage {
            DrawStage::RoundStart => DrawStage::DrawPrep,
            DrawStage::DrawPrep => DrawStage::Spinning,
            DrawStage::Spinning => DrawStage::WinnerReveal,
            DrawStage::WinnerReveal => {
                if winners < max {
                    DrawStage::Intermission
                } else {
                    DrawStage::RoundComplete
                }
            }
            // Same condition re-checked on purpose: only the winner
            // count moves the round forward.
            DrawStage::Intermission => {
                if winners >= max {
                    DrawStage::RoundComplete
                } else {
                    DrawStage::DrawPrep
                }
            }
            DrawStage::RoundComplete => DrawStage::Distribution,
            stage @ (DrawStage::Idle | DrawStage::Distribution) => {
                warn!(stage = stage.as_str(), "no transition defined, ignoring");
                return stage;
            }
        };

        self.enter_stage(next).await;
        next
    }

    /// React to a timer signal. Stale tokens (a superseded spin) are
    /// ignored.
    pub async fn handle_signal(&mut self, signal: RoundSignal) -> Option<DrawStage> {
        match signal {
            RoundSignal::SpinElapsed { spin_token } => {
                if self.state.stage == DrawStage::Spinning && spin_token == self.state.spin_token {
                    Some(self.advance_stage().await)
                } else {
                    debug!(spin_token, "stale spin signal ignored");
                    None
                }
            }
        }
    }

    /// Select the candidate set for the draw in progress, excluding
    /// this round's existing winners.
    pub fn prepare_draw(&mut self, holders: &[HolderBalance]) -> Result<&[Candidate], EngineError> {
        if !self.state.is_active() {
            return Err(EngineError::NoActiveRound);
        }

        let excluded: HashSet<String> = self
            .state
            .winners
            .iter()
            .map(|w| w.wallet_address.clone())
            .collect();

        let mut rng = rand::thread_rng();
        let candidates = select_candidates(
            holders,
            &excluded,
            self.config.candidates_per_spin,
            self.config.minimum_token_balance,
            &mut rng,
        );
        self.set_candidates(candidates)?;
        Ok(&self.state.candidates)
    }

    /// Install an externally-built candidate set for the current draw
    /// and fold the candidates into the round's participant list.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>) -> Result<(), EngineError> {
        let round_id = self
            .state
            .round_id
            .clone()
            .ok_or(EngineError::NoActiveRound)?;

        for candidate in &candidates {
            let seen = self
                .state
                .participants
                .iter()
                .any(|p| p.wallet_address == candidate.wallet_address);
            if !seen {
                self.state.participants.push(Participant {
                    id: Uuid::new_v4().to_string(),
                    round_id: round_id.clone(),
                    wallet_address: candidate.wallet_address.clone(),
                    token_balance: candidate.token_balance,
                    identity_name: candidate.identity.name.to_string(),
                    identity_emoji: candidate.identity.emoji.to_string(),
                    joined_at: Utc::now(),
                });
            }
        }
        self.state.candidates = candidates;
        Ok(())
    }

    /// Map a final wheel rotation to the winning candidate of the
    /// current draw. Fails closed on an empty candidate set.
    pub fn resolve_winner(&self, rotation_degrees: f64) -> Result<&Candidate, EngineError> {
        let index = winner_index(rotation_degrees, self.state.candidates.len())?;
        Ok(&self.state.candidates[index])
    }

    /// Resolve and record the winner of the current draw. Sequence
    /// numbers are contiguous from 1 in assignment order.
    pub fn record_winner(
        &mut self,
        rotation_degrees: f64,
        prize_amount: u64,
    ) -> Result<Winner, EngineError> {
        let round_id = self
            .state
            .round_id
            .clone()
            .ok_or(EngineError::NoActiveRound)?;
        let index = winner_index(rotation_degrees, self.state.candidates.len())?;
        let candidate = &self.state.candidates[index];

        let winner = Winner {
            id: Uuid::new_v4().to_string(),
            round_id,
            participant_id: None,
            wallet_address: candidate.wallet_address.clone(),
            prize_amount,
            draw_sequence: self.state.current_draw,
            sequence_number: (self.state.winners.len() + 1) as u8,
            identity_name: candidate.identity.name.to_string(),
            identity_emoji: candidate.identity.emoji.to_string(),
            won_at: Utc::now(),
            transaction_hash: None,
            paid_at: None,
        };

        info!(
            draw = winner.draw_sequence,
            sequence = winner.sequence_number,
            wallet = %winner.wallet_address,
            identity = %winner.identity_display(),
            "winner recorded"
        );

        self.state.winners.push(winner.clone());
        Ok(winner)
    }

    /// Move to the next draw: bump the draw index (capped at the round
    /// maximum), clear the previous candidate set, return to DRAW_PREP.
    pub async fn start_next_draw(&mut self) -> Result<u8, EngineError> {
        if !self.state.is_active() {
            return Err(EngineError::NoActiveRound);
        }
        self.state.current_draw =
            (self.state.current_draw + 1).min(self.config.winners_per_round);
        self.state.candidates.clear();
        self.enter_stage(DrawStage::DrawPrep).await;
        Ok(self.state.current_draw)
    }

    /// Finish the round: persist winners and participants, mark the
    /// round completed with its final pool and duration, and move to
    /// the DISTRIBUTION stage. Persistence failures here are fatal,
    /// unlike stage persistence.
    pub async fn complete_round(&mut self) -> Result<Round, EngineError> {
        let round_id = self
            .state
            .round_id
            .clone()
            .ok_or(EngineError::NoActiveRound)?;
        if self.state.completed {
            return Err(EngineError::NoActiveRound);
        }

        let now = Utc::now();
        let duration_ms = self
            .state
            .started_at
            .map(|t| (now - t).num_milliseconds().max(0) as u64);

        let round = Round {
            id: round_id.clone(),
            round_number: self.state.round_number,
            status: RoundStatus::Completed,
            scheduled_at: self.state.started_at.unwrap_or(now),
            executed_at: self.state.started_at,
            completed_at: Some(now),
            total_prize_pool: Some(self.state.prize_pool),
            round_duration_ms: duration_ms,
            stage: DrawStage::Distribution,
            current_draw: self.state.current_draw,
        };

        self.store.update_round(&round).await?;
        self.store
            .replace_winners(&round_id, &self.state.winners)
            .await?;
        self.store
            .replace_participants(&round_id, &self.state.participants)
            .await?;

        self.state.stage = DrawStage::Distribution;
        self.state.completed = true;

        info!(
            round_id = %round_id,
            winners = self.state.winners.len(),
            duration_ms,
            "round completed"
        );

        Ok(round)
    }

    /// Abort the active round. The persisted round is marked cancelled
    /// and the in-memory state cleared.
    pub async fn cancel_round(&mut self) -> Result<(), EngineError> {
        let round_id = self
            .state
            .round_id
            .clone()
            .ok_or(EngineError::NoActiveRound)?;

        let round = Round {
            id: round_id.clone(),
            round_number: self.state.round_number,
            status: RoundStatus::Cancelled,
            scheduled_at: self.state.started_at.unwrap_or_else(Utc::now),
            executed_at: self.state.started_at,
            completed_at: None,
            total_prize_pool: None,
            round_duration_ms: None,
            stage: self.state.stage,
            current_draw: self.state.current_draw,
        };
        self.store.update_round(&round).await?;

        warn!(round_id = %round_id, "round cancelled");
        self.state = RoundState::idle();
        Ok(())
    }

    /// Drop all in-memory round state.
    pub fn reset(&mut self) {
        self.state = RoundState::idle();
    }

    async fn enter_stage(&mut self, stage: DrawStage) {
        self.state.stage = stage;
        if stage == DrawStage::Spinning {
            self.arm_spin_timer();
        }
        self.persist_stage().await;
    }

    fn arm_spin_timer(&mut self) {
        self.state.spin_token += 1;
        let Some(tx) = self.signals.clone() else {
            return;
        };
        let spin_token = self.state.spin_token;
        let duration = self.config.spin_duration();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(RoundSignal::SpinElapsed { spin_token }).await;
        });
    }

    /// Best-effort: a failed stage write is logged and recovered from
    /// on the next successful write; in-memory progress never rolls
    /// back for persistence lag.
    async fn persist_stage(&self) {
        let Some(round_id) = &self.state.round_id else {
            return;
        };
        if let Err(err) = self
            .store
            .update_round_stage(round_id, self.state.stage, self.state.current_draw)
            .await
        {
            warn!(
                round_id = %round_id,
                stage = self.state.stage.as_str(),
                %err,
                "stage persistence failed; in-memory state remains authoritative"
            );
        }
    }
}
