//! Debate engine: the public state-transition operations
//!
//! Every turn-state write runs the auto-fixer before the guarded UPDATE, so
//! no write can bypass the validator. Flag mutations (votes, surveys, the AI
//! pause) go through field-targeted conditional statements that own their
//! columns outright. Correctness under concurrent actors comes entirely from
//! conditional updates at the storage layer; there are no in-process locks.
//!
//! AI turns reuse the exact argument-submission path humans use. There is no
//! special-cased turn logic for AI submitters.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::db;
use crate::error::{DebateError, Result};
use crate::events::{DebateEvent, EventSink};
use crate::generator::{
    truncate_to_boundary, ArgumentGenerator, FallbackGenerator, GenerationContext,
};
use crate::lifecycle;
use crate::types::{
    Argument, ArgumentText, Debate, DebateStatus, MaxRounds, PlayerType, Stance, StanceCertainty,
    Submitter, MAX_ARGUMENT_CHARS,
};
use crate::validator::{auto_fix, expected_next_turn};

/// Who is claiming the opponent slot of a waiting debate.
#[derive(Debug, Clone)]
pub struct OpponentSpec {
    pub user_id: Option<String>,
    pub player_type: PlayerType,
    pub personality: Option<String>,
    /// Admin-forced first speaker. Random coin flip when unset.
    pub first_player: Option<Stance>,
}

impl OpponentSpec {
    pub fn human(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            player_type: PlayerType::Human,
            personality: None,
            first_player: None,
        }
    }

    pub fn ai(personality: &str) -> Self {
        Self {
            user_id: None,
            player_type: PlayerType::Ai,
            personality: Some(personality.to_string()),
            first_player: None,
        }
    }

    pub fn with_first_player(mut self, stance: Stance) -> Self {
        self.first_player = Some(stance);
        self
    }
}

/// The turn-state and lifecycle engine over one storage connection.
///
/// Multiple engines (request handlers, scheduler, sweeper) may point at the
/// same database concurrently; the conditional updates arbitrate.
pub struct DebateEngine {
    conn: Connection,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    generator: Arc<dyn ArgumentGenerator>,
    fallback: FallbackGenerator,
}

impl DebateEngine {
    pub fn new(
        conn: Connection,
        config: EngineConfig,
        events: Arc<dyn EventSink>,
        generator: Arc<dyn ArgumentGenerator>,
    ) -> Self {
        Self {
            conn,
            config,
            events,
            generator,
            fallback: FallbackGenerator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a waiting-pool debate for a player who just joined.
    pub fn join_waiting_pool(
        &self,
        user_id: &str,
        topic: &str,
        stance: Stance,
        max_rounds: MaxRounds,
        certainty: Option<StanceCertainty>,
    ) -> Result<String> {
        let debate = Debate::new_waiting(user_id, topic, stance, max_rounds, certainty);
        db::insert_debate(&self.conn, &debate)?;
        debug!(debate_id = %debate.id, topic, "debate created, waiting for opponent");
        Ok(debate.id)
    }

    pub fn get(&self, debate_id: &str) -> Result<Debate> {
        db::get_debate(&self.conn, debate_id)?
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))
    }

    /// Claim the opponent slot. Fails with `AlreadyMatched` when another
    /// claimant (human join or scheduler tick) won the race.
    pub fn assign_opponent(&mut self, debate_id: &str, spec: &OpponentSpec) -> Result<Debate> {
        let debate = self.get(debate_id)?;
        if debate.status != DebateStatus::Waiting || debate.player2_type.is_some() {
            return Err(DebateError::AlreadyMatched);
        }

        let first_player = spec
            .first_player
            .unwrap_or_else(|| {
                if rand::random::<bool>() {
                    Stance::For
                } else {
                    Stance::Against
                }
            });

        let won = db::claim_opponent(
            &self.conn,
            debate_id,
            spec.user_id.as_deref(),
            spec.player_type,
            spec.personality.as_deref(),
            first_player,
            Utc::now(),
        )?;
        if !won {
            return Err(DebateError::AlreadyMatched);
        }

        // Re-validate turn state on the claimed row; the claim itself sets
        // next_turn = first_player, so this is a no-op unless drifted.
        let mut debate = self.get(debate_id)?;
        if auto_fix(&mut debate) {
            db::update_debate_guarded(&self.conn, &debate, debate.status)?;
        }

        self.events.publish(DebateEvent::DebateStarted {
            debate_id: debate.id.clone(),
            first_player,
            opponent: spec.player_type,
        });
        Ok(debate)
    }

    /// Claim the opponent slot and, when the AI opens the debate, request its
    /// first argument. Generation failure degrades to the fallback inside
    /// the turn runner and never undoes the match.
    pub async fn assign_and_open(
        &mut self,
        debate_id: &str,
        spec: &OpponentSpec,
    ) -> Result<Debate> {
        self.assign_opponent(debate_id, spec)?;
        if spec.player_type == PlayerType::Ai {
            if let Err(e) = self.maybe_run_ai_turn(debate_id).await {
                warn!(debate_id, error = %e, "opening AI argument failed, debate stays active");
            }
        }
        self.get(debate_id)
    }

    /// Append an argument for `stance`, guarded against the expected turn.
    ///
    /// Closing a round advances `current_round`, or moves the debate to
    /// survey_pending once `max_rounds` is played out.
    pub fn submit_argument(
        &mut self,
        debate_id: &str,
        stance: Stance,
        text: &str,
        submitted_by: Submitter,
    ) -> Result<Debate> {
        let text = ArgumentText::new(text)?;

        let tx = self.conn.transaction()?;
        let mut debate = db::get_debate(&tx, debate_id)?
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))?;

        match debate.status {
            DebateStatus::Active => {}
            DebateStatus::Waiting | DebateStatus::Abandoned => {
                return Err(DebateError::NotYourTurn)
            }
            DebateStatus::SurveyPending | DebateStatus::Completed => {
                return Err(DebateError::RoundClosed(debate.current_round))
            }
        }

        match expected_next_turn(&debate) {
            None => return Err(DebateError::RoundClosed(debate.current_round)),
            Some(expected) if expected != stance => return Err(DebateError::NotYourTurn),
            Some(_) => {}
        }

        let argument = Argument {
            stance,
            text: text.into_string(),
            round: debate.current_round,
            submitted_by,
            created_at: Utc::now(),
        };
        db::append_argument(&tx, debate_id, &argument)?;
        let round = argument.round;
        debate.arguments.push(argument);
        debate.last_activity_at = Utc::now();

        let mut left_active = false;
        if debate.current_round_count() == 2 {
            if debate.current_round >= debate.max_rounds {
                lifecycle::transition(&mut debate, DebateStatus::SurveyPending)?;
                left_active = true;
            } else {
                debate.current_round += 1;
            }
        }
        auto_fix(&mut debate);

        if !db::update_debate_guarded(&tx, &debate, DebateStatus::Active)? {
            // A concurrent actor moved the debate between our read and write;
            // dropping the transaction rolls the argument back too.
            return Err(DebateError::NotYourTurn);
        }
        if left_active {
            db::clear_early_end(&tx, debate_id)?;
        }
        tx.commit()?;

        self.events.publish(DebateEvent::ArgumentAdded {
            debate_id: debate.id.clone(),
            round,
            stance,
            submitted_by,
        });
        Ok(debate)
    }

    /// Human-facing submission: append the argument, then let the AI
    /// opponent respond if the new turn is theirs.
    pub async fn submit_and_advance(
        &mut self,
        debate_id: &str,
        stance: Stance,
        text: &str,
    ) -> Result<Debate> {
        self.submit_argument(debate_id, stance, text, Submitter::Human)?;
        if let Err(e) = self.maybe_run_ai_turn(debate_id).await {
            warn!(debate_id, error = %e, "AI response failed after human submission");
        }
        self.get(debate_id)
    }

    /// Run the AI's turn if it owns the current `next_turn` and the debate
    /// is not paused. Returns whether an argument was appended.
    ///
    /// The turn may sit on the AI's stance while `ai_enabled` is false; the
    /// pause only suppresses generation, it does not alter turn state.
    pub async fn maybe_run_ai_turn(&mut self, debate_id: &str) -> Result<bool> {
        let debate = self.get(debate_id)?;
        let ai_stance = match debate.ai_stance() {
            Some(s) => s,
            None => return Ok(false),
        };
        if debate.status != DebateStatus::Active
            || debate.next_turn != Some(ai_stance)
            || !debate.ai_enabled
        {
            return Ok(false);
        }
        self.run_ai_turn(&debate, ai_stance).await?;
        Ok(true)
    }

    /// Admin override: generate the AI's argument now, subject to the same
    /// turn guard as every submission. Ignores the pause flag.
    pub async fn trigger_ai_response(&mut self, debate_id: &str) -> Result<Debate> {
        let debate = self.get(debate_id)?;
        let ai_stance = debate.ai_stance().ok_or(DebateError::NotYourTurn)?;
        if debate.status != DebateStatus::Active || debate.next_turn != Some(ai_stance) {
            return Err(DebateError::NotYourTurn);
        }
        self.run_ai_turn(&debate, ai_stance).await?;
        self.get(debate_id)
    }

    async fn run_ai_turn(&mut self, debate: &Debate, ai_stance: Stance) -> Result<()> {
        let ctx = GenerationContext {
            topic: debate.topic.clone(),
            stance: ai_stance,
            round: debate.current_round,
            max_rounds: debate.max_rounds,
            personality: debate
                .ai_personality
                .clone()
                .unwrap_or_else(|| self.config.default_personality.clone()),
            transcript: debate
                .arguments
                .iter()
                .map(|a| (a.stance, a.submitted_by, a.text.clone()))
                .collect(),
            opponent_certainty: debate.stance_certainty,
        };

        let text = match self.generator.generate(&ctx).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    debate_id = %debate.id,
                    round = debate.current_round,
                    error = %e,
                    "generator failed, using fallback argument"
                );
                match self.fallback.generate(&ctx).await {
                    Ok(text) => text,
                    // The templated fallback has no failure modes in
                    // practice; keep a last-resort line so the turn can
                    // always advance.
                    Err(_) => format!(
                        "The {} side stands by its position on {}.",
                        ai_stance.as_str(),
                        debate.topic
                    ),
                }
            }
        };
        let text = truncate_to_boundary(&text, MAX_ARGUMENT_CHARS);

        self.submit_argument(&debate.id, ai_stance, &text, Submitter::Ai)?;
        Ok(())
    }

    /// Cast one early-end vote. The vote lands through a field-targeted
    /// conditional write, so a concurrent vote or turn-state write can never
    /// undo it; a second statement fires the survey_pending transition iff
    /// both flags are set in the stored row. Voting twice is a no-op.
    pub fn vote_early_end(&mut self, debate_id: &str, user_id: &str) -> Result<Debate> {
        let debate = self.get(debate_id)?;
        let side = debate.side_of(user_id).ok_or(DebateError::NotAParticipant)?;
        if !debate.early_end_available() {
            return Err(DebateError::VoteNotAvailable);
        }

        let now = Utc::now();
        if !db::set_early_end_vote(&self.conn, debate_id, side, true, Some(now), now)? {
            // The debate left active between our read and the write
            return Err(DebateError::VoteNotAvailable);
        }
        if db::finish_early_end(&self.conn, debate_id, now)? {
            debug!(debate_id, "bilateral early-end vote, moving to surveys");
        }
        self.get(debate_id)
    }

    /// Withdraw an early-end vote. Only meaningful while the debate is still
    /// active; once both sides voted the transition has already fired.
    pub fn revoke_early_end_vote(&mut self, debate_id: &str, user_id: &str) -> Result<Debate> {
        let debate = self.get(debate_id)?;
        let side = debate.side_of(user_id).ok_or(DebateError::NotAParticipant)?;
        if debate.status != DebateStatus::Active {
            return Err(DebateError::VoteNotAvailable);
        }

        if !db::set_early_end_vote(&self.conn, debate_id, side, false, None, Utc::now())? {
            return Err(DebateError::VoteNotAvailable);
        }
        self.get(debate_id)
    }

    /// Record one side's post-survey; both sides done completes the debate.
    /// Same two-statement shape as the early-end vote: a field-targeted flag
    /// write, then a transition conditioned on both flags in the row.
    pub fn submit_post_survey(&mut self, debate_id: &str, user_id: &str) -> Result<Debate> {
        let debate = self.get(debate_id)?;
        let side = debate.side_of(user_id).ok_or(DebateError::NotAParticipant)?;
        if debate.status != DebateStatus::SurveyPending {
            return Err(DebateError::InvalidTransition {
                from: debate.status,
                to: DebateStatus::Completed,
            });
        }

        let now = Utc::now();
        if !db::set_survey_done(&self.conn, debate_id, side, now)? {
            return Err(DebateError::InvalidTransition {
                from: debate.status,
                to: DebateStatus::Completed,
            });
        }
        if db::finish_surveys(&self.conn, debate_id, now)? {
            self.events.publish(DebateEvent::DebateCompleted {
                debate_id: debate_id.to_string(),
                status: DebateStatus::Completed,
            });
        }
        self.get(debate_id)
    }

    /// Admin pause toggle for the AI opponent. A field-targeted write that
    /// touches no turn state and cannot lose a race to one.
    pub fn set_ai_enabled(&mut self, debate_id: &str, enabled: bool) -> Result<Debate> {
        if !db::set_ai_enabled(&self.conn, debate_id, enabled, Utc::now())? {
            return Err(DebateError::NotFound(debate_id.to_string()));
        }
        self.get(debate_id)
    }

    /// Delete a waiting debate. Only the player who created it may cancel,
    /// and only while it is still waiting.
    pub fn cancel_waiting(&mut self, debate_id: &str, user_id: &str) -> Result<()> {
        let debate = self.get(debate_id)?;
        if debate.status != DebateStatus::Waiting {
            return Err(DebateError::AlreadyMatched);
        }
        if debate.player1_user_id != user_id {
            return Err(DebateError::NotAParticipant);
        }
        if !db::delete_waiting(&self.conn, debate_id, user_id)? {
            return Err(DebateError::AlreadyMatched);
        }
        Ok(())
    }

    /// Waiting debates eligible for auto-matching, oldest first.
    pub fn match_candidates(&self, limit: usize) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(self.config.auto_match_after.as_secs() as i64);
        db::waiting_older_than(&self.conn, cutoff, limit)
    }
}
