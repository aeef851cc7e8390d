//! Core types for the debate turn-state engine
//!
//! Enum and range constraints live in constructors here, not in the storage
//! schema: a `Debate` that exists in memory is already structurally valid,
//! and the validator only has to check the turn-state law on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;

/// Hard ceiling on argument text length, in characters.
pub const MAX_ARGUMENT_CHARS: usize = 500;

/// Round at which early-end voting opens.
pub const EARLY_END_MIN_ROUND: u32 = 5;

/// A debate side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    For,
    Against,
}

impl Stance {
    pub fn opposite(&self) -> Stance {
        match self {
            Stance::For => Stance::Against,
            Stance::Against => Stance::For,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::For => "for",
            Stance::Against => "against",
        }
    }

    pub fn parse(s: &str) -> Option<Stance> {
        match s {
            "for" => Some(Stance::For),
            "against" => Some(Stance::Against),
            _ => None,
        }
    }
}

/// Debate lifecycle status. Progression is forward-only; see `lifecycle`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Waiting,
    Active,
    SurveyPending,
    Completed,
    Abandoned,
}

impl DebateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStatus::Waiting => "waiting",
            DebateStatus::Active => "active",
            DebateStatus::SurveyPending => "survey_pending",
            DebateStatus::Completed => "completed",
            DebateStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<DebateStatus> {
        match s {
            "waiting" => Some(DebateStatus::Waiting),
            "active" => Some(DebateStatus::Active),
            "survey_pending" => Some(DebateStatus::SurveyPending),
            "completed" => Some(DebateStatus::Completed),
            "abandoned" => Some(DebateStatus::Abandoned),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DebateStatus::Completed | DebateStatus::Abandoned)
    }
}

/// Kind of opponent occupying the player-2 slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    Human,
    Ai,
}

impl PlayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerType::Human => "human",
            PlayerType::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<PlayerType> {
        match s {
            "human" => Some(PlayerType::Human),
            "ai" => Some(PlayerType::Ai),
            _ => None,
        }
    }
}

/// Who authored an argument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Submitter {
    Human,
    Ai,
}

impl Submitter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Submitter::Human => "human",
            Submitter::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Submitter> {
        match s {
            "human" => Some(Submitter::Human),
            "ai" => Some(Submitter::Ai),
            _ => None,
        }
    }
}

/// Which seat a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Player1,
    Player2,
}

/// How certain the human said they were about their stance in the pre-survey.
/// "Unsure" nudges the AI generator toward a more exploratory register.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StanceCertainty {
    Certain,
    Unsure,
}

impl StanceCertainty {
    pub fn as_str(&self) -> &'static str {
        match self {
            StanceCertainty::Certain => "certain",
            StanceCertainty::Unsure => "unsure",
        }
    }

    pub fn parse(s: &str) -> Option<StanceCertainty> {
        match s {
            "certain" => Some(StanceCertainty::Certain),
            "unsure" => Some(StanceCertainty::Unsure),
            _ => None,
        }
    }
}

/// Argument text validated against the hard character ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentText(String);

impl ArgumentText {
    /// Accepts text up to [`MAX_ARGUMENT_CHARS`] characters, rejects the rest.
    pub fn new(text: &str) -> Result<ArgumentText, DebateError> {
        let trimmed = text.trim();
        let len = trimmed.chars().count();
        if len > MAX_ARGUMENT_CHARS {
            return Err(DebateError::ArgumentTooLong {
                len,
                max: MAX_ARGUMENT_CHARS,
            });
        }
        Ok(ArgumentText(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Admin-configured round cap, 1 to 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxRounds(u32);

impl MaxRounds {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 30;

    pub fn new(rounds: u32) -> Result<MaxRounds, DebateError> {
        if !(Self::MIN..=Self::MAX).contains(&rounds) {
            return Err(DebateError::InvalidMaxRounds(rounds));
        }
        Ok(MaxRounds(rounds))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for MaxRounds {
    fn default() -> Self {
        MaxRounds(10)
    }
}

/// One appended argument. The sequence on a debate is append-only and a
/// round never holds more than one entry per stance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub stance: Stance,
    pub text: String,
    pub round: u32,
    pub submitted_by: Submitter,
    pub created_at: DateTime<Utc>,
}

/// Bilateral early-end consent flags. Reset whenever the debate leaves the
/// active status; never carried past completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarlyEndVotes {
    pub player1_voted: bool,
    pub player1_voted_at: Option<DateTime<Utc>>,
    pub player2_voted: bool,
    pub player2_voted_at: Option<DateTime<Utc>>,
}

impl EarlyEndVotes {
    pub fn both(&self) -> bool {
        self.player1_voted && self.player2_voted
    }

    pub fn clear(&mut self) {
        *self = EarlyEndVotes::default();
    }

    pub fn set(&mut self, side: Side, at: DateTime<Utc>) {
        match side {
            Side::Player1 => {
                self.player1_voted = true;
                self.player1_voted_at = Some(at);
            }
            Side::Player2 => {
                self.player2_voted = true;
                self.player2_voted_at = Some(at);
            }
        }
    }

    pub fn unset(&mut self, side: Side) {
        match side {
            Side::Player1 => {
                self.player1_voted = false;
                self.player1_voted_at = None;
            }
            Side::Player2 => {
                self.player2_voted = false;
                self.player2_voted_at = None;
            }
        }
    }

    pub fn voted(&self, side: Side) -> bool {
        match side {
            Side::Player1 => self.player1_voted,
            Side::Player2 => self.player2_voted,
        }
    }
}

/// The sole aggregate root of this engine.
///
/// `next_turn` is a derived value: the validator recomputes it from
/// `(status, first_player, current_round, arguments)` on every turn-state
/// persist, so no writer ever sets it independently of the argument history.
#[derive(Debug, Clone)]
pub struct Debate {
    pub id: String,
    pub topic: String,
    pub status: DebateStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    /// Set exactly once, at activation. Immutable thereafter.
    pub first_player: Option<Stance>,
    pub next_turn: Option<Stance>,
    pub player1_user_id: String,
    pub player1_stance: Stance,
    pub player2_user_id: Option<String>,
    /// None until an opponent claims the slot, then human or ai, exactly once.
    pub player2_type: Option<PlayerType>,
    pub ai_enabled: bool,
    pub ai_personality: Option<String>,
    pub stance_certainty: Option<StanceCertainty>,
    pub arguments: Vec<Argument>,
    pub early_end: EarlyEndVotes,
    pub player1_survey_done: bool,
    pub player2_survey_done: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Debate {
    /// Fresh waiting-pool entry for a player who just joined.
    pub fn new_waiting(
        user_id: &str,
        topic: &str,
        stance: Stance,
        max_rounds: MaxRounds,
        certainty: Option<StanceCertainty>,
    ) -> Debate {
        let now = Utc::now();
        Debate {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            status: DebateStatus::Waiting,
            current_round: 1,
            max_rounds: max_rounds.get(),
            first_player: None,
            next_turn: None,
            player1_user_id: user_id.to_string(),
            player1_stance: stance,
            player2_user_id: None,
            player2_type: None,
            ai_enabled: true,
            ai_personality: None,
            stance_certainty: certainty,
            arguments: Vec::new(),
            early_end: EarlyEndVotes::default(),
            player1_survey_done: false,
            player2_survey_done: false,
            created_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    pub fn player2_stance(&self) -> Stance {
        self.player1_stance.opposite()
    }

    /// Stance held by the AI opponent, if one occupies the player-2 slot.
    pub fn ai_stance(&self) -> Option<Stance> {
        match self.player2_type {
            Some(PlayerType::Ai) => Some(self.player2_stance()),
            _ => None,
        }
    }

    pub fn arguments_in_round(&self, round: u32) -> Vec<&Argument> {
        self.arguments.iter().filter(|a| a.round == round).collect()
    }

    pub fn current_round_count(&self) -> usize {
        self.arguments
            .iter()
            .filter(|a| a.round == self.current_round)
            .count()
    }

    /// Resolve which seat a user occupies, if any.
    pub fn side_of(&self, user_id: &str) -> Option<Side> {
        if self.player1_user_id == user_id {
            return Some(Side::Player1);
        }
        if self.player2_user_id.as_deref() == Some(user_id) {
            return Some(Side::Player2);
        }
        None
    }

    pub fn stance_of(&self, side: Side) -> Stance {
        match side {
            Side::Player1 => self.player1_stance,
            Side::Player2 => self.player2_stance(),
        }
    }

    /// Early-end voting window: active debate at round 5 or later.
    pub fn early_end_available(&self) -> bool {
        self.status == DebateStatus::Active && self.current_round >= EARLY_END_MIN_ROUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stance_opposite() {
        assert_eq!(Stance::For.opposite(), Stance::Against);
        assert_eq!(Stance::Against.opposite(), Stance::For);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for s in ["waiting", "active", "survey_pending", "completed", "abandoned"] {
            let status = DebateStatus::parse(s).unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!(DebateStatus::parse("closed").is_none());
    }

    #[test]
    fn test_argument_text_limit() {
        let ok = ArgumentText::new("short and sweet").unwrap();
        assert_eq!(ok.as_str(), "short and sweet");

        let long = "x".repeat(MAX_ARGUMENT_CHARS + 1);
        match ArgumentText::new(&long) {
            Err(DebateError::ArgumentTooLong { len, max }) => {
                assert_eq!(len, MAX_ARGUMENT_CHARS + 1);
                assert_eq!(max, MAX_ARGUMENT_CHARS);
            }
            other => panic!("expected ArgumentTooLong, got {:?}", other),
        }

        // Exactly at the limit is fine
        let exact = "y".repeat(MAX_ARGUMENT_CHARS);
        assert!(ArgumentText::new(&exact).is_ok());
    }

    #[test]
    fn test_max_rounds_range() {
        assert!(MaxRounds::new(0).is_err());
        assert!(MaxRounds::new(31).is_err());
        assert_eq!(MaxRounds::new(1).unwrap().get(), 1);
        assert_eq!(MaxRounds::new(30).unwrap().get(), 30);
        assert_eq!(MaxRounds::default().get(), 10);
    }

    #[test]
    fn test_new_waiting_shape() {
        let d = Debate::new_waiting("u1", "topic", Stance::For, MaxRounds::default(), None);
        assert_eq!(d.status, DebateStatus::Waiting);
        assert_eq!(d.current_round, 1);
        assert!(d.next_turn.is_none());
        assert!(d.first_player.is_none());
        assert!(d.player2_type.is_none());
        assert!(d.ai_enabled);
        assert_eq!(d.player2_stance(), Stance::Against);
    }

    #[test]
    fn test_side_resolution() {
        let mut d = Debate::new_waiting("u1", "t", Stance::For, MaxRounds::default(), None);
        d.player2_user_id = Some("u2".to_string());
        assert_eq!(d.side_of("u1"), Some(Side::Player1));
        assert_eq!(d.side_of("u2"), Some(Side::Player2));
        assert_eq!(d.side_of("stranger"), None);
        assert_eq!(d.stance_of(Side::Player2), Stance::Against);
    }

    #[test]
    fn test_early_end_votes() {
        let mut votes = EarlyEndVotes::default();
        assert!(!votes.both());
        votes.set(Side::Player1, Utc::now());
        assert!(votes.voted(Side::Player1));
        assert!(!votes.both());
        votes.set(Side::Player2, Utc::now());
        assert!(votes.both());
        votes.unset(Side::Player1);
        assert!(!votes.both());
        votes.clear();
        assert_eq!(votes, EarlyEndVotes::default());
    }
}
