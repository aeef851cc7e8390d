//! TurnState validator and auto-fixer
//!
//! The single source of truth for turn logic. Every writer computes
//! `next_turn` through [`expected_next_turn`]; nothing else in the crate is
//! allowed its own copy of the rule. [`auto_fix`] runs as a pre-persist hook
//! on every turn-state write, so drift introduced by any mutator is repaired
//! before it reaches storage.
//!
//! The law, for a debate in active or completed status, with `n` = count of
//! arguments in the current round:
//!   n == 0  =>  next_turn == first_player
//!   n == 1  =>  next_turn == opposite of that argument's stance
//!   n == 2  =>  next_turn is unset (round closed)
//!   n >  2  is never valid.
//! For waiting and abandoned debates next_turn must be unset.

use tracing::warn;

use crate::types::{Debate, DebateStatus, Stance};

/// Result of a read-only invariant check. One entry per violated clause so
/// logs and automated repair can pinpoint the discrepancy.
#[derive(Debug, Clone)]
pub struct TurnValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl TurnValidation {
    fn ok() -> TurnValidation {
        TurnValidation {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn invalid(errors: Vec<String>) -> TurnValidation {
        TurnValidation {
            is_valid: false,
            errors,
        }
    }
}

/// Recompute the correct `next_turn` from status, first player, and the
/// round-scoped argument count. Pure and deterministic.
pub fn expected_next_turn(debate: &Debate) -> Option<Stance> {
    match debate.status {
        DebateStatus::Waiting | DebateStatus::Abandoned | DebateStatus::SurveyPending => None,
        DebateStatus::Active | DebateStatus::Completed => {
            let first = debate.first_player?;
            let in_round = debate.arguments_in_round(debate.current_round);
            match in_round.len() {
                0 => Some(first),
                1 => Some(in_round[0].stance.opposite()),
                _ => None,
            }
        }
    }
}

/// Check the turn-state law against the debate's current fields.
/// Read-only and non-throwing.
pub fn validate(debate: &Debate) -> TurnValidation {
    let mut errors = Vec::new();

    // Argument-count invariant holds for every round, not just the current one
    let mut rounds: Vec<u32> = debate.arguments.iter().map(|a| a.round).collect();
    rounds.sort_unstable();
    rounds.dedup();
    for round in rounds {
        let count = debate.arguments_in_round(round).len();
        if count > 2 {
            errors.push(format!(
                "round {} holds {} arguments, a round never exceeds 2",
                round, count
            ));
        }
    }

    match debate.status {
        DebateStatus::Waiting | DebateStatus::Abandoned | DebateStatus::SurveyPending => {
            if let Some(turn) = debate.next_turn {
                errors.push(format!(
                    "status {} requires next_turn unset, found '{}'",
                    debate.status.as_str(),
                    turn.as_str()
                ));
            }
        }
        DebateStatus::Active | DebateStatus::Completed => {
            match debate.first_player {
                None => errors.push(format!(
                    "status {} requires first_player, found none",
                    debate.status.as_str()
                )),
                Some(first) => {
                    let in_round = debate.arguments_in_round(debate.current_round);
                    match in_round.len() {
                        0 => {
                            if debate.next_turn != Some(first) {
                                errors.push(format!(
                                    "round {} has no arguments: next_turn must be first_player \
                                     '{}', found {:?}",
                                    debate.current_round,
                                    first.as_str(),
                                    debate.next_turn.map(|s| s.as_str())
                                ));
                            }
                        }
                        1 => {
                            let want = in_round[0].stance.opposite();
                            if debate.next_turn != Some(want) {
                                errors.push(format!(
                                    "round {} has one '{}' argument: next_turn must be '{}', \
                                     found {:?}",
                                    debate.current_round,
                                    in_round[0].stance.as_str(),
                                    want.as_str(),
                                    debate.next_turn.map(|s| s.as_str())
                                ));
                            }
                        }
                        2 => {
                            if debate.next_turn.is_some() {
                                errors.push(format!(
                                    "round {} is closed (2 arguments): next_turn must be unset, \
                                     found {:?}",
                                    debate.current_round,
                                    debate.next_turn.map(|s| s.as_str())
                                ));
                            }
                        }
                        // already reported by the per-round count check above
                        _ => {}
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        TurnValidation::ok()
    } else {
        TurnValidation::invalid(errors)
    }
}

/// Repair `next_turn` drift in place. Returns true when a correction was
/// made. Idempotent: a second call right after performs no further change.
pub fn auto_fix(debate: &mut Debate) -> bool {
    let expected = expected_next_turn(debate);
    if debate.next_turn == expected {
        return false;
    }
    warn!(
        debate_id = %debate.id,
        status = debate.status.as_str(),
        round = debate.current_round,
        before = ?debate.next_turn.map(|s| s.as_str()),
        after = ?expected.map(|s| s.as_str()),
        "turn state drift repaired"
    );
    debate.next_turn = expected;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Argument, Debate, MaxRounds, PlayerType, Submitter};
    use chrono::Utc;

    fn active_debate(first: Stance) -> Debate {
        let mut d = Debate::new_waiting("u1", "topic", Stance::For, MaxRounds::default(), None);
        d.status = DebateStatus::Active;
        d.player2_type = Some(PlayerType::Ai);
        d.first_player = Some(first);
        d.next_turn = Some(first);
        d
    }

    fn arg(stance: Stance, round: u32) -> Argument {
        Argument {
            stance,
            text: "because reasons".to_string(),
            round,
            submitted_by: Submitter::Human,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_next_turn_law() {
        let mut d = active_debate(Stance::For);

        // n == 0: first player speaks
        assert_eq!(expected_next_turn(&d), Some(Stance::For));

        // n == 1: opposite of the argument already in
        d.arguments.push(arg(Stance::For, 1));
        assert_eq!(expected_next_turn(&d), Some(Stance::Against));

        // n == 2: round closed
        d.arguments.push(arg(Stance::Against, 1));
        assert_eq!(expected_next_turn(&d), None);

        // Next round reopens with the first player
        d.current_round = 2;
        assert_eq!(expected_next_turn(&d), Some(Stance::For));
    }

    #[test]
    fn test_expected_next_turn_non_active_statuses() {
        let mut d = active_debate(Stance::Against);
        for status in [
            DebateStatus::Waiting,
            DebateStatus::Abandoned,
            DebateStatus::SurveyPending,
        ] {
            d.status = status;
            assert_eq!(expected_next_turn(&d), None, "status {:?}", status);
        }

        // Completed debates still obey the law
        d.status = DebateStatus::Completed;
        assert_eq!(expected_next_turn(&d), Some(Stance::Against));
    }

    #[test]
    fn test_validate_clean_debate() {
        let d = active_debate(Stance::For);
        let v = validate(&d);
        assert!(v.is_valid);
        assert!(v.errors.is_empty());
    }

    #[test]
    fn test_validate_reports_each_clause() {
        // Wrong turn with an empty round
        let mut d = active_debate(Stance::For);
        d.next_turn = Some(Stance::Against);
        let v = validate(&d);
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("no arguments"));

        // Wrong turn with one argument in
        d.next_turn = Some(Stance::For);
        d.arguments.push(arg(Stance::For, 1));
        let v = validate(&d);
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("one 'for' argument"));

        // Turn set on a closed round
        d.arguments.push(arg(Stance::Against, 1));
        d.next_turn = Some(Stance::For);
        let v = validate(&d);
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("closed"));

        // next_turn set on a waiting debate
        let mut w = Debate::new_waiting("u1", "t", Stance::For, MaxRounds::default(), None);
        w.next_turn = Some(Stance::For);
        let v = validate(&w);
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("next_turn unset"));
    }

    #[test]
    fn test_validate_overfull_round() {
        let mut d = active_debate(Stance::For);
        d.arguments.push(arg(Stance::For, 1));
        d.arguments.push(arg(Stance::Against, 1));
        d.arguments.push(arg(Stance::For, 1));
        d.next_turn = None;
        let v = validate(&d);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("never exceeds 2")));
    }

    #[test]
    fn test_validate_active_without_first_player() {
        let mut d = active_debate(Stance::For);
        d.first_player = None;
        d.next_turn = None;
        let v = validate(&d);
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("requires first_player"));
    }

    #[test]
    fn test_auto_fix_is_idempotent() {
        let mut d = active_debate(Stance::For);
        d.arguments.push(arg(Stance::For, 1));
        // Drift: a writer forgot to advance the turn
        d.next_turn = Some(Stance::For);

        assert!(auto_fix(&mut d));
        assert_eq!(d.next_turn, Some(Stance::Against));
        assert!(validate(&d).is_valid);

        // Second call performs no further write
        assert!(!auto_fix(&mut d));
        assert_eq!(d.next_turn, Some(Stance::Against));
    }
}
