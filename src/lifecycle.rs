//! Debate lifecycle state machine
//!
//! waiting -> active -> survey_pending -> completed
//!                 \-> abandoned (sweeper), waiting -> abandoned (sweeper)
//!
//! Statuses only move forward; nothing reopens a debate that left
//! active or waiting.

use chrono::Utc;

use crate::error::DebateError;
use crate::types::{Debate, DebateStatus};

/// The transition table. Everything not listed is invalid.
pub fn can_transition(from: DebateStatus, to: DebateStatus) -> bool {
    use DebateStatus::*;
    matches!(
        (from, to),
        (Waiting, Active)
            | (Waiting, Abandoned)
            | (Active, SurveyPending)
            | (Active, Abandoned)
            | (SurveyPending, Completed)
    )
}

/// Apply a status transition, enforcing the table and the bookkeeping that
/// rides along: early-end votes never survive leaving active, and terminal
/// statuses stamp `completed_at`.
pub fn transition(debate: &mut Debate, to: DebateStatus) -> Result<(), DebateError> {
    let from = debate.status;
    if !can_transition(from, to) {
        return Err(DebateError::InvalidTransition { from, to });
    }

    if from == DebateStatus::Active {
        debate.early_end.clear();
    }
    if matches!(to, DebateStatus::Completed | DebateStatus::Abandoned) {
        debate.completed_at = Some(Utc::now());
    }

    debate.status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MaxRounds, Side, Stance};
    use chrono::Utc;

    #[test]
    fn test_transition_table() {
        use DebateStatus::*;
        let valid = [
            (Waiting, Active),
            (Waiting, Abandoned),
            (Active, SurveyPending),
            (Active, Abandoned),
            (SurveyPending, Completed),
        ];
        let all = [Waiting, Active, SurveyPending, Completed, Abandoned];
        for from in all {
            for to in all {
                let expected = valid.contains(&(from, to));
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_no_reopening() {
        use DebateStatus::*;
        // Closed-style statuses are terminal with respect to active/waiting
        for terminal in [Completed, Abandoned, SurveyPending] {
            assert!(!can_transition(terminal, Active));
            assert!(!can_transition(terminal, Waiting));
        }
        // And there is no active -> waiting path
        assert!(!can_transition(Active, Waiting));
    }

    #[test]
    fn test_transition_clears_votes_and_stamps_completion() {
        let mut d =
            crate::types::Debate::new_waiting("u1", "t", Stance::For, MaxRounds::default(), None);
        d.status = DebateStatus::Active;
        d.early_end.set(Side::Player1, Utc::now());

        transition(&mut d, DebateStatus::SurveyPending).unwrap();
        assert_eq!(d.status, DebateStatus::SurveyPending);
        assert!(!d.early_end.player1_voted);
        assert!(d.completed_at.is_none());

        transition(&mut d, DebateStatus::Completed).unwrap();
        assert!(d.completed_at.is_some());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut d =
            crate::types::Debate::new_waiting("u1", "t", Stance::For, MaxRounds::default(), None);
        match transition(&mut d, DebateStatus::Completed) {
            Err(DebateError::InvalidTransition { from, to }) => {
                assert_eq!(from, DebateStatus::Waiting);
                assert_eq!(to, DebateStatus::Completed);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        assert_eq!(d.status, DebateStatus::Waiting);
    }
}
