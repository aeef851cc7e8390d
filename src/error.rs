//! Error taxonomy for the debate engine
//!
//! Guard rejections (`NotYourTurn`, `RoundClosed`, `AlreadyMatched`) are
//! expected concurrent outcomes the transport layer matches on, so they are
//! typed variants rather than opaque anyhow chains. Storage failures are the
//! one class that propagates as fatal to the triggering request.

use thiserror::Error;

use crate::types::DebateStatus;

#[derive(Debug, Error)]
pub enum DebateError {
    #[error("not your turn")]
    NotYourTurn,

    #[error("round {0} is closed")]
    RoundClosed(u32),

    #[error("argument is {len} characters, maximum is {max}")]
    ArgumentTooLong { len: usize, max: usize },

    #[error("debate already has an opponent")]
    AlreadyMatched,

    #[error("debate {0} not found")]
    NotFound(String),

    #[error("user is not a participant in this debate")]
    NotAParticipant,

    #[error("early-end voting requires an active debate at round 5 or later")]
    VoteNotAvailable,

    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: DebateStatus,
        to: DebateStatus,
    },

    #[error("max_rounds {0} out of range 1-30")]
    InvalidMaxRounds(u32),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DebateError>;
