//! rostrum - debate turn-state and lifecycle engine
//!
//! The core of a structured, turn-based debate platform: it keeps a
//! debate's turn order, round progression, AI-opponent triggering and
//! status transitions consistent while human submissions, AI responses,
//! admin actions and background sweeps race against each other.
//!
//! Correctness comes from two disciplines, applied everywhere:
//!
//! - **Conditional updates**: every cross-actor write is a compare-and-swap
//!   style UPDATE whose affected-row count decides who won. Zero rows is an
//!   expected race outcome, never an error.
//! - **One turn rule**: `validator::expected_next_turn` is the only place
//!   the next-speaker rule exists; an idempotent auto-fixer runs on every
//!   persist, so no writer can store drifted turn state.
//!
//! # Architecture
//!
//! ```text
//! transport layer (out of scope)
//!        │ state-transition calls            ┌─ MatchmakingScheduler ─┐
//!        ▼                                   │   interval tick, CAS   │
//! ┌──────────────────┐   conditional writes  └──────────┬─────────────┘
//! │   DebateEngine   │◄─────────────────────────────────┤
//! │  submit / vote / │        sqlite (debates,          │
//! │  assign / AI turn│         arguments)    ┌──────────┴─────────────┐
//! └────────┬─────────┘                       │    CleanupSweeper      │
//!          │ fire-and-forget                 │  bulk abandon sweeps   │
//!          ▼                                 └────────────────────────┘
//!   EventSink (realtime port)
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod generator;
pub mod lifecycle;
pub mod scheduler;
pub mod sweeper;
pub mod types;
pub mod validator;

// Core types
pub use engine::{DebateEngine, OpponentSpec};
pub use error::DebateError;
pub use types::*;

// Turn-state validation
pub use validator::{auto_fix, expected_next_turn, validate, TurnValidation};

// Configuration and ports
pub use config::{EngineConfig, GeneratorConfig};
pub use events::{DebateEvent, EventSink, NullSink, TracingSink};
pub use generator::{ArgumentGenerator, FallbackGenerator, GenerationContext, HttpGenerator};

// Background jobs
pub use scheduler::{MatchReport, MatchmakingScheduler};
pub use sweeper::{CleanupSweeper, SweepReport};

// Persistence entry point
pub use db::init_db;
