//! Matchmaking scheduler
//!
//! Periodic sweep assigning AI opponents to debates that waited past the
//! auto-match threshold. Each candidate is claimed with a single conditional
//! update, so overlapping ticks (or a tick racing a human join) resolve to
//! exactly one winner per debate. Losing the race is an expected outcome and
//! is skipped silently.

use tracing::{debug, info, warn};

use crate::engine::{DebateEngine, OpponentSpec};
use crate::error::{DebateError, Result};

/// What one scheduler tick did.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub examined: usize,
    pub matched: usize,
    pub race_lost: usize,
}

impl MatchReport {
    pub fn has_actions(&self) -> bool {
        self.matched > 0
    }
}

pub struct MatchmakingScheduler {
    engine: DebateEngine,
}

impl MatchmakingScheduler {
    pub fn new(engine: DebateEngine) -> Self {
        Self { engine }
    }

    /// One matchmaking pass: oldest eligible debates first, bounded batch.
    ///
    /// A failed AI opening argument never blocks the match; the debate stays
    /// active and the human can act.
    pub async fn tick(&mut self) -> Result<MatchReport> {
        let batch = self.engine.config().match_batch_size;
        let candidates = self.engine.match_candidates(batch)?;

        let mut report = MatchReport {
            examined: candidates.len(),
            ..MatchReport::default()
        };

        for debate_id in candidates {
            let personality = self.engine.config().default_personality.clone();
            let spec = OpponentSpec::ai(&personality);
            match self.engine.assign_and_open(&debate_id, &spec).await {
                Ok(_) => {
                    info!(debate_id = %debate_id, "AI opponent auto-matched");
                    report.matched += 1;
                }
                Err(DebateError::AlreadyMatched) => {
                    debug!(debate_id = %debate_id, "lost matchmaking race, skipping");
                    report.race_lost += 1;
                }
                Err(e) => {
                    warn!(debate_id = %debate_id, error = %e, "auto-match failed");
                }
            }
        }

        Ok(report)
    }

    /// Fixed-interval loop. Runs until the task is dropped.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.engine.config().match_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(report) if report.has_actions() => {
                    info!(
                        examined = report.examined,
                        matched = report.matched,
                        race_lost = report.race_lost,
                        "matchmaking tick"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "matchmaking tick failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db;
    use crate::events::NullSink;
    use crate::generator::FallbackGenerator;
    use crate::types::{DebateStatus, MaxRounds, PlayerType, Stance};
    use chrono::{Duration, Utc};
    use rusqlite::Connection;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn engine_at(path: &Path) -> DebateEngine {
        let conn = db::init_db(path).unwrap();
        DebateEngine::new(
            conn,
            EngineConfig::default(),
            Arc::new(NullSink),
            Arc::new(FallbackGenerator),
        )
    }

    #[tokio::test]
    async fn test_young_debate_not_matched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut scheduler = MatchmakingScheduler::new(engine_at(&path));

        let id = scheduler
            .engine
            .join_waiting_pool("u1", "t", Stance::For, MaxRounds::default(), None)
            .unwrap();

        // Created just now, threshold is 60s
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(report.matched, 0);
        assert_eq!(
            scheduler.engine.get(&id).unwrap().status,
            DebateStatus::Waiting
        );
    }

    #[tokio::test]
    async fn test_old_debate_matched_once_across_ticks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut scheduler = MatchmakingScheduler::new(engine_at(&path));

        let id = scheduler
            .engine
            .join_waiting_pool("u1", "t", Stance::For, MaxRounds::default(), None)
            .unwrap();

        // Backdate past the 60s threshold through a second connection,
        // the way a second process would see the same database
        let side_conn = Connection::open(&path).unwrap();
        db::backdate(&side_conn, &id, Some(Utc::now() - Duration::seconds(65)), None).unwrap();

        // Two scheduler instances over the same database
        let mut other = MatchmakingScheduler::new(engine_at(&path));
        let first = scheduler.tick().await.unwrap();
        let second = other.tick().await.unwrap();
        assert_eq!(first.matched + second.matched, 1);

        let debate = scheduler.engine.get(&id).unwrap();
        assert_eq!(debate.status, DebateStatus::Active);
        assert_eq!(debate.player2_type, Some(PlayerType::Ai));
        assert!(debate.first_player.is_some());
        // AI opening argument appended when the coin flip gave it first turn
        if debate.first_player == Some(debate.player2_stance()) {
            assert_eq!(debate.arguments.len(), 1);
        } else {
            assert!(debate.arguments.is_empty());
        }

        // Subsequent ticks have nothing to do
        let third = scheduler.tick().await.unwrap();
        assert_eq!(third.examined, 0);
    }
}
