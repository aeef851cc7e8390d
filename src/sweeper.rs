//! Cleanup sweeper
//!
//! Fixed-interval sweep abandoning debates nobody is coming back to:
//! waiting debates past the opponent timeout and active debates idle past
//! the 24h threshold. Pure bulk conditional updates, idempotent by
//! construction; a summary event is emitted only when something changed.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db;
use crate::error::Result;
use crate::events::{DebateEvent, EventSink};

/// What one cleanup pass did.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub abandoned_waiting: usize,
    pub abandoned_active: usize,
}

impl SweepReport {
    pub fn has_actions(&self) -> bool {
        self.abandoned_waiting > 0 || self.abandoned_active > 0
    }
}

pub struct CleanupSweeper {
    conn: Connection,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
}

impl CleanupSweeper {
    pub fn new(conn: Connection, config: EngineConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            conn,
            config,
            events,
        }
    }

    /// One cleanup pass over the whole table.
    pub fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let waiting_cutoff =
            now - chrono::Duration::seconds(self.config.waiting_timeout.as_secs() as i64);
        let idle_cutoff =
            now - chrono::Duration::seconds(self.config.idle_timeout.as_secs() as i64);

        let report = SweepReport {
            abandoned_waiting: db::abandon_stale_waiting(&self.conn, waiting_cutoff)?,
            abandoned_active: db::abandon_idle_active(&self.conn, idle_cutoff, now)?,
        };

        if report.has_actions() {
            info!(
                abandoned_waiting = report.abandoned_waiting,
                abandoned_active = report.abandoned_active,
                "cleanup sweep"
            );
            self.events.publish(DebateEvent::CleanupSummary {
                abandoned_waiting: report.abandoned_waiting,
                abandoned_active: report.abandoned_active,
            });
        }
        Ok(report)
    }

    /// Fixed-interval loop. Runs until the task is dropped.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep() {
                warn!(error = %e, "cleanup sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingSink;
    use crate::types::{Debate, DebateStatus, MaxRounds, PlayerType, Stance};
    use chrono::Duration;
    use tempfile::tempdir;

    fn setup() -> (CleanupSweeper, Arc<RecordingSink>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let conn = db::init_db(&dir.path().join("test.db")).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let sweeper = CleanupSweeper::new(conn, EngineConfig::default(), sink.clone());
        (sweeper, sink, dir)
    }

    fn insert_waiting(sweeper: &CleanupSweeper, user: &str) -> String {
        let d = Debate::new_waiting(user, "t", Stance::For, MaxRounds::default(), None);
        db::insert_debate(&sweeper.conn, &d).unwrap();
        d.id
    }

    #[test]
    fn test_sweep_abandons_stale_and_idle() {
        let (sweeper, sink, _dir) = setup();
        let now = Utc::now();

        let stale_waiting = insert_waiting(&sweeper, "u1");
        db::backdate(&sweeper.conn, &stale_waiting, Some(now - Duration::minutes(6)), None)
            .unwrap();

        let idle_active = insert_waiting(&sweeper, "u2");
        db::claim_opponent(&sweeper.conn, &idle_active, None, PlayerType::Ai, None,
            Stance::For, now).unwrap();
        db::backdate(&sweeper.conn, &idle_active, None, Some(now - Duration::hours(25)))
            .unwrap();

        let fresh = insert_waiting(&sweeper, "u3");

        let report = sweeper.sweep().unwrap();
        assert_eq!(report.abandoned_waiting, 1);
        assert_eq!(report.abandoned_active, 1);

        let d = db::get_debate(&sweeper.conn, &stale_waiting).unwrap().unwrap();
        assert_eq!(d.status, DebateStatus::Abandoned);
        assert!(d.next_turn.is_none());

        let d = db::get_debate(&sweeper.conn, &idle_active).unwrap().unwrap();
        assert_eq!(d.status, DebateStatus::Abandoned);
        assert!(d.completed_at.is_some());

        let d = db::get_debate(&sweeper.conn, &fresh).unwrap().unwrap();
        assert_eq!(d.status, DebateStatus::Waiting);

        let events = sink.events.lock().unwrap();
        assert!(matches!(
            events[0],
            DebateEvent::CleanupSummary { abandoned_waiting: 1, abandoned_active: 1 }
        ));
    }

    #[test]
    fn test_quiet_sweep_emits_nothing() {
        let (sweeper, sink, _dir) = setup();
        insert_waiting(&sweeper, "u1");

        let report = sweeper.sweep().unwrap();
        assert!(!report.has_actions());
        assert!(sink.events.lock().unwrap().is_empty());

        // Running again right away changes nothing
        let report = sweeper.sweep().unwrap();
        assert!(!report.has_actions());
    }
}
