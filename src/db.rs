//! SQLite persistence for debate aggregates
//!
//! Single file, zero network dependencies. All cross-actor coordination is
//! expressed as conditional updates here: every guarded statement returns its
//! affected-row count and a zero means the caller lost a race, not an error.
//!
//! Columns are partitioned by writer. Turn state (status, round, next_turn)
//! flows through [`update_debate_guarded`]; opponent columns only through
//! [`claim_opponent`]; vote, survey and pause flags each have their own
//! field-targeted statement. No statement rewrites a column it does not own,
//! so concurrent writers touching different fields never clobber each other.
//!
//! The UNIQUE(debate_id, round, stance) index on `arguments` is the storage
//! backstop for the at-most-two-arguments-per-round invariant.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{DebateError, Result};
use crate::types::{
    Argument, Debate, DebateStatus, EarlyEndVotes, PlayerType, Side, Stance, StanceCertainty,
    Submitter,
};

/// Initialize the database with schema
pub fn init_db(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    conn.execute_batch(SCHEMA)?;

    Ok(conn)
}

const SCHEMA: &str = r#"
-- Debates: the sole aggregate root
CREATE TABLE IF NOT EXISTS debates (
    id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'waiting',
    current_round INTEGER NOT NULL DEFAULT 1,
    max_rounds INTEGER NOT NULL DEFAULT 10,
    first_player TEXT,              -- set once at activation
    next_turn TEXT,                 -- derived, recomputed on every persist
    player1_user_id TEXT NOT NULL,
    player1_stance TEXT NOT NULL,
    player2_user_id TEXT,
    player2_type TEXT,              -- NULL until claimed, then 'human' | 'ai'
    ai_enabled INTEGER NOT NULL DEFAULT 1,
    ai_personality TEXT,
    stance_certainty TEXT,
    p1_early_end INTEGER NOT NULL DEFAULT 0,
    p1_early_end_at TEXT,
    p2_early_end INTEGER NOT NULL DEFAULT 0,
    p2_early_end_at TEXT,
    p1_survey_done INTEGER NOT NULL DEFAULT 0,
    p2_survey_done INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_activity_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_debates_status ON debates(status);
CREATE INDEX IF NOT EXISTS idx_debates_waiting ON debates(status, created_at);
CREATE INDEX IF NOT EXISTS idx_debates_activity ON debates(status, last_activity_at);

-- Arguments: append-only; one entry per stance per round
CREATE TABLE IF NOT EXISTS arguments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    debate_id TEXT NOT NULL REFERENCES debates(id),
    round INTEGER NOT NULL,
    stance TEXT NOT NULL,
    submitted_by TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(debate_id, round, stance)
);

CREATE INDEX IF NOT EXISTS idx_arguments_debate ON arguments(debate_id, round);
"#;

/// Fixed-width UTC timestamp so TEXT comparison in WHERE clauses matches
/// chronological order.
pub fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| col_err(idx, format!("bad timestamp {:?}: {}", s, e)))
}

fn col_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

/// Insert a freshly created debate.
pub fn insert_debate(conn: &Connection, d: &Debate) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO debates (id, topic, status, current_round, max_rounds,
                             first_player, next_turn,
                             player1_user_id, player1_stance,
                             player2_user_id, player2_type,
                             ai_enabled, ai_personality, stance_certainty,
                             p1_early_end, p1_early_end_at, p2_early_end, p2_early_end_at,
                             p1_survey_done, p2_survey_done,
                             created_at, last_activity_at, completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
        "#,
        params![
            d.id,
            d.topic,
            d.status.as_str(),
            d.current_round,
            d.max_rounds,
            d.first_player.map(|s| s.as_str()),
            d.next_turn.map(|s| s.as_str()),
            d.player1_user_id,
            d.player1_stance.as_str(),
            d.player2_user_id,
            d.player2_type.map(|t| t.as_str()),
            d.ai_enabled as i32,
            d.ai_personality,
            d.stance_certainty.map(|c| c.as_str()),
            d.early_end.player1_voted as i32,
            d.early_end.player1_voted_at.map(ts),
            d.early_end.player2_voted as i32,
            d.early_end.player2_voted_at.map(ts),
            d.player1_survey_done as i32,
            d.player2_survey_done as i32,
            ts(d.created_at),
            ts(d.last_activity_at),
            d.completed_at.map(ts),
        ],
    )?;
    Ok(())
}

/// Load a debate aggregate (row plus its argument history).
pub fn get_debate(conn: &Connection, id: &str) -> Result<Option<Debate>> {
    let row = conn
        .query_row(
            r#"
            SELECT id, topic, status, current_round, max_rounds,
                   first_player, next_turn,
                   player1_user_id, player1_stance,
                   player2_user_id, player2_type,
                   ai_enabled, ai_personality, stance_certainty,
                   p1_early_end, p1_early_end_at, p2_early_end, p2_early_end_at,
                   p1_survey_done, p2_survey_done,
                   created_at, last_activity_at, completed_at
            FROM debates WHERE id = ?1
            "#,
            [id],
            |row| {
                let status_s: String = row.get(2)?;
                let status = DebateStatus::parse(&status_s)
                    .ok_or_else(|| col_err(2, format!("bad status {:?}", status_s)))?;
                let p1_stance_s: String = row.get(8)?;
                let p1_stance = Stance::parse(&p1_stance_s)
                    .ok_or_else(|| col_err(8, format!("bad stance {:?}", p1_stance_s)))?;

                let first_player = opt_stance(row.get::<_, Option<String>>(5)?, 5)?;
                let next_turn = opt_stance(row.get::<_, Option<String>>(6)?, 6)?;

                let p2_type = match row.get::<_, Option<String>>(10)? {
                    Some(s) => Some(
                        PlayerType::parse(&s)
                            .ok_or_else(|| col_err(10, format!("bad player type {:?}", s)))?,
                    ),
                    None => None,
                };
                let certainty = match row.get::<_, Option<String>>(13)? {
                    Some(s) => Some(
                        StanceCertainty::parse(&s)
                            .ok_or_else(|| col_err(13, format!("bad certainty {:?}", s)))?,
                    ),
                    None => None,
                };

                Ok(Debate {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    status,
                    current_round: row.get(3)?,
                    max_rounds: row.get(4)?,
                    first_player,
                    next_turn,
                    player1_user_id: row.get(7)?,
                    player1_stance: p1_stance,
                    player2_user_id: row.get(9)?,
                    player2_type: p2_type,
                    ai_enabled: row.get::<_, i32>(11)? != 0,
                    ai_personality: row.get(12)?,
                    stance_certainty: certainty,
                    arguments: Vec::new(),
                    early_end: EarlyEndVotes {
                        player1_voted: row.get::<_, i32>(14)? != 0,
                        player1_voted_at: opt_ts(row.get::<_, Option<String>>(15)?, 15)?,
                        player2_voted: row.get::<_, i32>(16)? != 0,
                        player2_voted_at: opt_ts(row.get::<_, Option<String>>(17)?, 17)?,
                    },
                    player1_survey_done: row.get::<_, i32>(18)? != 0,
                    player2_survey_done: row.get::<_, i32>(19)? != 0,
                    created_at: parse_ts(20, &row.get::<_, String>(20)?)?,
                    last_activity_at: parse_ts(21, &row.get::<_, String>(21)?)?,
                    completed_at: opt_ts(row.get::<_, Option<String>>(22)?, 22)?,
                })
            },
        )
        .optional()?;

    let mut debate = match row {
        Some(d) => d,
        None => return Ok(None),
    };

    let mut stmt = conn.prepare(
        r#"
        SELECT stance, text, round, submitted_by, created_at
        FROM arguments WHERE debate_id = ?1
        ORDER BY round ASC, id ASC
        "#,
    )?;
    let args = stmt
        .query_map([id], |row| {
            let stance_s: String = row.get(0)?;
            let stance = Stance::parse(&stance_s)
                .ok_or_else(|| col_err(0, format!("bad stance {:?}", stance_s)))?;
            let by_s: String = row.get(3)?;
            let submitted_by = Submitter::parse(&by_s)
                .ok_or_else(|| col_err(3, format!("bad submitter {:?}", by_s)))?;
            Ok(Argument {
                stance,
                text: row.get(1)?,
                round: row.get(2)?,
                submitted_by,
                created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debate.arguments = args;
    Ok(Some(debate))
}

fn opt_stance(v: Option<String>, idx: usize) -> rusqlite::Result<Option<Stance>> {
    match v {
        Some(s) => Stance::parse(&s)
            .map(Some)
            .ok_or_else(|| col_err(idx, format!("bad stance {:?}", s))),
        None => Ok(None),
    }
}

fn opt_ts(v: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match v {
        Some(s) => parse_ts(idx, &s).map(Some),
        None => Ok(None),
    }
}

/// Guarded write-back of turn state.
///
/// The WHERE clause matches on the status the caller loaded; zero affected
/// rows means another actor moved the debate first and this write is lost on
/// purpose. Only the turn-state columns are rewritten: vote, survey, opponent
/// and pause columns belong to their own statements and a stale aggregate
/// here cannot reset them.
pub fn update_debate_guarded(
    conn: &Connection,
    d: &Debate,
    expected_status: DebateStatus,
) -> Result<bool> {
    let affected = conn.execute(
        r#"
        UPDATE debates SET
            status = ?2,
            current_round = ?3,
            next_turn = ?4,
            last_activity_at = ?5,
            completed_at = ?6
        WHERE id = ?1 AND status = ?7
        "#,
        params![
            d.id,
            d.status.as_str(),
            d.current_round,
            d.next_turn.map(|s| s.as_str()),
            ts(d.last_activity_at),
            d.completed_at.map(ts),
            expected_status.as_str(),
        ],
    )?;
    Ok(affected == 1)
}

/// Record or withdraw one side's early-end vote. Field-targeted so two
/// racing voters (or a vote racing any turn-state write) cannot undo each
/// other; fails only when the debate is no longer active.
pub fn set_early_end_vote(
    conn: &Connection,
    debate_id: &str,
    side: Side,
    voted: bool,
    voted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = match side {
        Side::Player1 => {
            r#"
            UPDATE debates
            SET p1_early_end = ?2, p1_early_end_at = ?3, last_activity_at = ?4
            WHERE id = ?1 AND status = 'active'
            "#
        }
        Side::Player2 => {
            r#"
            UPDATE debates
            SET p2_early_end = ?2, p2_early_end_at = ?3, last_activity_at = ?4
            WHERE id = ?1 AND status = 'active'
            "#
        }
    };
    let affected = conn.execute(
        sql,
        params![debate_id, voted as i32, voted_at.map(ts), ts(now)],
    )?;
    Ok(affected == 1)
}

/// Fire the bilateral early-end transition: active -> survey_pending iff
/// both vote flags are set in the row itself. Clears the votes and the turn
/// in the same statement, so the transition is atomic with its bookkeeping.
pub fn finish_early_end(conn: &Connection, debate_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        r#"
        UPDATE debates SET
            status = 'survey_pending',
            next_turn = NULL,
            p1_early_end = 0, p1_early_end_at = NULL,
            p2_early_end = 0, p2_early_end_at = NULL,
            last_activity_at = ?2
        WHERE id = ?1 AND status = 'active'
          AND p1_early_end = 1 AND p2_early_end = 1
        "#,
        params![debate_id, ts(now)],
    )?;
    Ok(affected == 1)
}

/// Clear both early-end votes. Used when a debate leaves the active status
/// through a path other than the bilateral vote itself.
pub fn clear_early_end(conn: &Connection, debate_id: &str) -> Result<()> {
    conn.execute(
        r#"
        UPDATE debates
        SET p1_early_end = 0, p1_early_end_at = NULL,
            p2_early_end = 0, p2_early_end_at = NULL
        WHERE id = ?1
        "#,
        params![debate_id],
    )?;
    Ok(())
}

/// Mark one side's post-survey done. Field-targeted for the same reason as
/// the vote statements.
pub fn set_survey_done(
    conn: &Connection,
    debate_id: &str,
    side: Side,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = match side {
        Side::Player1 => {
            r#"
            UPDATE debates SET p1_survey_done = 1, last_activity_at = ?2
            WHERE id = ?1 AND status = 'survey_pending'
            "#
        }
        Side::Player2 => {
            r#"
            UPDATE debates SET p2_survey_done = 1, last_activity_at = ?2
            WHERE id = ?1 AND status = 'survey_pending'
            "#
        }
    };
    let affected = conn.execute(sql, params![debate_id, ts(now)])?;
    Ok(affected == 1)
}

/// Fire the completion transition: survey_pending -> completed iff both
/// survey flags are set in the row itself.
pub fn finish_surveys(conn: &Connection, debate_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        r#"
        UPDATE debates SET
            status = 'completed',
            completed_at = ?2,
            last_activity_at = ?2
        WHERE id = ?1 AND status = 'survey_pending'
          AND p1_survey_done = 1 AND p2_survey_done = 1
        "#,
        params![debate_id, ts(now)],
    )?;
    Ok(affected == 1)
}

/// Toggle the AI pause flag. Touches nothing else, so a pause can never
/// clobber a racing turn-state or vote write.
pub fn set_ai_enabled(
    conn: &Connection,
    debate_id: &str,
    enabled: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE debates SET ai_enabled = ?2, last_activity_at = ?3 WHERE id = ?1",
        params![debate_id, enabled as i32, ts(now)],
    )?;
    Ok(affected == 1)
}

/// Append one argument. A duplicate stance within the round trips the unique
/// index and surfaces as `NotYourTurn` (double-post from a racing client).
pub fn append_argument(conn: &Connection, debate_id: &str, arg: &Argument) -> Result<()> {
    let result = conn.execute(
        r#"
        INSERT INTO arguments (debate_id, round, stance, submitted_by, text, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            debate_id,
            arg.round,
            arg.stance.as_str(),
            arg.submitted_by.as_str(),
            arg.text,
            ts(arg.created_at),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DebateError::NotYourTurn)
        }
        Err(e) => Err(e.into()),
    }
}

/// Atomically claim the opponent slot of a waiting debate.
///
/// This is the one statement that guards matchmaking: it only succeeds while
/// the debate is still waiting with both player-2 columns unset, so two
/// racing claimants (human join vs scheduler tick, or two scheduler ticks)
/// resolve to exactly one winner.
pub fn claim_opponent(
    conn: &Connection,
    debate_id: &str,
    opponent_user_id: Option<&str>,
    opponent_type: PlayerType,
    personality: Option<&str>,
    first_player: Stance,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        r#"
        UPDATE debates SET
            status = 'active',
            player2_user_id = ?2,
            player2_type = ?3,
            ai_personality = COALESCE(?4, ai_personality),
            first_player = ?5,
            next_turn = ?5,
            last_activity_at = ?6
        WHERE id = ?1
          AND status = 'waiting'
          AND player2_user_id IS NULL
          AND player2_type IS NULL
        "#,
        params![
            debate_id,
            opponent_user_id,
            opponent_type.as_str(),
            personality,
            first_player.as_str(),
            ts(now),
        ],
    )?;
    Ok(affected == 1)
}

/// Waiting debates older than `cutoff` with no opponent, oldest first.
pub fn waiting_older_than(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id FROM debates
        WHERE status = 'waiting' AND player2_type IS NULL AND created_at < ?1
        ORDER BY created_at ASC
        LIMIT ?2
        "#,
    )?;
    let ids = stmt
        .query_map(params![ts(cutoff), limit as i64], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Bulk-abandon waiting debates that never found an opponent.
pub fn abandon_stale_waiting(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let affected = conn.execute(
        r#"
        UPDATE debates
        SET status = 'abandoned', next_turn = NULL
        WHERE status = 'waiting' AND created_at < ?1
        "#,
        params![ts(cutoff)],
    )?;
    Ok(affected)
}

/// Bulk-abandon active debates with no activity past the idle cutoff.
/// Pending early-end votes do not survive the abandonment.
pub fn abandon_idle_active(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let affected = conn.execute(
        r#"
        UPDATE debates
        SET status = 'abandoned', next_turn = NULL, completed_at = ?2,
            p1_early_end = 0, p1_early_end_at = NULL,
            p2_early_end = 0, p2_early_end_at = NULL
        WHERE status = 'active' AND last_activity_at < ?1
        "#,
        params![ts(cutoff), ts(now)],
    )?;
    Ok(affected)
}

/// Delete a waiting debate on behalf of the player who created it.
pub fn delete_waiting(conn: &Connection, debate_id: &str, user_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM debates WHERE id = ?1 AND status = 'waiting' AND player1_user_id = ?2",
        params![debate_id, user_id],
    )?;
    Ok(affected == 1)
}

/// Debate counts per status, for operator stats.
pub fn status_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM debates GROUP BY status ORDER BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

/// Backdate a debate's timestamps. Test and operator tooling only.
#[doc(hidden)]
pub fn backdate(
    conn: &Connection,
    debate_id: &str,
    created_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
) -> Result<()> {
    if let Some(t) = created_at {
        conn.execute(
            "UPDATE debates SET created_at = ?2 WHERE id = ?1",
            params![debate_id, ts(t)],
        )?;
    }
    if let Some(t) = last_activity_at {
        conn.execute(
            "UPDATE debates SET last_activity_at = ?2 WHERE id = ?1",
            params![debate_id, ts(t)],
        )?;
    }
    Ok(())
}
