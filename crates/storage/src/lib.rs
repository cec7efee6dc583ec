//! Client-local durable state: the voter session, the buffered per-position
//! votes, and the stable device identity. A single wizard instance owns the
//! file; there is no cross-process coordination.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use shared::domain::{BufferedVote, CandidateId, DeviceId, Position, SessionToken, VoterSession};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voter_session (
                slot                 INTEGER PRIMARY KEY CHECK (slot = 1),
                institutional_email  TEXT NOT NULL,
                session_token        TEXT NOT NULL,
                device_id            TEXT,
                remaining_positions  TEXT NOT NULL,
                deadline             TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure voter_session table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS buffered_votes (
                position        TEXT PRIMARY KEY,
                candidate_id    TEXT NOT NULL,
                candidate_name  TEXT NOT NULL,
                recorded_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure buffered_votes table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_identity (
                slot       INTEGER PRIMARY KEY CHECK (slot = 1),
                device_id  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure device_identity table exists")?;

        Ok(())
    }

    /// Replaces the session record wholesale; there is at most one.
    pub async fn save_session(&self, session: &VoterSession) -> Result<()> {
        let remaining = serde_json::to_string(&session.remaining_positions)
            .context("failed to encode remaining positions")?;
        sqlx::query(
            "INSERT INTO voter_session (slot, institutional_email, session_token, device_id, remaining_positions, deadline)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET
               institutional_email=excluded.institutional_email,
               session_token=excluded.session_token,
               device_id=excluded.device_id,
               remaining_positions=excluded.remaining_positions,
               deadline=excluded.deadline",
        )
        .bind(&session.institutional_email)
        .bind(&session.session_token.0)
        .bind(session.device_id.as_ref().map(|d| d.0.as_str()))
        .bind(remaining)
        .bind(session.deadline)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_session(&self) -> Result<Option<VoterSession>> {
        let row = sqlx::query(
            "SELECT institutional_email, session_token, device_id, remaining_positions, deadline
             FROM voter_session WHERE slot = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let remaining: Vec<Position> = serde_json::from_str(&row.get::<String, _>(3))
            .context("corrupt remaining_positions column")?;
        Ok(Some(VoterSession {
            institutional_email: row.get::<String, _>(0),
            session_token: SessionToken(row.get::<String, _>(1)),
            device_id: row.get::<Option<String>, _>(2).map(DeviceId),
            remaining_positions: remaining,
            deadline: row.get::<DateTime<Utc>, _>(4),
        }))
    }

    /// Destroys the session and every buffered vote in one transaction, so
    /// a completed or expired session leaves nothing behind.
    pub async fn clear_session(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM voter_session")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM buffered_votes")
            .execute(&mut *tx)
            .await?;
        tx.commit().await.context("failed to clear session state")?;
        Ok(())
    }

    pub async fn record_buffered_vote(&self, position: &Position, vote: &BufferedVote) -> Result<()> {
        sqlx::query(
            "INSERT INTO buffered_votes (position, candidate_id, candidate_name)
             VALUES (?, ?, ?)
             ON CONFLICT(position) DO UPDATE SET
               candidate_id=excluded.candidate_id,
               candidate_name=excluded.candidate_name",
        )
        .bind(&position.0)
        .bind(&vote.candidate_id.0)
        .bind(&vote.candidate_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn buffered_votes(&self) -> Result<Vec<(Position, BufferedVote)>> {
        let rows = sqlx::query(
            "SELECT position, candidate_id, candidate_name
             FROM buffered_votes
             ORDER BY recorded_at ASC, position ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    Position(r.get::<String, _>(0)),
                    BufferedVote {
                        candidate_id: CandidateId(r.get::<String, _>(1)),
                        candidate_name: r.get::<String, _>(2),
                    },
                )
            })
            .collect())
    }

    /// Returns the stable device identity, generating and persisting one on
    /// first use. Survives `clear_session` deliberately: the backend keys
    /// device deduplication on it across sessions.
    pub async fn ensure_device_id(&self) -> Result<DeviceId> {
        let existing = sqlx::query("SELECT device_id FROM device_identity WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            return Ok(DeviceId(row.get::<String, _>(0)));
        }

        let device_id = DeviceId::generate();
        sqlx::query(
            "INSERT INTO device_identity (slot, device_id) VALUES (1, ?)
             ON CONFLICT(slot) DO NOTHING",
        )
        .bind(&device_id.0)
        .execute(&self.pool)
        .await?;

        // Another writer may have won the insert; read back the winner.
        let row = sqlx::query("SELECT device_id FROM device_identity WHERE slot = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(DeviceId(row.get::<String, _>(0)))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
