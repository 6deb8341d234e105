use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::error::Result;
use crate::store::db::{Db, dt_column};

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Db {
    pub fn insert_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRow> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        Ok(SessionRow {
            token_hash: token_hash.to_string(),
            user_id,
            created_at: now,
            expires_at,
        })
    }

    pub fn find_session(&self, token_hash: &str) -> Result<Option<SessionRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT token_hash, user_id, created_at, expires_at FROM sessions
                 WHERE token_hash = ?1",
                params![token_hash],
                |row| {
                    Ok(SessionRow {
                        token_hash: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: dt_column(row, 2)?,
                        expires_at: dt_column(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let changes = self.conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(changes > 0)
    }

    /// Revoke every session of a user, optionally keeping one.
    pub fn delete_user_sessions(&self, user_id: i64, keep: Option<&str>) -> Result<usize> {
        let changes = self.conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1 AND (?2 IS NULL OR token_hash != ?2)",
            params![user_id, keep],
        )?;
        Ok(changes)
    }

    /// Remove expired sessions. Returns the number removed.
    pub fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let changes = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(changes)
    }
}
