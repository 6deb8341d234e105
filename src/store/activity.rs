use rusqlite::params;

use crate::error::Result;
use crate::model::Activity;
use crate::store::db::{Db, dt_column, now_text};

impl Db {
    /// Append an event to a project's activity feed.
    pub fn record_activity(
        &self,
        project_id: i64,
        actor_id: Option<i64>,
        event_type: &str,
        target: Option<&str>,
        detail: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO activity (project_id, actor_id, event_type, target, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![project_id, actor_id, event_type, target, detail, now_text()],
        )?;
        Ok(())
    }

    /// Newest first, at most `limit` rows.
    pub fn list_activity(&self, project_id: i64, limit: usize) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, actor_id, event_type, target, detail, created_at
             FROM activity WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![project_id, limit as i64], |row| {
            Ok(Activity {
                id: row.get(0)?,
                project_id: row.get(1)?,
                actor_id: row.get(2)?,
                event_type: row.get(3)?,
                target: row.get(4)?,
                detail: row.get(5)?,
                created_at: dt_column(row, 6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
