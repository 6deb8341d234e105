use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::{Result, TasklaneError};
use crate::model::TimeEntry;
use crate::store::db::{Db, MAX_YEAR, dt_column, dt_column_opt, now_text};

const ENTRY_COLUMNS: &str = "id, task_id, user_id, started_at, ended_at, minutes, note, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        started_at: dt_column(row, 3)?,
        ended_at: dt_column_opt(row, 4)?,
        minutes: row.get(5)?,
        note: row.get(6)?,
        created_at: dt_column(row, 7)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMinutes {
    pub user_id: i64,
    pub name: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMinutes {
    pub task_id: i64,
    pub title: String,
    pub minutes: i64,
}

/// End of an entry that starts at `started_at` and lasts `minutes`.
/// Refused when the result would not survive the round trip through storage.
pub fn entry_end(started_at: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    started_at
        .checked_add_signed(Duration::minutes(minutes))
        .filter(|end| (1..=MAX_YEAR).contains(&started_at.year()) && end.year() <= MAX_YEAR)
        .ok_or_else(|| {
            TasklaneError::invalid(format!(
                "time entry must start and end between years 1 and {MAX_YEAR}"
            ))
        })
}

impl Db {
    /// Record a finished entry.
    pub fn insert_time_entry(
        &self,
        task_id: i64,
        user_id: i64,
        started_at: DateTime<Utc>,
        minutes: i64,
        note: Option<&str>,
    ) -> Result<TimeEntry> {
        let ended_at = entry_end(started_at, minutes)?;
        self.conn.execute(
            "INSERT INTO time_entries (task_id, user_id, started_at, ended_at, minutes, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task_id,
                user_id,
                started_at.to_rfc3339(),
                ended_at.to_rfc3339(),
                minutes,
                note,
                now_text()
            ],
        )?;
        self.get_time_entry(self.conn.last_insert_rowid())
    }

    /// Open a running entry. The partial unique index allows one per user.
    pub fn start_timer(&self, task_id: i64, user_id: i64, note: Option<&str>) -> Result<TimeEntry> {
        let now = now_text();
        let inserted = self.conn.execute(
            "INSERT INTO time_entries (task_id, user_id, started_at, ended_at, minutes, note, created_at)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?3)",
            params![task_id, user_id, &now, note],
        );
        match inserted {
            Ok(_) => self.get_time_entry(self.conn.last_insert_rowid()),
            Err(err) => {
                let conflict = matches!(
                    &err,
                    rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
                );
                if conflict && let Some(running) = self.running_timer(user_id)? {
                    return Err(TasklaneError::TimerRunning(running.id));
                }
                Err(err.into())
            }
        }
    }

    pub fn running_timer(&self, user_id: i64) -> Result<Option<TimeEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE user_id = ?1 AND ended_at IS NULL"
                ),
                params![user_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Close a running entry with the given end time and rounded minutes.
    pub fn finish_timer(&self, id: i64, ended_at: DateTime<Utc>, minutes: i64) -> Result<TimeEntry> {
        let changes = self.conn.execute(
            "UPDATE time_entries SET ended_at = ?2, minutes = ?3 WHERE id = ?1 AND ended_at IS NULL",
            params![id, ended_at.to_rfc3339(), minutes],
        )?;
        if changes == 0 {
            return Err(TasklaneError::NoRunningTimer);
        }
        self.get_time_entry(id)
    }

    pub fn get_time_entry(&self, id: i64) -> Result<TimeEntry> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::TimeEntryNotFound(id))
    }

    /// Newest first.
    pub fn list_time_entries(&self, task_id: i64) -> Result<Vec<TimeEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE task_id = ?1
             ORDER BY started_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![task_id], entry_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Rewrite a finished entry's duration and note; `ended_at` follows the new duration.
    pub fn update_time_entry(&self, id: i64, minutes: i64, note: Option<&str>) -> Result<TimeEntry> {
        let entry = self.get_time_entry(id)?;
        if entry.is_running() {
            return Err(TasklaneError::TimerRunning(id));
        }
        let ended_at = entry_end(entry.started_at, minutes)?;
        self.conn.execute(
            "UPDATE time_entries SET minutes = ?2, ended_at = ?3, note = ?4 WHERE id = ?1",
            params![id, minutes, ended_at.to_rfc3339(), note],
        )?;
        self.get_time_entry(id)
    }

    pub fn delete_time_entry(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM time_entries WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::TimeEntryNotFound(id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregates (finished entries only)
    // -----------------------------------------------------------------------

    pub fn minutes_by_user(&self, project_id: i64) -> Result<Vec<UserMinutes>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.user_id, u.name, SUM(e.minutes) FROM time_entries e
             JOIN tasks t ON t.id = e.task_id
             JOIN users u ON u.id = e.user_id
             WHERE t.project_id = ?1 AND e.minutes IS NOT NULL
             GROUP BY e.user_id, u.name
             ORDER BY 3 DESC, e.user_id",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(UserMinutes {
                user_id: row.get(0)?,
                name: row.get(1)?,
                minutes: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn minutes_by_task(&self, project_id: i64) -> Result<Vec<TaskMinutes>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.title, SUM(e.minutes) FROM time_entries e
             JOIN tasks t ON t.id = e.task_id
             WHERE t.project_id = ?1 AND e.minutes IS NOT NULL
             GROUP BY t.id, t.title
             ORDER BY 3 DESC, t.id",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(TaskMinutes {
                task_id: row.get(0)?,
                title: row.get(1)?,
                minutes: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, Task};

    fn setup() -> (Db, i64, i64, i64) {
        let db = Db::open_memory().unwrap();
        let user = db.insert_user("o@x.io", "Olive", "h", Role::Member).unwrap();
        let p = db.insert_project("P", None, user.id).unwrap();
        let task = db
            .insert_task(&Task::draft(p.id, "t", Some(user.id)))
            .unwrap();
        (db, p.id, task.id, user.id)
    }

    #[test]
    fn only_one_running_timer_per_user() {
        let (db, _, task, user) = setup();
        let first = db.start_timer(task, user, None).unwrap();
        assert!(first.is_running());
        let err = db.start_timer(task, user, None).unwrap_err();
        assert!(matches!(err, TasklaneError::TimerRunning(id) if id == first.id));

        let done = db.finish_timer(first.id, Utc::now(), 5).unwrap();
        assert_eq!(done.minutes, Some(5));
        assert!(db.running_timer(user).unwrap().is_none());
        db.start_timer(task, user, Some("again")).unwrap();
    }

    #[test]
    fn start_on_missing_task_is_not_a_running_timer() {
        let (db, _, _, user) = setup();
        let err = db.start_timer(9_999, user, None).unwrap_err();
        assert_eq!(err.code(), "db_error");
        assert!(db.running_timer(user).unwrap().is_none());
    }

    #[test]
    fn entry_end_stays_in_storable_range() {
        let late = "9999-12-31T23:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(entry_end(late, 30).unwrap() - late, Duration::minutes(30));
        assert_eq!(entry_end(late, 120).unwrap_err().code(), "invalid_input");
        assert_eq!(
            entry_end(DateTime::<Utc>::MAX_UTC - Duration::minutes(1), 1440)
                .unwrap_err()
                .code(),
            "invalid_input"
        );
        let (db, _, task, user) = setup();
        assert_eq!(
            db.insert_time_entry(task, user, late, 120, None)
                .unwrap_err()
                .code(),
            "invalid_input"
        );
        assert!(db.list_time_entries(task).unwrap().is_empty());
    }

    #[test]
    fn finishing_twice_fails() {
        let (db, _, task, user) = setup();
        let entry = db.start_timer(task, user, None).unwrap();
        db.finish_timer(entry.id, Utc::now(), 1).unwrap();
        assert_eq!(
            db.finish_timer(entry.id, Utc::now(), 1).unwrap_err().code(),
            "no_running_timer"
        );
    }

    #[test]
    fn aggregates_skip_running_entries() {
        let (db, project, task, user) = setup();
        db.insert_time_entry(task, user, Utc::now(), 30, None).unwrap();
        db.insert_time_entry(task, user, Utc::now(), 15, Some("review"))
            .unwrap();
        db.start_timer(task, user, None).unwrap();

        let by_user = db.minutes_by_user(project).unwrap();
        assert_eq!(by_user.len(), 1);
        assert_eq!(by_user[0].minutes, 45);
        assert_eq!(by_user[0].name, "Olive");

        let by_task = db.minutes_by_task(project).unwrap();
        assert_eq!(by_task[0].task_id, task);
        assert_eq!(by_task[0].minutes, 45);
        assert_eq!(db.list_time_entries(task).unwrap().len(), 3);
    }
}
