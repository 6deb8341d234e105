use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, params};

use crate::error::{Result, TasklaneError};
use crate::model::Milestone;
use crate::store::db::{Db, date_column_opt, date_text, dt_column, now_text};

const MILESTONE_COLUMNS: &str =
    "id, project_id, title, description, due_date, completed, created_at, updated_at";

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: date_column_opt(row, 4)?,
        completed: row.get(5)?,
        created_at: dt_column(row, 6)?,
        updated_at: dt_column(row, 7)?,
    })
}

impl Db {
    pub fn insert_milestone(
        &self,
        project_id: i64,
        title: &str,
        description: Option<&str>,
        due_date: Option<NaiveDate>,
    ) -> Result<Milestone> {
        let now = now_text();
        self.conn.execute(
            "INSERT INTO milestones (project_id, title, description, due_date, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![project_id, title, description, date_text(due_date), &now],
        )?;
        self.get_milestone(self.conn.last_insert_rowid())
    }

    pub fn get_milestone(&self, id: i64) -> Result<Milestone> {
        self.conn
            .query_row(
                &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?1"),
                params![id],
                milestone_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::MilestoneNotFound(id))
    }

    /// Milestones ordered by due date (undated last), then id.
    pub fn list_milestones(&self, project_id: i64) -> Result<Vec<Milestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ?1
             ORDER BY due_date IS NULL, due_date, id"
        ))?;
        let rows = stmt.query_map(params![project_id], milestone_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn save_milestone(&self, milestone: &Milestone) -> Result<Milestone> {
        let changes = self.conn.execute(
            "UPDATE milestones SET title = ?2, description = ?3, due_date = ?4, completed = ?5,
             updated_at = ?6 WHERE id = ?1",
            params![
                milestone.id,
                milestone.title,
                milestone.description,
                date_text(milestone.due_date),
                milestone.completed,
                now_text()
            ],
        )?;
        if changes == 0 {
            return Err(TasklaneError::MilestoneNotFound(milestone.id));
        }
        self.get_milestone(milestone.id)
    }

    /// Delete a milestone; its tasks keep existing with no milestone.
    pub fn delete_milestone(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM milestones WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::MilestoneNotFound(id));
        }
        Ok(())
    }
}
