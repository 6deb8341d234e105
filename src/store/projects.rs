use rusqlite::{OptionalExtension, Row, params};

use crate::error::{Result, TasklaneError};
use crate::model::{Member, Project};
use crate::store::db::{Db, dt_column, now_text};

const PROJECT_COLUMNS: &str = "id, name, description, owner_id, archived, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        archived: row.get(4)?,
        created_at: dt_column(row, 5)?,
        updated_at: dt_column(row, 6)?,
    })
}

impl Db {
    pub fn insert_project(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: i64,
    ) -> Result<Project> {
        let now = now_text();
        self.conn.execute(
            "INSERT INTO projects (name, description, owner_id, archived, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![name, description, owner_id, &now],
        )?;
        self.get_project(self.conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: i64) -> Result<Project> {
        self.conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                project_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::ProjectNotFound(id))
    }

    /// Persist name, description and archived flag; bumps `updated_at`.
    pub fn save_project(&self, project: &Project) -> Result<Project> {
        let changes = self.conn.execute(
            "UPDATE projects SET name = ?2, description = ?3, archived = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                project.id,
                project.name,
                project.description,
                project.archived,
                now_text()
            ],
        )?;
        if changes == 0 {
            return Err(TasklaneError::ProjectNotFound(project.id));
        }
        self.get_project(project.id)
    }

    /// Delete a project. FK CASCADE removes everything scoped to it.
    pub fn delete_project(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::ProjectNotFound(id));
        }
        Ok(())
    }

    /// Projects the user owns or belongs to, oldest first.
    pub fn list_projects_for_user(
        &self,
        user_id: i64,
        include_archived: bool,
    ) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p
             WHERE (p.owner_id = ?1 OR EXISTS (
                 SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?1
             ))
             AND (?2 OR p.archived = 0)
             ORDER BY p.id"
        ))?;
        let rows = stmt.query_map(params![user_id, include_archived], project_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn list_all_projects(&self, include_archived: bool) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE (?1 OR archived = 0) ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![include_archived], project_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    pub fn is_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2)",
            params![project_id, user_id],
            |row| row.get(0),
        )?)
    }

    pub fn add_member(&self, project_id: i64, user_id: i64) -> Result<()> {
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id, added_at)
             VALUES (?1, ?2, ?3)",
            params![project_id, user_id, now_text()],
        )?;
        if changes == 0 {
            return Err(TasklaneError::AlreadyMember(user_id, project_id));
        }
        Ok(())
    }

    /// Remove a member and every assignment they hold inside the project.
    pub fn remove_member(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.atomically(|db| {
            let changes = db.conn.execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
            )?;
            if changes == 0 {
                return Err(TasklaneError::NotProjectMember(user_id, project_id));
            }
            db.conn.execute(
                "DELETE FROM task_assignees WHERE user_id = ?2
                 AND task_id IN (SELECT id FROM tasks WHERE project_id = ?1)",
                params![project_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Owner first, then members in the order they joined.
    pub fn list_members(&self, project_id: i64) -> Result<Vec<Member>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.email, 1, p.created_at
             FROM projects p JOIN users u ON u.id = p.owner_id
             WHERE p.id = ?1
             UNION ALL
             SELECT u.id, u.name, u.email, 0, m.added_at
             FROM project_members m JOIN users u ON u.id = m.user_id
             WHERE m.project_id = ?1
             ORDER BY 4 DESC, 5, 1",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(Member {
                user_id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                is_owner: row.get(3)?,
                added_at: dt_column(row, 4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Hand the project to an existing member; the previous owner stays on as a member.
    pub fn transfer_ownership(&self, project_id: i64, new_owner_id: i64) -> Result<Project> {
        let project = self.get_project(project_id)?;
        self.atomically(|db| {
            let removed = db.conn.execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, new_owner_id],
            )?;
            if removed == 0 {
                return Err(TasklaneError::NotProjectMember(new_owner_id, project_id));
            }
            let now = now_text();
            db.conn.execute(
                "INSERT OR IGNORE INTO project_members (project_id, user_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![project_id, project.owner_id, &now],
            )?;
            db.conn.execute(
                "UPDATE projects SET owner_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![project_id, new_owner_id, &now],
            )?;
            Ok(())
        })?;
        self.get_project(project_id)
    }
}
