use rusqlite::{ErrorCode, OptionalExtension, Row, params};

use crate::error::{Result, TasklaneError};
use crate::model::{Role, User};
use crate::store::db::{Db, dt_column, now_text};

const USER_COLUMNS: &str = "id, email, name, role, active, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        active: row.get(4)?,
        created_at: dt_column(row, 5)?,
        updated_at: dt_column(row, 6)?,
    })
}

fn map_unique_email(err: rusqlite::Error, email: &str) -> TasklaneError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
            TasklaneError::EmailTaken(email.to_string())
        }
        other => TasklaneError::Db(other),
    }
}

impl Db {
    pub fn insert_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User> {
        let now = now_text();
        self.conn
            .execute(
                "INSERT INTO users (email, name, password_hash, role, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
                params![email, name, password_hash, role, &now],
            )
            .map_err(|e| map_unique_email(e, email))?;
        self.get_user(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::UserNotFound(id))
    }

    /// Look up a user together with the stored password hash.
    pub fn find_user_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                params![email],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(7)?)),
            )
            .optional()?;
        Ok(found)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.find_user_credentials(email)?.map(|(user, _)| user))
    }

    pub fn password_hash(&self, id: i64) -> Result<String> {
        self.conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(TasklaneError::UserNotFound(id))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn count_users(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn count_active_admins(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND active = 1",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn count_owned_projects(&self, user_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE owner_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    pub fn update_user_profile(
        &self,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User> {
        let changes = self
            .conn
            .execute(
                "UPDATE users SET name = COALESCE(?2, name), email = COALESCE(?3, email),
                 updated_at = ?4 WHERE id = ?1",
                params![id, name, email, now_text()],
            )
            .map_err(|e| map_unique_email(e, email.unwrap_or_default()))?;
        if changes == 0 {
            return Err(TasklaneError::UserNotFound(id));
        }
        self.get_user(id)
    }

    pub fn set_user_role(&self, id: i64, role: Role) -> Result<User> {
        let changes = self.conn.execute(
            "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, role, now_text()],
        )?;
        if changes == 0 {
            return Err(TasklaneError::UserNotFound(id));
        }
        self.get_user(id)
    }

    pub fn set_user_active(&self, id: i64, active: bool) -> Result<User> {
        let changes = self.conn.execute(
            "UPDATE users SET active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, now_text()],
        )?;
        if changes == 0 {
            return Err(TasklaneError::UserNotFound(id));
        }
        self.get_user(id)
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        let changes = self.conn.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, password_hash, now_text()],
        )?;
        if changes == 0 {
            return Err(TasklaneError::UserNotFound(id));
        }
        Ok(())
    }

    /// Delete a user. FK rules cascade their sessions, memberships, assignments,
    /// comments, attachments and time entries; authored tasks keep a NULL creator.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        if self.count_owned_projects(id)? > 0 {
            return Err(TasklaneError::UserOwnsProjects(id));
        }
        let changes = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::UserNotFound(id));
        }
        Ok(())
    }
}
