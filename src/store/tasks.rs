use rusqlite::{OptionalExtension, Row, params};

use crate::error::{Result, TasklaneError};
use crate::model::{Priority, Task, TaskStatus};
use crate::store::db::{Db, date_column_opt, date_text, dt_column, now_text};

const TASK_COLUMNS: &str = "t.id, t.project_id, t.milestone_id, t.title, t.description, t.status, \
     t.priority, t.due_date, t.creator_id, t.created_at, t.updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        milestone_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        due_date: date_column_opt(row, 7)?,
        creator_id: row.get(8)?,
        assignees: Vec::new(),
        created_at: dt_column(row, 9)?,
        updated_at: dt_column(row, 10)?,
    })
}

/// Optional filters for listing a project's tasks. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub priority: Option<Priority>,
}

impl Db {
    pub fn insert_task(&self, draft: &Task) -> Result<Task> {
        let id = self.atomically(|db| {
            let now = now_text();
            db.conn.execute(
                "INSERT INTO tasks (project_id, milestone_id, title, description, status, priority,
                                    priority_rank, due_date, creator_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    draft.project_id,
                    draft.milestone_id,
                    draft.title,
                    draft.description,
                    draft.status,
                    draft.priority,
                    draft.priority.rank(),
                    date_text(draft.due_date),
                    draft.creator_id,
                    &now,
                ],
            )?;
            let id = db.conn.last_insert_rowid();
            for user_id in &draft.assignees {
                db.conn.execute(
                    "INSERT OR IGNORE INTO task_assignees (task_id, user_id, assigned_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, user_id, &now],
                )?;
            }
            Ok(id)
        })?;
        self.get_task(id)
    }

    pub fn get_task(&self, id: i64) -> Result<Task> {
        let mut task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::TaskNotFound(id))?;
        task.assignees = self.task_assignees(id)?;
        Ok(task)
    }

    pub fn task_assignees(&self, task_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM task_assignees WHERE task_id = ?1 ORDER BY user_id")?;
        let ids = stmt
            .query_map(params![task_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Tasks of a project, most urgent first, then oldest first.
    pub fn list_tasks(&self, project_id: i64, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             WHERE t.project_id = ?1
             AND (?2 IS NULL OR t.status = ?2)
             AND (?3 IS NULL OR EXISTS (
                 SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = ?3
             ))
             AND (?4 IS NULL OR t.milestone_id = ?4)
             AND (?5 IS NULL OR t.priority = ?5)
             ORDER BY t.priority_rank, t.id"
        ))?;
        let rows = stmt.query_map(
            params![
                project_id,
                filter.status,
                filter.assignee_id,
                filter.milestone_id,
                filter.priority
            ],
            task_from_row,
        )?;
        let tasks = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        self.with_assignees(tasks)
    }

    /// Tasks assigned to a user across all projects.
    pub fn list_tasks_assigned_to(&self, user_id: i64, include_closed: bool) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             JOIN task_assignees a ON a.task_id = t.id
             WHERE a.user_id = ?1
             AND (?2 OR t.status NOT IN ('done', 'cancelled'))
             ORDER BY t.due_date IS NULL, t.due_date, t.priority_rank, t.id"
        ))?;
        let rows = stmt.query_map(params![user_id, include_closed], task_from_row)?;
        let tasks = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        self.with_assignees(tasks)
    }

    fn with_assignees(&self, mut tasks: Vec<Task>) -> Result<Vec<Task>> {
        for task in &mut tasks {
            task.assignees = self.task_assignees(task.id)?;
        }
        Ok(tasks)
    }

    /// Persist every mutable field and replace the assignee set.
    pub fn save_task(&self, task: &Task) -> Result<Task> {
        self.atomically(|db| {
            let now = now_text();
            let changes = db.conn.execute(
                "UPDATE tasks SET milestone_id = ?2, title = ?3, description = ?4, status = ?5,
                    priority = ?6, priority_rank = ?7, due_date = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    task.id,
                    task.milestone_id,
                    task.title,
                    task.description,
                    task.status,
                    task.priority,
                    task.priority.rank(),
                    date_text(task.due_date),
                    &now,
                ],
            )?;
            if changes == 0 {
                return Err(TasklaneError::TaskNotFound(task.id));
            }
            db.conn.execute(
                "DELETE FROM task_assignees WHERE task_id = ?1
                 AND user_id NOT IN (SELECT value FROM json_each(?2))",
                params![task.id, serde_json::to_string(&task.assignees)?],
            )?;
            for user_id in &task.assignees {
                db.conn.execute(
                    "INSERT OR IGNORE INTO task_assignees (task_id, user_id, assigned_at)
                     VALUES (?1, ?2, ?3)",
                    params![task.id, user_id, &now],
                )?;
            }
            Ok(())
        })?;
        self.get_task(task.id)
    }

    /// Delete a task. FK CASCADE removes assignments, comments, attachments and time entries.
    pub fn delete_task(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::TaskNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn setup() -> (Db, i64, i64) {
        let db = Db::open_memory().unwrap();
        let owner = db.insert_user("o@x.io", "O", "h", Role::Member).unwrap();
        let p = db.insert_project("P", None, owner.id).unwrap();
        (db, p.id, owner.id)
    }

    #[test]
    fn insert_with_assignees() {
        let (db, project, owner) = setup();
        let mut draft = Task::draft(project, "Design schema", Some(owner));
        draft.assignees = vec![owner];
        let task = db.insert_task(&draft).unwrap();
        assert!(task.id > 0);
        assert_eq!(task.assignees, vec![owner]);
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(db.get_task(task.id).unwrap().is_assigned_to(owner));
    }

    #[test]
    fn list_orders_by_priority_then_id() {
        let (db, project, owner) = setup();
        for (title, priority) in [
            ("low", Priority::Low),
            ("urgent", Priority::Urgent),
            ("medium", Priority::Medium),
        ] {
            let mut draft = Task::draft(project, title, Some(owner));
            draft.priority = priority;
            db.insert_task(&draft).unwrap();
        }
        let titles: Vec<String> = db
            .list_tasks(project, &TaskFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["urgent", "medium", "low"]);
    }

    #[test]
    fn list_filters_combine() {
        let (db, project, owner) = setup();
        let mut a = Task::draft(project, "a", Some(owner));
        a.assignees = vec![owner];
        let a = db.insert_task(&a).unwrap();
        let mut b = db
            .insert_task(&Task::draft(project, "b", Some(owner)))
            .unwrap();
        b.status = TaskStatus::InProgress;
        db.save_task(&b).unwrap();

        let mine = db
            .list_tasks(
                project,
                &TaskFilter {
                    assignee_id: Some(owner),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);

        let started = db
            .list_tasks(
                project,
                &TaskFilter {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, b.id);
    }

    #[test]
    fn save_replaces_assignees() {
        let (db, project, owner) = setup();
        let other = db.insert_user("m@x.io", "M", "h", Role::Member).unwrap();
        let mut draft = Task::draft(project, "t", Some(owner));
        draft.assignees = vec![owner];
        let mut task = db.insert_task(&draft).unwrap();
        task.assignees = vec![other.id];
        let saved = db.save_task(&task).unwrap();
        assert_eq!(saved.assignees, vec![other.id]);
    }

    #[test]
    fn assigned_view_hides_closed_by_default() {
        let (db, project, owner) = setup();
        let mut draft = Task::draft(project, "t", Some(owner));
        draft.assignees = vec![owner];
        let mut task = db.insert_task(&draft).unwrap();
        assert_eq!(db.list_tasks_assigned_to(owner, false).unwrap().len(), 1);
        task.status = TaskStatus::Done;
        db.save_task(&task).unwrap();
        assert!(db.list_tasks_assigned_to(owner, false).unwrap().is_empty());
        assert_eq!(db.list_tasks_assigned_to(owner, true).unwrap().len(), 1);
    }

    #[test]
    fn delete_missing_task() {
        let (db, _, _) = setup();
        assert_eq!(db.delete_task(77).unwrap_err().code(), "task_not_found");
    }
}
