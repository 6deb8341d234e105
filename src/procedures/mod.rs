//! Typed procedures behind the RPC surface, one module per resource.
//!
//! Each procedure loads what it needs from the store, asks [`crate::access`]
//! whether the actor may proceed, validates its input and performs the
//! mutation (plus its activity row) inside [`Db::atomically`].

pub mod attachments;
pub mod auth;
pub mod comments;
pub mod milestones;
pub mod projects;
pub mod tasks;
pub mod time;
pub mod users;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::access::{self, Actor, ProjectAction, ProjectFacts, TaskAction, TaskFacts};
use crate::error::{Result, TasklaneError};
use crate::model::{Project, Task};
use crate::store::Db;
use crate::store::db::MAX_YEAR;

/// Reply for procedures with nothing else to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Ack = Ack { ok: true };
}

pub(crate) fn project_facts(db: &Db, actor: &Actor, project: &Project) -> Result<ProjectFacts> {
    Ok(ProjectFacts {
        owner_id: project.owner_id,
        is_member: db.is_member(project.id, actor.user_id)?,
    })
}

/// Load a project the actor can see. Invisible projects read as missing.
pub(crate) fn visible_project(db: &Db, actor: &Actor, project_id: i64) -> Result<(Project, ProjectFacts)> {
    let project = db.get_project(project_id)?;
    let facts = project_facts(db, actor, &project)?;
    access::require_visible(
        access::project_allows(actor, &facts, ProjectAction::View),
        TasklaneError::ProjectNotFound(project_id),
    )?;
    Ok((project, facts))
}

/// Load a visible project and require `action` on it.
pub(crate) fn project_for(
    db: &Db,
    actor: &Actor,
    project_id: i64,
    action: ProjectAction,
    what: &str,
) -> Result<(Project, ProjectFacts)> {
    let (project, facts) = visible_project(db, actor, project_id)?;
    access::require(access::project_allows(actor, &facts, action), what)?;
    Ok((project, facts))
}

/// Archived projects are read-only apart from un-archiving and deletion.
pub(crate) fn ensure_active(project: &Project) -> Result<()> {
    if project.archived {
        return Err(TasklaneError::invalid(format!(
            "project {} is archived",
            project.id
        )));
    }
    Ok(())
}

pub(crate) fn task_facts(db: &Db, actor: &Actor, task: &Task) -> Result<TaskFacts> {
    let project = db.get_project(task.project_id)?;
    Ok(TaskFacts {
        project: project_facts(db, actor, &project)?,
        creator_id: task.creator_id,
        is_assignee: task.is_assigned_to(actor.user_id),
    })
}

/// Load a task the actor can see. Invisible tasks read as missing.
pub(crate) fn visible_task(db: &Db, actor: &Actor, task_id: i64) -> Result<(Task, TaskFacts)> {
    let task = db.get_task(task_id)?;
    let facts = task_facts(db, actor, &task)?;
    access::require_visible(
        access::task_allows(actor, &facts, TaskAction::View),
        TasklaneError::TaskNotFound(task_id),
    )?;
    Ok((task, facts))
}

/// Load a visible task and require `action` on it.
pub(crate) fn task_for(
    db: &Db,
    actor: &Actor,
    task_id: i64,
    action: TaskAction,
    what: &str,
) -> Result<(Task, TaskFacts)> {
    let (task, facts) = visible_task(db, actor, task_id)?;
    access::require(access::task_allows(actor, &facts, action), what)?;
    Ok((task, facts))
}

/// Trim `value` and reject it when blank or longer than `max` characters.
pub(crate) fn required_text(value: &str, field: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TasklaneError::invalid(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(TasklaneError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Reject dates outside years 1..=9999, which do not store as `YYYY-MM-DD`.
pub(crate) fn checked_date(date: Option<NaiveDate>, field: &str) -> Result<Option<NaiveDate>> {
    match date {
        Some(d) if !(1..=MAX_YEAR).contains(&d.year()) => Err(TasklaneError::invalid(format!(
            "{field} must fall between years 1 and {MAX_YEAR}"
        ))),
        other => Ok(other),
    }
}

/// Owner or listed member of the project.
pub(crate) fn ensure_participant(db: &Db, project: &Project, user_id: i64) -> Result<()> {
    if project.owner_id == user_id || db.is_member(project.id, user_id)? {
        Ok(())
    } else {
        Err(TasklaneError::NotProjectMember(user_id, project.id))
    }
}

pub(crate) fn task_target(task_id: i64) -> String {
    format!("task:{task_id}")
}

pub(crate) fn user_target(user_id: i64) -> String {
    format!("user:{user_id}")
}
