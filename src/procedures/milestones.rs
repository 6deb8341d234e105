//! `milestone.*`

use chrono::NaiveDate;
use serde::Deserialize;

use super::{
    Ack, checked_date, ensure_active, project_facts, project_for, required_text, visible_project,
};
use crate::access::{self, Actor, ProjectAction};
use crate::error::{Result, TasklaneError};
use crate::model::{Milestone, Project, normalize_optional_text};
use crate::store::Db;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMilestoneInput {
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListMilestonesInput {
    pub project_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMilestoneInput {
    pub milestone_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub clear_due_date: bool,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilestoneRef {
    pub milestone_id: i64,
}

/// Load a milestone for management. Milestones of invisible projects read as missing.
fn managed_milestone(db: &Db, actor: &Actor, milestone_id: i64) -> Result<(Milestone, Project)> {
    let milestone = db.get_milestone(milestone_id)?;
    let project = db.get_project(milestone.project_id)?;
    let facts = project_facts(db, actor, &project)?;
    access::require_visible(
        access::project_allows(actor, &facts, ProjectAction::View),
        TasklaneError::MilestoneNotFound(milestone_id),
    )?;
    access::require(
        access::project_allows(actor, &facts, ProjectAction::ManageMilestones),
        "only the owner or an admin can manage milestones",
    )?;
    Ok((milestone, project))
}

pub fn create(db: &Db, actor: &Actor, input: CreateMilestoneInput) -> Result<Milestone> {
    let (project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::ManageMilestones,
        "only the owner or an admin can manage milestones",
    )?;
    ensure_active(&project)?;
    let title = required_text(&input.title, "title", MAX_TITLE_LEN)?;
    let description = normalize_optional_text(input.description);
    let due_date = checked_date(input.due_date, "due_date")?;
    db.atomically(|db| {
        let milestone =
            db.insert_milestone(project.id, &title, description.as_deref(), due_date)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "milestone.created",
            Some(&format!("milestone:{}", milestone.id)),
            Some(&title),
        )?;
        Ok(milestone)
    })
}

pub fn list(db: &Db, actor: &Actor, input: ListMilestonesInput) -> Result<Vec<Milestone>> {
    visible_project(db, actor, input.project_id)?;
    db.list_milestones(input.project_id)
}

pub fn update(db: &Db, actor: &Actor, input: UpdateMilestoneInput) -> Result<Milestone> {
    let (mut milestone, project) = managed_milestone(db, actor, input.milestone_id)?;
    ensure_active(&project)?;
    if input.clear_due_date && input.due_date.is_some() {
        return Err(TasklaneError::invalid(
            "due_date and clear_due_date are mutually exclusive",
        ));
    }
    if let Some(title) = input.title.as_deref() {
        milestone.title = required_text(title, "title", MAX_TITLE_LEN)?;
    }
    if input.description.is_some() {
        milestone.description = normalize_optional_text(input.description);
    }
    if input.clear_due_date {
        milestone.due_date = None;
    } else if input.due_date.is_some() {
        milestone.due_date = checked_date(input.due_date, "due_date")?;
    }
    let completed_now = input.completed == Some(true) && !milestone.completed;
    if let Some(completed) = input.completed {
        milestone.completed = completed;
    }
    let event = if completed_now {
        "milestone.completed"
    } else {
        "milestone.updated"
    };
    db.atomically(|db| {
        let saved = db.save_milestone(&milestone)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            event,
            Some(&format!("milestone:{}", saved.id)),
            None,
        )?;
        Ok(saved)
    })
}

/// Delete a milestone; its tasks stay, detached.
pub fn delete(db: &Db, actor: &Actor, input: MilestoneRef) -> Result<Ack> {
    let (milestone, project) = managed_milestone(db, actor, input.milestone_id)?;
    db.atomically(|db| {
        db.delete_milestone(milestone.id)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "milestone.deleted",
            Some(&format!("milestone:{}", milestone.id)),
            Some(&milestone.title),
        )
    })?;
    Ok(Ack::OK)
}
