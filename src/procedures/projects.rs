//! `project.*`: projects, their members and the activity feed.

use serde::Deserialize;
use tracing::info;

use super::{Ack, ensure_active, project_for, required_text, user_target, visible_project};
use crate::access::{self, Actor, ProjectAction};
use crate::error::{Result, TasklaneError};
use crate::model::{Activity, Member, Project, normalize_optional_text};
use crate::store::Db;

pub(crate) const MAX_PROJECT_NAME_LEN: usize = 200;
const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListProjectsInput {
    pub include_archived: bool,
    /// Every project in the system; admins only.
    pub all: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectRef {
    pub project_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProjectInput {
    pub project_id: i64,
    pub name: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveProjectInput {
    pub project_id: i64,
    pub archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberInput {
    pub project_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityInput {
    pub project_id: i64,
    pub limit: Option<usize>,
}

pub fn create(db: &Db, actor: &Actor, input: CreateProjectInput) -> Result<Project> {
    let name = required_text(&input.name, "name", MAX_PROJECT_NAME_LEN)?;
    let description = normalize_optional_text(input.description);
    let project = db.atomically(|db| {
        let project = db.insert_project(&name, description.as_deref(), actor.user_id)?;
        db.record_activity(project.id, Some(actor.user_id), "project.created", None, Some(&name))?;
        Ok(project)
    })?;
    info!(project_id = project.id, owner_id = actor.user_id, "project created");
    Ok(project)
}

pub fn list(db: &Db, actor: &Actor, input: ListProjectsInput) -> Result<Vec<Project>> {
    if input.all {
        access::require_admin(actor)?;
        return db.list_all_projects(input.include_archived);
    }
    db.list_projects_for_user(actor.user_id, input.include_archived)
}

pub fn get(db: &Db, actor: &Actor, input: ProjectRef) -> Result<Project> {
    Ok(visible_project(db, actor, input.project_id)?.0)
}

pub fn update(db: &Db, actor: &Actor, input: UpdateProjectInput) -> Result<Project> {
    let (mut project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::Update,
        "only the owner or an admin can edit this project",
    )?;
    ensure_active(&project)?;
    if let Some(name) = input.name.as_deref() {
        project.name = required_text(name, "name", MAX_PROJECT_NAME_LEN)?;
    }
    if input.description.is_some() {
        project.description = normalize_optional_text(input.description);
    }
    db.atomically(|db| {
        let saved = db.save_project(&project)?;
        db.record_activity(saved.id, Some(actor.user_id), "project.updated", None, None)?;
        Ok(saved)
    })
}

pub fn archive(db: &Db, actor: &Actor, input: ArchiveProjectInput) -> Result<Project> {
    let (mut project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::Archive,
        "only the owner or an admin can archive this project",
    )?;
    if project.archived == input.archived {
        return Ok(project);
    }
    project.archived = input.archived;
    let event = if input.archived {
        "project.archived"
    } else {
        "project.restored"
    };
    db.atomically(|db| {
        let saved = db.save_project(&project)?;
        db.record_activity(saved.id, Some(actor.user_id), event, None, None)?;
        Ok(saved)
    })
}

/// Delete a project and everything inside it.
pub fn delete(db: &Db, actor: &Actor, input: ProjectRef) -> Result<Ack> {
    project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::Delete,
        "only the owner or an admin can delete this project",
    )?;
    db.delete_project(input.project_id)?;
    info!(project_id = input.project_id, actor_id = actor.user_id, "project deleted");
    Ok(Ack::OK)
}

pub fn members(db: &Db, actor: &Actor, input: ProjectRef) -> Result<Vec<Member>> {
    visible_project(db, actor, input.project_id)?;
    db.list_members(input.project_id)
}

pub fn add_member(db: &Db, actor: &Actor, input: MemberInput) -> Result<Vec<Member>> {
    let (project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::ManageMembers,
        "only the owner or an admin can manage members",
    )?;
    ensure_active(&project)?;
    let user = db.get_user(input.user_id)?;
    if !user.active {
        return Err(TasklaneError::invalid(format!(
            "user {} is disabled",
            user.id
        )));
    }
    if project.owner_id == user.id {
        return Err(TasklaneError::AlreadyMember(user.id, project.id));
    }
    db.atomically(|db| {
        db.add_member(project.id, user.id)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "member.added",
            Some(&user_target(user.id)),
            Some(&user.name),
        )
    })?;
    db.list_members(project.id)
}

/// Remove a member; their assignments inside the project go with them.
pub fn remove_member(db: &Db, actor: &Actor, input: MemberInput) -> Result<Vec<Member>> {
    let (project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::ManageMembers,
        "only the owner or an admin can manage members",
    )?;
    if project.owner_id == input.user_id {
        return Err(TasklaneError::invalid(
            "the owner cannot be removed; transfer ownership first",
        ));
    }
    db.atomically(|db| {
        db.remove_member(project.id, input.user_id)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "member.removed",
            Some(&user_target(input.user_id)),
            None,
        )
    })?;
    db.list_members(project.id)
}

pub fn leave(db: &Db, actor: &Actor, input: ProjectRef) -> Result<Ack> {
    let (project, facts) = visible_project(db, actor, input.project_id)?;
    if facts.owner_id == actor.user_id {
        return Err(TasklaneError::forbidden(
            "the owner cannot leave; transfer ownership first",
        ));
    }
    access::require(
        access::project_allows(actor, &facts, ProjectAction::Leave),
        "only members can leave a project",
    )?;
    db.atomically(|db| {
        db.remove_member(project.id, actor.user_id)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "member.left",
            Some(&user_target(actor.user_id)),
            None,
        )
    })?;
    Ok(Ack::OK)
}

/// Hand the project to one of its members. The previous owner stays on as a member.
pub fn transfer(db: &Db, actor: &Actor, input: MemberInput) -> Result<Project> {
    let (project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::TransferOwnership,
        "only the owner or an admin can transfer this project",
    )?;
    if project.owner_id == input.user_id {
        return Err(TasklaneError::invalid(format!(
            "user {} already owns project {}",
            input.user_id, project.id
        )));
    }
    let previous_owner = project.owner_id;
    let project = db.atomically(|db| {
        let project = db.transfer_ownership(project.id, input.user_id)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "project.transferred",
            Some(&user_target(input.user_id)),
            Some(&format!("from user:{previous_owner}")),
        )?;
        Ok(project)
    })?;
    info!(project_id = project.id, previous_owner, new_owner = input.user_id, "ownership transferred");
    Ok(project)
}

pub fn activity(db: &Db, actor: &Actor, input: ActivityInput) -> Result<Vec<Activity>> {
    visible_project(db, actor, input.project_id)?;
    let limit = input
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    db.list_activity(input.project_id, limit)
}
