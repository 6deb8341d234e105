//! Authorization rules.
//!
//! Every permission decision in tasklane is one of the predicates below,
//! evaluated over an [`Actor`] and a handful of facts about the resource
//! (who owns the project, whether the actor is a member, whether they are
//! assigned to the task). The predicates are pure; procedures gather the
//! facts from the store and then call [`require`] with the outcome.
//!
//! | resource  | action                           | allowed when                              |
//! |-----------|----------------------------------|-------------------------------------------|
//! | project   | view, create task                | owner, member or admin                    |
//! | project   | update, archive, delete, members, milestones, transfer | owner or admin      |
//! | project   | leave                            | member who is not the owner               |
//! | task      | view, comment, attach            | can view project, or assignee             |
//! | task      | edit, delete                     | project owner, task creator or admin      |
//! | task      | change status                    | project owner, creator, assignee or admin |
//! | task      | assign                           | project owner, member or admin            |
//! | task      | log time                         | assignee, project owner or admin          |
//! | comment   | edit                             | author                                    |
//! | comment   | delete                           | author, project owner or admin            |
//! | attachment| delete                           | uploader, project owner or admin          |
//! | time entry| edit, delete                     | entry owner or admin                      |

use crate::error::{Result, TasklaneError};
use crate::model::{Role, User};

/// The authenticated caller of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectFacts {
    pub owner_id: i64,
    /// Actor appears in the project's member list (the owner is not listed there).
    pub is_member: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFacts {
    pub project: ProjectFacts,
    pub creator_id: Option<i64>,
    pub is_assignee: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    View,
    Update,
    Archive,
    Delete,
    ManageMembers,
    ManageMilestones,
    TransferOwnership,
    CreateTask,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    View,
    Edit,
    ChangeStatus,
    Delete,
    Assign,
    Comment,
    Attach,
    LogTime,
}

/// Edit/delete rights over a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedAction {
    Edit,
    Delete,
}

fn is_owner(actor: &Actor, project: &ProjectFacts) -> bool {
    actor.is(project.owner_id)
}

pub fn project_allows(actor: &Actor, project: &ProjectFacts, action: ProjectAction) -> bool {
    let owner = is_owner(actor, project);
    match action {
        ProjectAction::View | ProjectAction::CreateTask => {
            owner || project.is_member || actor.is_admin()
        }
        ProjectAction::Update
        | ProjectAction::Archive
        | ProjectAction::Delete
        | ProjectAction::ManageMembers
        | ProjectAction::ManageMilestones
        | ProjectAction::TransferOwnership => owner || actor.is_admin(),
        ProjectAction::Leave => project.is_member && !owner,
    }
}

pub fn task_allows(actor: &Actor, task: &TaskFacts, action: TaskAction) -> bool {
    let owner = is_owner(actor, &task.project);
    let creator = task.creator_id.is_some_and(|id| actor.is(id));
    let admin = actor.is_admin();
    match action {
        TaskAction::View | TaskAction::Comment | TaskAction::Attach => {
            project_allows(actor, &task.project, ProjectAction::View) || task.is_assignee
        }
        TaskAction::Edit | TaskAction::Delete => owner || creator || admin,
        TaskAction::ChangeStatus => owner || creator || task.is_assignee || admin,
        TaskAction::Assign => owner || task.project.is_member || admin,
        TaskAction::LogTime => task.is_assignee || owner || admin,
    }
}

pub fn comment_allows(actor: &Actor, task: &TaskFacts, author_id: i64, action: OwnedAction) -> bool {
    match action {
        OwnedAction::Edit => actor.is(author_id),
        OwnedAction::Delete => {
            actor.is(author_id) || is_owner(actor, &task.project) || actor.is_admin()
        }
    }
}

pub fn attachment_allows(actor: &Actor, task: &TaskFacts, uploader_id: i64) -> bool {
    actor.is(uploader_id) || is_owner(actor, &task.project) || actor.is_admin()
}

/// Editing and deleting a time entry share one rule.
pub fn time_entry_allows(actor: &Actor, entry_user_id: i64) -> bool {
    actor.is(entry_user_id) || actor.is_admin()
}

/// Turn a predicate outcome into `Forbidden` with a short description.
pub fn require(allowed: bool, what: impl Into<String>) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(TasklaneError::forbidden(what))
    }
}

/// Like [`require`], but reports the resource as missing so its existence
/// is not revealed to callers who may not see it.
pub fn require_visible(allowed: bool, not_found: TasklaneError) -> Result<()> {
    if allowed { Ok(()) } else { Err(not_found) }
}

pub fn require_admin(actor: &Actor) -> Result<()> {
    require(actor.is_admin(), "administrator role required")
}
