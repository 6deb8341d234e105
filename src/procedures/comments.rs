//! `comment.*`

use serde::Deserialize;

use super::{Ack, ensure_active, required_text, task_facts, task_for, task_target, visible_task};
use crate::access::{self, Actor, OwnedAction, TaskAction, TaskFacts};
use crate::error::{Result, TasklaneError};
use crate::model::{Comment, Task};
use crate::store::Db;

pub const MAX_COMMENT_LEN: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentInput {
    pub task_id: i64,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListCommentsInput {
    pub task_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCommentInput {
    pub comment_id: i64,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRef {
    pub comment_id: i64,
}

/// A comment whose task the actor can see; anything else reads as missing.
fn visible_comment(db: &Db, actor: &Actor, comment_id: i64) -> Result<(Comment, Task, TaskFacts)> {
    let comment = db.get_comment(comment_id)?;
    let task = db.get_task(comment.task_id)?;
    let facts = task_facts(db, actor, &task)?;
    access::require_visible(
        access::task_allows(actor, &facts, TaskAction::View),
        TasklaneError::CommentNotFound(comment_id),
    )?;
    Ok((comment, task, facts))
}

pub fn create(db: &Db, actor: &Actor, input: CreateCommentInput) -> Result<Comment> {
    let (task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::Comment,
        "you cannot comment on this task",
    )?;
    ensure_active(&db.get_project(task.project_id)?)?;
    let body = required_text(&input.body, "body", MAX_COMMENT_LEN)?;
    db.atomically(|db| {
        let comment = db.insert_comment(task.id, actor.user_id, &body)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "comment.added",
            Some(&task_target(task.id)),
            None,
        )?;
        Ok(comment)
    })
}

/// Oldest first.
pub fn list(db: &Db, actor: &Actor, input: ListCommentsInput) -> Result<Vec<Comment>> {
    visible_task(db, actor, input.task_id)?;
    db.list_comments(input.task_id)
}

/// Authors may edit their own comments; nobody else can, admins included.
pub fn update(db: &Db, actor: &Actor, input: UpdateCommentInput) -> Result<Comment> {
    let (comment, task, facts) = visible_comment(db, actor, input.comment_id)?;
    access::require(
        access::comment_allows(actor, &facts, comment.author_id, OwnedAction::Edit),
        "only the author can edit a comment",
    )?;
    let body = required_text(&input.body, "body", MAX_COMMENT_LEN)?;
    db.atomically(|db| {
        let updated = db.update_comment_body(comment.id, &body)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "comment.edited",
            Some(&task_target(task.id)),
            None,
        )?;
        Ok(updated)
    })
}

pub fn delete(db: &Db, actor: &Actor, input: CommentRef) -> Result<Ack> {
    let (comment, task, facts) = visible_comment(db, actor, input.comment_id)?;
    access::require(
        access::comment_allows(actor, &facts, comment.author_id, OwnedAction::Delete),
        "only the author, the project owner or an admin can delete a comment",
    )?;
    db.atomically(|db| {
        db.delete_comment(comment.id)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "comment.deleted",
            Some(&task_target(task.id)),
            None,
        )
    })?;
    Ok(Ack::OK)
}
