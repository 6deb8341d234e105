//! `attachment.*`: metadata for files kept in external object storage.

use serde::Deserialize;

use super::{Ack, ensure_active, required_text, task_facts, task_for, task_target, visible_task};
use crate::access::{self, Actor, TaskAction};
use crate::config::Config;
use crate::error::{Result, TasklaneError};
use crate::model::Attachment;
use crate::store::Db;
use crate::store::comments::NewAttachment;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_FILE_NAME_LEN: usize = 255;
const MAX_STORAGE_KEY_LEN: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAttachmentInput {
    pub task_id: i64,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub storage_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListAttachmentsInput {
    pub task_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentRef {
    pub attachment_id: i64,
}

pub fn create(
    db: &Db,
    config: &Config,
    actor: &Actor,
    input: CreateAttachmentInput,
) -> Result<Attachment> {
    let (task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::Attach,
        "you cannot attach files to this task",
    )?;
    ensure_active(&db.get_project(task.project_id)?)?;
    let file_name = required_text(&input.file_name, "file_name", MAX_FILE_NAME_LEN)?;
    if file_name.contains(['/', '\\']) {
        return Err(TasklaneError::invalid("file_name must not contain path separators"));
    }
    let storage_key = required_text(&input.storage_key, "storage_key", MAX_STORAGE_KEY_LEN)?;
    let content_type = input
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let limit = config.storage.max_attachment_bytes;
    if !(0..=limit).contains(&input.size_bytes) {
        return Err(TasklaneError::invalid(format!(
            "size_bytes must be between 0 and {limit}"
        )));
    }

    db.atomically(|db| {
        let attachment = db.insert_attachment(&NewAttachment {
            task_id: task.id,
            uploader_id: actor.user_id,
            file_name: &file_name,
            content_type: &content_type,
            size_bytes: input.size_bytes,
            storage_key: &storage_key,
        })?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "attachment.added",
            Some(&task_target(task.id)),
            Some(&file_name),
        )?;
        Ok(attachment)
    })
}

pub fn list(db: &Db, actor: &Actor, input: ListAttachmentsInput) -> Result<Vec<Attachment>> {
    visible_task(db, actor, input.task_id)?;
    db.list_attachments(input.task_id)
}

/// Remove the record. Deleting the stored object is left to the storage layer.
pub fn delete(db: &Db, actor: &Actor, input: AttachmentRef) -> Result<Ack> {
    let attachment = db.get_attachment(input.attachment_id)?;
    let task = db.get_task(attachment.task_id)?;
    let facts = task_facts(db, actor, &task)?;
    access::require_visible(
        access::task_allows(actor, &facts, TaskAction::View),
        TasklaneError::AttachmentNotFound(attachment.id),
    )?;
    access::require(
        access::attachment_allows(actor, &facts, attachment.uploader_id),
        "only the uploader, the project owner or an admin can delete an attachment",
    )?;
    db.atomically(|db| {
        db.delete_attachment(attachment.id)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "attachment.deleted",
            Some(&task_target(task.id)),
            Some(&attachment.file_name),
        )
    })?;
    Ok(Ack::OK)
}
