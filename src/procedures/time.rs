//! `time.*`: manual entries, the per-user timer and project summaries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Ack, ensure_active, task_facts, task_for, task_target, visible_project, visible_task};
use crate::access::{self, Actor, TaskAction};
use crate::error::{Result, TasklaneError};
use crate::model::{TimeEntry, normalize_optional_text};
use crate::store::Db;
use crate::store::time_entries::{TaskMinutes, UserMinutes, entry_end};

/// A single manual entry may cover at most one day.
pub const MAX_ENTRY_MINUTES: i64 = 24 * 60;
const MAX_NOTE_LEN: usize = 1_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogTimeInput {
    pub task_id: i64,
    pub minutes: i64,
    /// Defaults to `minutes` before now.
    pub started_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartTimerInput {
    pub task_id: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoInput {}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListTimeInput {
    pub task_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeEntryRef {
    pub entry_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTimeInput {
    pub entry_id: i64,
    pub minutes: Option<i64>,
    /// An empty string clears the note.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryInput {
    pub project_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSummary {
    pub project_id: i64,
    pub total_minutes: i64,
    pub by_user: Vec<UserMinutes>,
    pub by_task: Vec<TaskMinutes>,
}

fn check_minutes(minutes: i64) -> Result<i64> {
    if (1..=MAX_ENTRY_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(TasklaneError::invalid(format!(
            "minutes must be between 1 and {MAX_ENTRY_MINUTES}"
        )))
    }
}

fn clean_note(note: Option<String>) -> Result<Option<String>> {
    let note = normalize_optional_text(note);
    if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
        return Err(TasklaneError::invalid(format!(
            "note must be at most {MAX_NOTE_LEN} characters"
        )));
    }
    Ok(note)
}

/// Whole minutes between two instants, rounded up, never less than one.
pub fn elapsed_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    let seconds = (ended_at - started_at).num_seconds().max(0);
    ((seconds + 59) / 60).max(1)
}

/// An entry the actor may edit or delete. Entries on tasks the actor cannot
/// see read as missing unless the actor logged them.
fn owned_entry(db: &Db, actor: &Actor, entry_id: i64) -> Result<(TimeEntry, i64)> {
    let entry = db.get_time_entry(entry_id)?;
    let task = db.get_task(entry.task_id)?;
    let facts = task_facts(db, actor, &task)?;
    access::require_visible(
        actor.is(entry.user_id) || access::task_allows(actor, &facts, TaskAction::View),
        TasklaneError::TimeEntryNotFound(entry_id),
    )?;
    access::require(
        access::time_entry_allows(actor, entry.user_id),
        "only the person who logged the time or an admin can change it",
    )?;
    Ok((entry, task.project_id))
}

pub fn log(db: &Db, actor: &Actor, input: LogTimeInput) -> Result<TimeEntry> {
    let (task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::LogTime,
        "only assignees, the project owner or an admin can log time",
    )?;
    ensure_active(&db.get_project(task.project_id)?)?;
    let minutes = check_minutes(input.minutes)?;
    let note = clean_note(input.note)?;
    let started_at = input
        .started_at
        .unwrap_or_else(|| Utc::now() - Duration::minutes(minutes));
    entry_end(started_at, minutes)?;
    db.atomically(|db| {
        let entry =
            db.insert_time_entry(task.id, actor.user_id, started_at, minutes, note.as_deref())?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "time.logged",
            Some(&task_target(task.id)),
            Some(&format!("{minutes} min")),
        )?;
        Ok(entry)
    })
}

/// Start the caller's timer. Only one timer per user may run at a time.
pub fn start(db: &Db, actor: &Actor, input: StartTimerInput) -> Result<TimeEntry> {
    let (task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::LogTime,
        "only assignees, the project owner or an admin can log time",
    )?;
    ensure_active(&db.get_project(task.project_id)?)?;
    let note = clean_note(input.note)?;
    db.atomically(|db| {
        let entry = db.start_timer(task.id, actor.user_id, note.as_deref())?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "time.started",
            Some(&task_target(task.id)),
            None,
        )?;
        Ok(entry)
    })
}

pub fn stop(db: &Db, actor: &Actor, _input: NoInput) -> Result<TimeEntry> {
    let running = db
        .running_timer(actor.user_id)?
        .ok_or(TasklaneError::NoRunningTimer)?;
    let now = Utc::now();
    let minutes = elapsed_minutes(running.started_at, now);
    db.atomically(|db| {
        let entry = db.finish_timer(running.id, now, minutes)?;
        let task = db.get_task(entry.task_id)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "time.logged",
            Some(&task_target(task.id)),
            Some(&format!("{minutes} min")),
        )?;
        Ok(entry)
    })
}

pub fn running(db: &Db, actor: &Actor, _input: NoInput) -> Result<Option<TimeEntry>> {
    db.running_timer(actor.user_id)
}

/// Newest first.
pub fn list(db: &Db, actor: &Actor, input: ListTimeInput) -> Result<Vec<TimeEntry>> {
    visible_task(db, actor, input.task_id)?;
    db.list_time_entries(input.task_id)
}

/// Change a finished entry's duration or note. The end time follows the duration.
pub fn update(db: &Db, actor: &Actor, input: UpdateTimeInput) -> Result<TimeEntry> {
    let (entry, project_id) = owned_entry(db, actor, input.entry_id)?;
    if entry.is_running() {
        return Err(TasklaneError::TimerRunning(entry.id));
    }
    let minutes = match input.minutes {
        Some(minutes) => check_minutes(minutes)?,
        None => entry.minutes.unwrap_or(1),
    };
    let note = match input.note {
        Some(note) => clean_note(Some(note))?,
        None => entry.note.clone(),
    };
    entry_end(entry.started_at, minutes)?;
    db.atomically(|db| {
        let updated = db.update_time_entry(entry.id, minutes, note.as_deref())?;
        db.record_activity(
            project_id,
            Some(actor.user_id),
            "time.updated",
            Some(&task_target(entry.task_id)),
            Some(&format!("{minutes} min")),
        )?;
        Ok(updated)
    })
}

pub fn delete(db: &Db, actor: &Actor, input: TimeEntryRef) -> Result<Ack> {
    let (entry, project_id) = owned_entry(db, actor, input.entry_id)?;
    db.atomically(|db| {
        db.delete_time_entry(entry.id)?;
        db.record_activity(
            project_id,
            Some(actor.user_id),
            "time.deleted",
            Some(&task_target(entry.task_id)),
            None,
        )
    })?;
    Ok(Ack::OK)
}

/// Minutes per user and per task over finished entries.
pub fn summary(db: &Db, actor: &Actor, input: SummaryInput) -> Result<TimeSummary> {
    visible_project(db, actor, input.project_id)?;
    let by_user = db.minutes_by_user(input.project_id)?;
    let by_task = db.minutes_by_task(input.project_id)?;
    Ok(TimeSummary {
        project_id: input.project_id,
        total_minutes: by_user.iter().map(|u| u.minutes).sum(),
        by_user,
        by_task,
    })
}
