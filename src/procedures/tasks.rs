//! `task.*`: tasks, their status and assignees.

use chrono::NaiveDate;
use serde::Deserialize;

use super::{
    Ack, checked_date, ensure_active, ensure_participant, project_for, required_text, task_for,
    task_target, user_target, visible_project, visible_task,
};
use crate::access::{self, Actor, ProjectAction, TaskAction};
use crate::error::{Result, TasklaneError};
use crate::model::{Priority, Project, Task, TaskStatus, normalize_optional_text};
use crate::store::Db;
use crate::store::tasks::TaskFilter;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskInput {
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub milestone_id: Option<i64>,
    #[serde(default)]
    pub assignees: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRef {
    pub task_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListTasksInput {
    pub project_id: i64,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MyTasksInput {
    pub include_closed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTaskInput {
    pub task_id: i64,
    pub title: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub milestone_id: Option<i64>,
    #[serde(default)]
    pub clear_due_date: bool,
    #[serde(default)]
    pub clear_milestone: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatusInput {
    pub task_id: i64,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignInput {
    pub task_id: i64,
    pub user_id: i64,
}

fn ensure_milestone_in_project(db: &Db, milestone_id: i64, project_id: i64) -> Result<()> {
    let milestone = db.get_milestone(milestone_id)?;
    if milestone.project_id != project_id {
        return Err(TasklaneError::invalid(format!(
            "milestone {milestone_id} belongs to another project"
        )));
    }
    Ok(())
}

fn project_of(db: &Db, task: &Task) -> Result<Project> {
    db.get_project(task.project_id)
}

pub fn create(db: &Db, actor: &Actor, input: CreateTaskInput) -> Result<Task> {
    let (project, _) = project_for(
        db,
        actor,
        input.project_id,
        ProjectAction::CreateTask,
        "only project participants can create tasks",
    )?;
    ensure_active(&project)?;
    let mut draft = Task::draft(
        project.id,
        &required_text(&input.title, "title", MAX_TITLE_LEN)?,
        Some(actor.user_id),
    );
    draft.description = input.description;
    draft.priority = input.priority.unwrap_or_default();
    draft.due_date = checked_date(input.due_date, "due_date")?;
    draft.milestone_id = input.milestone_id;
    draft.assignees = input.assignees;
    draft.normalize();

    if let Some(milestone_id) = draft.milestone_id {
        ensure_milestone_in_project(db, milestone_id, project.id)?;
    }
    for &user_id in &draft.assignees {
        ensure_participant(db, &project, user_id)?;
    }

    db.atomically(|db| {
        let task = db.insert_task(&draft)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "task.created",
            Some(&task_target(task.id)),
            Some(&task.title),
        )?;
        Ok(task)
    })
}

pub fn get(db: &Db, actor: &Actor, input: TaskRef) -> Result<Task> {
    Ok(visible_task(db, actor, input.task_id)?.0)
}

/// A project's tasks, most urgent first.
pub fn list(db: &Db, actor: &Actor, input: ListTasksInput) -> Result<Vec<Task>> {
    visible_project(db, actor, input.project_id)?;
    let filter = TaskFilter {
        status: input.status,
        assignee_id: input.assignee_id,
        milestone_id: input.milestone_id,
        priority: input.priority,
    };
    db.list_tasks(input.project_id, &filter)
}

/// Tasks assigned to the caller across every project.
pub fn mine(db: &Db, actor: &Actor, input: MyTasksInput) -> Result<Vec<Task>> {
    db.list_tasks_assigned_to(actor.user_id, input.include_closed)
}

pub fn update(db: &Db, actor: &Actor, input: UpdateTaskInput) -> Result<Task> {
    let (mut task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::Edit,
        "only the project owner, the task creator or an admin can edit this task",
    )?;
    let project = project_of(db, &task)?;
    ensure_active(&project)?;
    if input.clear_due_date && input.due_date.is_some() {
        return Err(TasklaneError::invalid(
            "due_date and clear_due_date are mutually exclusive",
        ));
    }
    if input.clear_milestone && input.milestone_id.is_some() {
        return Err(TasklaneError::invalid(
            "milestone_id and clear_milestone are mutually exclusive",
        ));
    }

    if let Some(title) = input.title.as_deref() {
        task.title = required_text(title, "title", MAX_TITLE_LEN)?;
    }
    if input.description.is_some() {
        task.description = normalize_optional_text(input.description);
    }
    if let Some(priority) = input.priority {
        task.priority = priority;
    }
    if input.clear_due_date {
        task.due_date = None;
    } else if input.due_date.is_some() {
        task.due_date = checked_date(input.due_date, "due_date")?;
    }
    if input.clear_milestone {
        task.milestone_id = None;
    } else if let Some(milestone_id) = input.milestone_id {
        ensure_milestone_in_project(db, milestone_id, project.id)?;
        task.milestone_id = Some(milestone_id);
    }
    task.normalize();

    db.atomically(|db| {
        let saved = db.save_task(&task)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "task.updated",
            Some(&task_target(saved.id)),
            None,
        )?;
        Ok(saved)
    })
}

pub fn set_status(db: &Db, actor: &Actor, input: SetStatusInput) -> Result<Task> {
    let (mut task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::ChangeStatus,
        "you cannot change the status of this task",
    )?;
    ensure_active(&project_of(db, &task)?)?;
    let from = task.status;
    if !from.can_transition_to(input.status) {
        return Err(TasklaneError::InvalidTransition(
            from.to_string(),
            input.status.to_string(),
        ));
    }
    task.status = input.status;
    db.atomically(|db| {
        let saved = db.save_task(&task)?;
        db.record_activity(
            saved.project_id,
            Some(actor.user_id),
            "task.status_changed",
            Some(&task_target(saved.id)),
            Some(&format!("{from} -> {}", saved.status)),
        )?;
        Ok(saved)
    })
}

/// Delete a task along with its comments, attachments and time entries.
pub fn delete(db: &Db, actor: &Actor, input: TaskRef) -> Result<Ack> {
    let (task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::Delete,
        "only the project owner, the task creator or an admin can delete this task",
    )?;
    db.atomically(|db| {
        db.delete_task(task.id)?;
        db.record_activity(
            task.project_id,
            Some(actor.user_id),
            "task.deleted",
            Some(&task_target(task.id)),
            Some(&task.title),
        )
    })?;
    Ok(Ack::OK)
}

/// Add an assignee. Assigning someone already assigned changes nothing.
pub fn assign(db: &Db, actor: &Actor, input: AssignInput) -> Result<Task> {
    let (mut task, _) = task_for(
        db,
        actor,
        input.task_id,
        TaskAction::Assign,
        "only project participants can assign this task",
    )?;
    let project = project_of(db, &task)?;
    ensure_active(&project)?;
    if task.is_assigned_to(input.user_id) {
        return Ok(task);
    }
    ensure_participant(db, &project, input.user_id)?;
    task.assignees.push(input.user_id);
    task.normalize();
    db.atomically(|db| {
        let saved = db.save_task(&task)?;
        db.record_activity(
            project.id,
            Some(actor.user_id),
            "task.assigned",
            Some(&task_target(saved.id)),
            Some(&user_target(input.user_id)),
        )?;
        Ok(saved)
    })
}

/// Remove an assignee. Anyone who can see the task may unassign themselves.
pub fn unassign(db: &Db, actor: &Actor, input: AssignInput) -> Result<Task> {
    let (mut task, facts) = visible_task(db, actor, input.task_id)?;
    if !actor.is(input.user_id) {
        access::require(
            access::task_allows(actor, &facts, TaskAction::Assign),
            "only project participants can unassign others",
        )?;
    }
    if !task.is_assigned_to(input.user_id) {
        return Err(TasklaneError::invalid(format!(
            "user {} is not assigned to task {}",
            input.user_id, task.id
        )));
    }
    task.assignees.retain(|&id| id != input.user_id);
    db.atomically(|db| {
        let saved = db.save_task(&task)?;
        db.record_activity(
            saved.project_id,
            Some(actor.user_id),
            "task.unassigned",
            Some(&task_target(saved.id)),
            Some(&user_target(input.user_id)),
        )?;
        Ok(saved)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedures::testing::{World, world};

    fn new_task(w: &World, actor: &Actor, title: &str) -> Task {
        create(
            &w.db,
            actor,
            CreateTaskInput {
                project_id: w.project.id,
                title: title.into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn assign_to(w: &World, actor: &Actor, task: &Task, user_id: i64) -> Result<Task> {
        assign(
            &w.db,
            actor,
            AssignInput {
                task_id: task.id,
                user_id,
            },
        )
    }

    #[test]
    fn create_validates_assignees_and_milestone() {
        let w = world();
        let err = create(
            &w.db,
            &w.owner,
            CreateTaskInput {
                project_id: w.project.id,
                title: "t".into(),
                assignees: vec![w.outsider.user_id],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "not_project_member");

        let other = w.db.insert_project("Other", None, w.owner.user_id).unwrap();
        let foreign = w.db.insert_milestone(other.id, "m", None, None).unwrap();
        let err = create(
            &w.db,
            &w.owner,
            CreateTaskInput {
                project_id: w.project.id,
                title: "t".into(),
                milestone_id: Some(foreign.id),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let task = create(
            &w.db,
            &w.member,
            CreateTaskInput {
                project_id: w.project.id,
                title: " Draft plan ".into(),
                priority: Some(Priority::High),
                assignees: vec![w.member.user_id, w.owner.user_id, w.member.user_id],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(task.title, "Draft plan");
        assert_eq!(task.creator_id, Some(w.member.user_id));
        let mut expected = vec![w.owner.user_id, w.member.user_id];
        expected.sort_unstable();
        assert_eq!(task.assignees, expected);
    }

    #[test]
    fn outsiders_cannot_create_or_see() {
        let w = world();
        let err = create(
            &w.db,
            &w.outsider,
            CreateTaskInput {
                project_id: w.project.id,
                title: "t".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "project_not_found");
        let task = new_task(&w, &w.owner, "secret");
        let err = get(&w.db, &w.outsider, TaskRef { task_id: task.id }).unwrap_err();
        assert_eq!(err.code(), "task_not_found");
    }

    #[test]
    fn assignee_sees_task_after_leaving_project() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        assign_to(&w, &w.owner, &task, w.member.user_id).unwrap();
        // Direct store call: the procedure would also drop the assignment.
        w.db.conn()
            .execute(
                "DELETE FROM project_members WHERE user_id = ?1",
                [w.member.user_id],
            )
            .unwrap();
        assert!(get(&w.db, &w.member, TaskRef { task_id: task.id }).is_ok());
    }

    #[test]
    fn edit_rights() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        let rename = |title: &str| UpdateTaskInput {
            task_id: task.id,
            title: Some(title.into()),
            ..Default::default()
        };
        assert_eq!(
            update(&w.db, &w.member, rename("x")).unwrap_err().code(),
            "forbidden"
        );
        let mine = new_task(&w, &w.member, "mine");
        let updated = update(
            &w.db,
            &w.member,
            UpdateTaskInput {
                task_id: mine.id,
                priority: Some(Priority::Urgent),
                description: Some("details".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.priority, Priority::Urgent);
        assert_eq!(updated.description.as_deref(), Some("details"));
        assert_eq!(update(&w.db, &w.admin, rename("y")).unwrap().title, "y");
    }

    #[test]
    fn status_transitions_are_enforced() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        assign_to(&w, &w.owner, &task, w.member.user_id).unwrap();
        let to = |status| SetStatusInput {
            task_id: task.id,
            status,
        };

        let err = set_status(&w.db, &w.member, to(TaskStatus::InReview)).unwrap_err();
        assert!(matches!(err, TasklaneError::InvalidTransition(ref a, ref b) if a == "todo" && b == "in_review"));
        set_status(&w.db, &w.member, to(TaskStatus::InProgress)).unwrap();
        let done = set_status(&w.db, &w.member, to(TaskStatus::Done)).unwrap();
        assert_eq!(done.status, TaskStatus::Done);

        let feed = w.db.list_activity(w.project.id, 1).unwrap();
        assert_eq!(feed[0].event_type, "task.status_changed");
        assert_eq!(feed[0].detail.as_deref(), Some("in_progress -> done"));
    }

    #[test]
    fn plain_member_cannot_change_status_of_unassigned_task() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        let err = set_status(
            &w.db,
            &w.member,
            SetStatusInput {
                task_id: task.id,
                status: TaskStatus::InProgress,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn list_orders_by_priority_and_filters() {
        let w = world();
        let low = new_task(&w, &w.owner, "low");
        update(
            &w.db,
            &w.owner,
            UpdateTaskInput {
                task_id: low.id,
                priority: Some(Priority::Low),
                ..Default::default()
            },
        )
        .unwrap();
        let urgent = create(
            &w.db,
            &w.owner,
            CreateTaskInput {
                project_id: w.project.id,
                title: "urgent".into(),
                priority: Some(Priority::Urgent),
                assignees: vec![w.member.user_id],
                ..Default::default()
            },
        )
        .unwrap();

        let all = list(
            &w.db,
            &w.member,
            ListTasksInput {
                project_id: w.project.id,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![urgent.id, low.id]);

        let assigned = list(
            &w.db,
            &w.member,
            ListTasksInput {
                project_id: w.project.id,
                assignee_id: Some(w.member.user_id),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(assigned.len(), 1);

        let mine = mine(&w.db, &w.member, MyTasksInput::default()).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, urgent.id);
    }

    #[test]
    fn assign_and_unassign() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        let err = assign_to(&w, &w.owner, &task, w.outsider.user_id).unwrap_err();
        assert_eq!(err.code(), "not_project_member");

        let task = assign_to(&w, &w.member, &task, w.owner.user_id).unwrap();
        let task = assign_to(&w, &w.owner, &task, w.member.user_id).unwrap();
        assert_eq!(task.assignees.len(), 2);
        // Idempotent.
        let task = assign_to(&w, &w.owner, &task, w.member.user_id).unwrap();
        assert_eq!(task.assignees.len(), 2);

        let task = unassign(
            &w.db,
            &w.member,
            AssignInput {
                task_id: task.id,
                user_id: w.member.user_id,
            },
        )
        .unwrap();
        assert_eq!(task.assignees, vec![w.owner.user_id]);

        let err = unassign(
            &w.db,
            &w.member,
            AssignInput {
                task_id: task.id,
                user_id: w.member.user_id,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn delete_requires_rights() {
        let w = world();
        let task = new_task(&w, &w.owner, "t");
        assert_eq!(
            delete(&w.db, &w.member, TaskRef { task_id: task.id })
                .unwrap_err()
                .code(),
            "forbidden"
        );
        delete(&w.db, &w.owner, TaskRef { task_id: task.id }).unwrap();
        assert_eq!(
            w.db.get_task(task.id).unwrap_err().code(),
            "task_not_found"
        );
    }

    #[test]
    fn due_dates_past_year_9999_are_rejected() {
        let w = world();
        let far = NaiveDate::from_ymd_opt(10_000, 1, 1);
        let err = create(
            &w.db,
            &w.owner,
            CreateTaskInput {
                project_id: w.project.id,
                title: "far".into(),
                due_date: far,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let task = new_task(&w, &w.owner, "near");
        let err = update(
            &w.db,
            &w.owner,
            UpdateTaskInput {
                task_id: task.id,
                due_date: far,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(w.db.get_task(task.id).unwrap().due_date.is_none());
    }
}
