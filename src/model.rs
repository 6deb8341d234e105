use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Text-backed enums share one SQLite mapping: stored as their snake_case name.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                Self::parse(raw).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} '{}'", stringify!($ty), raw).into())
                })
            }
        }
    };
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

text_enum!(Role { Member => "member", Admin => "admin" });

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    InReview,
    Done,
    Cancelled,
}

text_enum!(TaskStatus {
    Todo => "todo",
    InProgress => "in_progress",
    InReview => "in_review",
    Done => "done",
    Cancelled => "cancelled",
});

impl TaskStatus {
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        match self {
            Self::Todo => matches!(target, Self::InProgress | Self::Done | Self::Cancelled),
            Self::InProgress => matches!(
                target,
                Self::Todo | Self::InReview | Self::Done | Self::Cancelled
            ),
            Self::InReview => matches!(target, Self::InProgress | Self::Done | Self::Cancelled),
            Self::Done => matches!(target, Self::Todo | Self::InProgress),
            Self::Cancelled => matches!(target, Self::Todo),
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

text_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

impl Priority {
    /// Sort key: lower rank sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: i64,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub is_owner: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// An unsaved task with defaults filled in; `Db::insert_task` assigns the id.
    pub fn draft(project_id: i64, title: &str, creator_id: Option<i64>) -> Self {
        let now = Utc::now();
        Task {
            id: 0,
            project_id,
            milestone_id: None,
            title: title.to_string(),
            description: None,
            status: TaskStatus::default(),
            priority: Priority::default(),
            due_date: None,
            creator_id,
            assignees: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.assignees.contains(&user_id)
    }

    /// Trim the title, drop blank descriptions, then sort and deduplicate assignees.
    pub fn normalize(&mut self) {
        let trimmed = self.title.trim();
        if trimmed.len() != self.title.len() {
            self.title = trimmed.to_string();
        }
        self.description = normalize_optional_text(self.description.take());
        self.assignees.sort_unstable();
        self.assignees.dedup();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub author_id: i64,
    pub body: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: i64,
    pub task_id: i64,
    pub uploader_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    pub id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub project_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<i64>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Blank or whitespace-only text collapses to `None`; anything else is trimmed.
pub fn normalize_optional_text(text: Option<String>) -> Option<String> {
    text.and_then(|t| {
        let trimmed = t.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: 1,
            project_id: 1,
            milestone_id: None,
            title: "Ship login".into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            due_date: None,
            creator_id: Some(1),
            assignees: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InReview).unwrap();
        assert_eq!(json, r#""in_review""#);
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn transition_table() {
        assert!(TaskStatus::Todo.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::InReview));
        assert!(TaskStatus::Done.can_transition_to(TaskStatus::Todo));
        assert!(!TaskStatus::Todo.can_transition_to(TaskStatus::InReview));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Done));
    }

    #[test]
    fn priority_rank_orders_urgent_first() {
        let mut all = vec![Priority::Low, Priority::Urgent, Priority::Medium, Priority::High];
        all.sort_by_key(|p| p.rank());
        assert_eq!(
            all,
            vec![Priority::Urgent, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn minimal_task_omits_optional_fields() {
        let json = serde_json::to_string(&sample_task()).unwrap();
        assert!(!json.contains("description"));
        assert!(!json.contains("milestone_id"));
        assert!(!json.contains("due_date"));
        assert!(!json.contains("assignees"));
    }

    #[test]
    fn normalize_trims_and_dedups() {
        let mut task = sample_task();
        task.title = "  padded  ".into();
        task.description = Some("   ".into());
        task.assignees = vec![3, 1, 3, 2];
        task.normalize();
        assert_eq!(task.title, "padded");
        assert_eq!(task.description, None);
        assert_eq!(task.assignees, vec![1, 2, 3]);
    }
}
