use thiserror::Error;

#[derive(Debug, Error)]
pub enum TasklaneError {
    #[error("not a tasklane workspace (run `tasklane init` first)")]
    NotInitialized,

    #[error("tasklane already initialized in this directory")]
    AlreadyInitialized,

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("session expired; log in again")]
    SessionExpired,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("registration is closed; ask an administrator for an account")]
    RegistrationClosed,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("project {0} not found")]
    ProjectNotFound(i64),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("milestone {0} not found")]
    MilestoneNotFound(i64),

    #[error("comment {0} not found")]
    CommentNotFound(i64),

    #[error("attachment {0} not found")]
    AttachmentNotFound(i64),

    #[error("time entry {0} not found")]
    TimeEntryNotFound(i64),

    #[error("email '{0}' is already registered")]
    EmailTaken(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid status transition: {0} -> {1}")]
    InvalidTransition(String, String),

    #[error("user {0} is not a member of project {1}")]
    NotProjectMember(i64, i64),

    #[error("user {0} is already a member of project {1}")]
    AlreadyMember(i64, i64),

    #[error("a timer is already running (time entry {0}); stop it first")]
    TimerRunning(i64),

    #[error("no running timer")]
    NoRunningTimer,

    #[error("operation would leave no active administrator")]
    LastAdmin,

    #[error("user {0} still owns projects; transfer or delete them first")]
    UserOwnsProjects(i64),

    #[error("unknown procedure '{0}'")]
    UnknownProcedure(String),

    #[error("config error: {0}")]
    Config(Box<figment::Error>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl From<figment::Error> for TasklaneError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl TasklaneError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::Locked(_) => "locked",
            Self::Unauthorized => "unauthorized",
            Self::SessionExpired => "session_expired",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::RegistrationClosed => "registration_closed",
            Self::Forbidden(_) => "forbidden",
            Self::UserNotFound(_) => "user_not_found",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::TaskNotFound(_) => "task_not_found",
            Self::MilestoneNotFound(_) => "milestone_not_found",
            Self::CommentNotFound(_) => "comment_not_found",
            Self::AttachmentNotFound(_) => "attachment_not_found",
            Self::TimeEntryNotFound(_) => "time_entry_not_found",
            Self::EmailTaken(_) => "email_taken",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidTransition(_, _) => "invalid_transition",
            Self::NotProjectMember(_, _) => "not_project_member",
            Self::AlreadyMember(_, _) => "already_member",
            Self::TimerRunning(_) => "timer_running",
            Self::NoRunningTimer => "no_running_timer",
            Self::LastAdmin => "last_admin",
            Self::UserOwnsProjects(_) => "user_owns_projects",
            Self::UnknownProcedure(_) => "unknown_procedure",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Db(_) => "db_error",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }
}

pub type Result<T> = std::result::Result<T, TasklaneError>;
