pub mod activity;
pub mod comments;
pub mod db;
pub mod lock;
pub mod milestones;
pub mod projects;
pub mod sessions;
pub mod tasks;
pub mod time_entries;
pub mod users;
pub mod workspace;

pub use db::Db;
