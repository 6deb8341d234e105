//! Name-based dispatch of JSON procedure calls.
//!
//! Both the HTTP server and `tasklane call` funnel through [`dispatch`]: the
//! procedure name selects an input type, the JSON input is deserialized into
//! it, the caller is authenticated (unless the procedure is public) and the
//! typed output is serialized back to JSON.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::auth;
use crate::config::Config;
use crate::error::{Result, TasklaneError};
use crate::procedures::{
    attachments, auth as auth_procs, comments, milestones, projects, tasks, time, users,
};
use crate::store::Db;

/// Everything a procedure call needs besides its input.
pub struct Context<'a> {
    pub db: &'a Db,
    pub config: &'a Config,
    /// Bearer token presented by the caller, if any.
    pub token: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Procedure {
    pub name: &'static str,
    /// Callable without a session.
    pub public: bool,
    pub summary: &'static str,
}

const fn public(name: &'static str, summary: &'static str) -> Procedure {
    Procedure {
        name,
        public: true,
        summary,
    }
}

const fn authed(name: &'static str, summary: &'static str) -> Procedure {
    Procedure {
        name,
        public: false,
        summary,
    }
}

pub const PROCEDURES: &[Procedure] = &[
    public("auth.register", "create an account; the first one becomes admin"),
    public("auth.login", "exchange email and password for a session token"),
    authed("auth.logout", "end the current session"),
    authed("auth.me", "the signed-in user"),
    authed("user.update_profile", "change your name or email"),
    authed("user.change_password", "change your password and sign out elsewhere"),
    authed("admin.list_users", "list every account"),
    authed("admin.create_user", "create an account with a chosen role"),
    authed("admin.set_role", "promote or demote an account"),
    authed("admin.set_active", "enable or disable an account"),
    authed("admin.reset_password", "set a new password for an account"),
    authed("admin.delete_user", "delete an account"),
    authed("project.create", "create a project you own"),
    authed("project.list", "projects you own or belong to"),
    authed("project.get", "one project"),
    authed("project.update", "rename or describe a project"),
    authed("project.archive", "archive or restore a project"),
    authed("project.delete", "delete a project and everything in it"),
    authed("project.members", "owner and members of a project"),
    authed("project.add_member", "add a member"),
    authed("project.remove_member", "remove a member and their assignments"),
    authed("project.leave", "leave a project you are a member of"),
    authed("project.transfer", "hand ownership to a member"),
    authed("project.activity", "recent activity, newest first"),
    authed("milestone.create", "add a milestone"),
    authed("milestone.list", "milestones by due date"),
    authed("milestone.update", "edit or complete a milestone"),
    authed("milestone.delete", "delete a milestone, keeping its tasks"),
    authed("task.create", "create a task"),
    authed("task.get", "one task"),
    authed("task.list", "a project's tasks, most urgent first"),
    authed("task.mine", "tasks assigned to you"),
    authed("task.update", "edit a task"),
    authed("task.set_status", "move a task through its workflow"),
    authed("task.delete", "delete a task"),
    authed("task.assign", "add an assignee"),
    authed("task.unassign", "remove an assignee"),
    authed("comment.create", "comment on a task"),
    authed("comment.list", "comments on a task"),
    authed("comment.update", "edit your comment"),
    authed("comment.delete", "delete a comment"),
    authed("attachment.create", "record an uploaded file"),
    authed("attachment.list", "files attached to a task"),
    authed("attachment.delete", "remove an attachment record"),
    authed("time.log", "log minutes against a task"),
    authed("time.start", "start your timer on a task"),
    authed("time.stop", "stop your running timer"),
    authed("time.running", "your running timer, if any"),
    authed("time.list", "time entries on a task"),
    authed("time.update", "change a finished entry"),
    authed("time.delete", "delete an entry"),
    authed("time.summary", "minutes per user and task in a project"),
];

pub fn find(name: &str) -> Option<&'static Procedure> {
    PROCEDURES.iter().find(|p| p.name == name)
}

fn parse<T: DeserializeOwned>(input: Value) -> Result<T> {
    Ok(serde_json::from_value(input)?)
}

fn reply<T: Serialize>(output: Result<T>) -> Result<Value> {
    Ok(serde_json::to_value(output?)?)
}

/// Call procedure `name` with JSON `input`. `null` input counts as `{}`.
pub fn dispatch(ctx: &Context<'_>, name: &str, input: Value) -> Result<Value> {
    let procedure = find(name).ok_or_else(|| TasklaneError::UnknownProcedure(name.to_string()))?;
    let input = match input {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    debug!(procedure = name, "dispatching");
    let (db, config) = (ctx.db, ctx.config);

    if procedure.public {
        return match name {
            "auth.register" => reply(auth_procs::register(db, config, parse(input)?)),
            "auth.login" => reply(auth_procs::login(db, config, parse(input)?)),
            _ => Err(TasklaneError::UnknownProcedure(name.to_string())),
        };
    }

    let caller = auth::authenticate(db, ctx.token)?;
    let actor = caller.actor();
    let actor = &actor;
    match name {
        "auth.logout" => reply(auth_procs::logout(db, &caller)),
        "auth.me" => reply(Ok(auth_procs::me(&caller))),

        "user.update_profile" => reply(users::update_profile(db, actor, parse(input)?)),
        "user.change_password" => {
            reply(users::change_password(db, config, &caller, parse(input)?))
        }

        "admin.list_users" => reply(users::list_users(db, actor)),
        "admin.create_user" => reply(users::create_user(db, config, actor, parse(input)?)),
        "admin.set_role" => reply(users::set_role(db, actor, parse(input)?)),
        "admin.set_active" => reply(users::set_active(db, actor, parse(input)?)),
        "admin.reset_password" => {
            reply(users::reset_password(db, config, actor, parse(input)?))
        }
        "admin.delete_user" => reply(users::delete_user(db, actor, parse(input)?)),

        "project.create" => reply(projects::create(db, actor, parse(input)?)),
        "project.list" => reply(projects::list(db, actor, parse(input)?)),
        "project.get" => reply(projects::get(db, actor, parse(input)?)),
        "project.update" => reply(projects::update(db, actor, parse(input)?)),
        "project.archive" => reply(projects::archive(db, actor, parse(input)?)),
        "project.delete" => reply(projects::delete(db, actor, parse(input)?)),
        "project.members" => reply(projects::members(db, actor, parse(input)?)),
        "project.add_member" => reply(projects::add_member(db, actor, parse(input)?)),
        "project.remove_member" => reply(projects::remove_member(db, actor, parse(input)?)),
        "project.leave" => reply(projects::leave(db, actor, parse(input)?)),
        "project.transfer" => reply(projects::transfer(db, actor, parse(input)?)),
        "project.activity" => reply(projects::activity(db, actor, parse(input)?)),

        "milestone.create" => reply(milestones::create(db, actor, parse(input)?)),
        "milestone.list" => reply(milestones::list(db, actor, parse(input)?)),
        "milestone.update" => reply(milestones::update(db, actor, parse(input)?)),
        "milestone.delete" => reply(milestones::delete(db, actor, parse(input)?)),

        "task.create" => reply(tasks::create(db, actor, parse(input)?)),
        "task.get" => reply(tasks::get(db, actor, parse(input)?)),
        "task.list" => reply(tasks::list(db, actor, parse(input)?)),
        "task.mine" => reply(tasks::mine(db, actor, parse(input)?)),
        "task.update" => reply(tasks::update(db, actor, parse(input)?)),
        "task.set_status" => reply(tasks::set_status(db, actor, parse(input)?)),
        "task.delete" => reply(tasks::delete(db, actor, parse(input)?)),
        "task.assign" => reply(tasks::assign(db, actor, parse(input)?)),
        "task.unassign" => reply(tasks::unassign(db, actor, parse(input)?)),

        "comment.create" => reply(comments::create(db, actor, parse(input)?)),
        "comment.list" => reply(comments::list(db, actor, parse(input)?)),
        "comment.update" => reply(comments::update(db, actor, parse(input)?)),
        "comment.delete" => reply(comments::delete(db, actor, parse(input)?)),

        "attachment.create" => reply(attachments::create(db, config, actor, parse(input)?)),
        "attachment.list" => reply(attachments::list(db, actor, parse(input)?)),
        "attachment.delete" => reply(attachments::delete(db, actor, parse(input)?)),

        "time.log" => reply(time::log(db, actor, parse(input)?)),
        "time.start" => reply(time::start(db, actor, parse(input)?)),
        "time.stop" => reply(time::stop(db, actor, parse(input)?)),
        "time.running" => reply(time::running(db, actor, parse(input)?)),
        "time.list" => reply(time::list(db, actor, parse(input)?)),
        "time.update" => reply(time::update(db, actor, parse(input)?)),
        "time.delete" => reply(time::delete(db, actor, parse(input)?)),
        "time.summary" => reply(time::summary(db, actor, parse(input)?)),

        _ => Err(TasklaneError::UnknownProcedure(name.to_string())),
    }
}
