//! `user.*` (the caller's own account) and `admin.*` (account administration).

use serde::Deserialize;
use tracing::info;

use super::auth::{MAX_NAME_LEN, create_account};
use super::{Ack, required_text};
use crate::access::{self, Actor};
use crate::auth::{self, Authenticated};
use crate::config::Config;
use crate::error::{Result, TasklaneError};
use crate::model::{Role, User};
use crate::store::Db;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserInput {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleInput {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetActiveInput {
    pub user_id: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordInput {
    pub user_id: i64,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRef {
    pub user_id: i64,
}

// ---------------------------------------------------------------------------
// user.*
// ---------------------------------------------------------------------------

pub fn update_profile(db: &Db, actor: &Actor, input: UpdateProfileInput) -> Result<User> {
    let name = input
        .name
        .as_deref()
        .map(|n| required_text(n, "name", MAX_NAME_LEN))
        .transpose()?;
    let email = input.email.as_deref().map(auth::normalize_email).transpose()?;
    db.update_user_profile(actor.user_id, name.as_deref(), email.as_deref())
}

/// Change the caller's password; every other session of theirs is revoked.
pub fn change_password(
    db: &Db,
    config: &Config,
    caller: &Authenticated,
    input: ChangePasswordInput,
) -> Result<Ack> {
    let stored = db.password_hash(caller.user.id)?;
    if !auth::verify_password(&input.current_password, &stored) {
        return Err(TasklaneError::InvalidCredentials);
    }
    auth::validate_password(&input.new_password, &config.auth)?;
    let hash = auth::hash_password(&input.new_password, config.auth.hash_iterations)?;
    db.atomically(|db| {
        db.set_password_hash(caller.user.id, &hash)?;
        db.delete_user_sessions(caller.user.id, Some(&caller.token_hash))
    })?;
    Ok(Ack::OK)
}

// ---------------------------------------------------------------------------
// Account operations without an acting user (operator CLI) and their
// admin.* wrappers
// ---------------------------------------------------------------------------

/// Whether changing `target` away from an active admin would leave none.
fn would_orphan_admins(db: &Db, target: &User) -> Result<bool> {
    Ok(target.is_admin() && target.active && db.count_active_admins()? <= 1)
}

pub fn change_role(db: &Db, user_id: i64, role: Role) -> Result<User> {
    db.atomically(|db| {
        let target = db.get_user(user_id)?;
        if role != Role::Admin && would_orphan_admins(db, &target)? {
            return Err(TasklaneError::LastAdmin);
        }
        let user = db.set_user_role(user_id, role)?;
        info!(user_id, role = %role, "role changed");
        Ok(user)
    })
}

pub fn reset_user_password(db: &Db, config: &Config, user_id: i64, password: &str) -> Result<()> {
    auth::validate_password(password, &config.auth)?;
    let hash = auth::hash_password(password, config.auth.hash_iterations)?;
    db.atomically(|db| {
        db.set_password_hash(user_id, &hash)?;
        db.delete_user_sessions(user_id, None)
    })?;
    info!(user_id, "password reset");
    Ok(())
}

pub fn list_users(db: &Db, actor: &Actor) -> Result<Vec<User>> {
    access::require_admin(actor)?;
    db.list_users()
}

pub fn create_user(db: &Db, config: &Config, actor: &Actor, input: CreateUserInput) -> Result<User> {
    access::require_admin(actor)?;
    create_account(db, config, &input.email, &input.name, &input.password, input.role)
}

pub fn set_role(db: &Db, actor: &Actor, input: SetRoleInput) -> Result<User> {
    access::require_admin(actor)?;
    change_role(db, input.user_id, input.role)
}

/// Enable or disable an account. Disabling revokes its sessions.
pub fn set_active(db: &Db, actor: &Actor, input: SetActiveInput) -> Result<User> {
    access::require_admin(actor)?;
    if !input.active && actor.is(input.user_id) {
        return Err(TasklaneError::forbidden("administrators cannot disable themselves"));
    }
    db.atomically(|db| {
        let target = db.get_user(input.user_id)?;
        if !input.active && would_orphan_admins(db, &target)? {
            return Err(TasklaneError::LastAdmin);
        }
        let user = db.set_user_active(input.user_id, input.active)?;
        if !input.active {
            db.delete_user_sessions(input.user_id, None)?;
        }
        info!(user_id = input.user_id, active = input.active, "account status changed");
        Ok(user)
    })
}

pub fn reset_password(db: &Db, config: &Config, actor: &Actor, input: ResetPasswordInput) -> Result<Ack> {
    access::require_admin(actor)?;
    reset_user_password(db, config, input.user_id, &input.password)?;
    Ok(Ack::OK)
}

pub fn delete_user(db: &Db, actor: &Actor, input: UserRef) -> Result<Ack> {
    access::require_admin(actor)?;
    if actor.is(input.user_id) {
        return Err(TasklaneError::forbidden("administrators cannot delete themselves"));
    }
    db.atomically(|db| {
        let target = db.get_user(input.user_id)?;
        if would_orphan_admins(db, &target)? {
            return Err(TasklaneError::LastAdmin);
        }
        db.delete_user(input.user_id)
    })?;
    info!(user_id = input.user_id, "account deleted");
    Ok(Ack::OK)
}
