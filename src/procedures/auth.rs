//! `auth.*`: registration, login and the current session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Ack, required_text};
use crate::auth::{self, Authenticated};
use crate::config::Config;
use crate::error::{Result, TasklaneError};
use crate::model::{Role, User};
use crate::store::Db;

pub(crate) const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutput {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Validate and store a new account. Shared by registration, `admin.create_user`
/// and the operator CLI.
pub fn create_account(
    db: &Db,
    config: &Config,
    email: &str,
    name: &str,
    password: &str,
    role: Role,
) -> Result<User> {
    let email = auth::normalize_email(email)?;
    let name = required_text(name, "name", MAX_NAME_LEN)?;
    auth::validate_password(password, &config.auth)?;
    let hash = auth::hash_password(password, config.auth.hash_iterations)?;
    let user = db.insert_user(&email, &name, &hash, role)?;
    info!(user_id = user.id, role = %user.role, "account created");
    Ok(user)
}

/// Self-service sign-up. The very first account becomes an administrator.
pub fn register(db: &Db, config: &Config, input: RegisterInput) -> Result<User> {
    db.atomically(|db| {
        let existing = db.count_users()?;
        if existing > 0 && !config.auth.allow_registration {
            return Err(TasklaneError::RegistrationClosed);
        }
        let role = if existing == 0 { Role::Admin } else { Role::Member };
        create_account(db, config, &input.email, &input.name, &input.password, role)
    })
}

pub fn login(db: &Db, config: &Config, input: LoginInput) -> Result<LoginOutput> {
    let Ok(email) = auth::normalize_email(&input.email) else {
        return Err(TasklaneError::InvalidCredentials);
    };
    let Some((user, hash)) = db.find_user_credentials(&email)? else {
        warn!("login for unknown account");
        return Err(TasklaneError::InvalidCredentials);
    };
    if !auth::verify_password(&input.password, &hash) {
        warn!(user_id = user.id, "login with wrong password");
        return Err(TasklaneError::InvalidCredentials);
    }
    if !user.active {
        warn!(user_id = user.id, "login to disabled account");
        return Err(TasklaneError::AccountDisabled);
    }
    db.prune_expired_sessions(Utc::now())?;
    let session = auth::issue_session(db, user.id, &config.auth)?;
    info!(user_id = user.id, "session issued");
    Ok(LoginOutput {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

pub fn logout(db: &Db, caller: &Authenticated) -> Result<Ack> {
    db.delete_session(&caller.token_hash)?;
    Ok(Ack::OK)
}

pub fn me(caller: &Authenticated) -> User {
    caller.user.clone()
}
