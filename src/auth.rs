//! Credentials and sessions.
//!
//! Passwords are stored as `sha256$<rounds>$<salt-hex>$<hash-hex>`. Session
//! tokens are 32 random bytes handed to the client once; the database only
//! keeps their SHA-256 digest.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::access::Actor;
use crate::config::AuthConfig;
use crate::error::{Result, TasklaneError};
use crate::model::User;
use crate::store::Db;

const HASH_SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0_u8; N];
    getrandom::fill(&mut bytes)
        .map_err(|e| TasklaneError::Io(std::io::Error::other(e.to_string())))?;
    Ok(bytes)
}

fn derive(password: &str, salt: &[u8], rounds: u32) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..rounds {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize();
    }
    digest.to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn hash_password(password: &str, rounds: u32) -> Result<String> {
    let salt = random_bytes::<SALT_LEN>()?;
    let hash = derive(password, &salt, rounds);
    Ok(format!(
        "{HASH_SCHEME}${rounds}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), hex::decode(salt), hex::decode(hash))
    else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    constant_time_eq(&derive(password, &salt, rounds), &expected)
}

pub fn generate_token() -> Result<String> {
    Ok(hex::encode(random_bytes::<TOKEN_LEN>()?))
}

pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Lower-case and trim; require exactly one `@` with text on both sides, no
/// whitespace, and a domain that neither starts nor ends with `.`.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(TasklaneError::invalid(format!("'{}' is not a valid email", raw.trim())))
    }
}

pub fn validate_password(password: &str, config: &AuthConfig) -> Result<()> {
    if password.chars().count() < config.min_password_len {
        return Err(TasklaneError::invalid(format!(
            "password must be at least {} characters",
            config.min_password_len
        )));
    }
    Ok(())
}

/// A freshly issued session; `token` is only ever shown here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_session(db: &Db, user_id: i64, config: &AuthConfig) -> Result<IssuedSession> {
    let token = generate_token()?;
    let expires_at = Utc::now() + Duration::hours(i64::from(config.session_ttl_hours));
    db.insert_session(&token_digest(&token), user_id, expires_at)?;
    Ok(IssuedSession { token, expires_at })
}

/// The caller behind a valid session token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub token_hash: String,
}

impl Authenticated {
    pub fn actor(&self) -> Actor {
        Actor::from(&self.user)
    }
}

/// Resolve a bearer token to its user. Expired sessions are removed on sight.
pub fn authenticate(db: &Db, token: Option<&str>) -> Result<Authenticated> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(TasklaneError::Unauthorized)?;
    let token_hash = token_digest(token);
    let Some(session) = db.find_session(&token_hash)? else {
        warn!("rejected unknown session token");
        return Err(TasklaneError::Unauthorized);
    };
    if session.expires_at <= Utc::now() {
        db.delete_session(&token_hash)?;
        return Err(TasklaneError::SessionExpired);
    }
    let user = db.get_user(session.user_id)?;
    if !user.active {
        warn!(user_id = user.id, "session used by disabled account");
        return Err(TasklaneError::AccountDisabled);
    }
    Ok(Authenticated { user, token_hash })
}
