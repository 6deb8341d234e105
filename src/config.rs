//! Workspace configuration.
//!
//! Values are layered with figment, highest precedence last:
//! 1. built-in defaults
//! 2. `.tasklane/config.toml`
//! 3. `TASKLANE_` environment variables, with `__` between section and key
//!    (e.g. `TASKLANE_SERVER__PORT=9000`)

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TasklaneError};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Written by `tasklane init`; every key is optional.
pub const DEFAULT_CONFIG_TOML: &str = r#"# tasklane workspace configuration

[server]
bind = "127.0.0.1"
port = 7420

[auth]
session_ttl_hours = 168
min_password_len = 8
allow_registration = true
hash_iterations = 60000

[storage]
# database_path = "/var/lib/tasklane/tasklane.db"
max_attachment_bytes = 26214400
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: u32,
    pub min_password_len: usize,
    /// When false, only the very first account may self-register.
    pub allow_registration: bool,
    /// SHA-256 rounds for new password hashes; existing hashes keep their own count.
    pub hash_iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to `.tasklane/tasklane.db` inside the workspace.
    pub database_path: Option<PathBuf>,
    /// Upper bound recorded for attachment metadata; bytes live in external storage.
    pub max_attachment_bytes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 7420,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 168,
            min_password_len: 8,
            allow_registration: true,
            hash_iterations: 60_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_attachment_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration for the workspace whose `.tasklane/` directory is `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_from(&dir.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(config_file: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("TASKLANE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }
        if self.server.bind.trim().is_empty() {
            return Err(invalid("server.bind must not be empty"));
        }
        if self.auth.session_ttl_hours == 0 {
            return Err(invalid("auth.session_ttl_hours must be greater than 0"));
        }
        if self.auth.min_password_len < 6 {
            return Err(invalid(format!(
                "auth.min_password_len ({}) must be at least 6",
                self.auth.min_password_len
            )));
        }
        if self.auth.hash_iterations < 1_000 {
            return Err(invalid("auth.hash_iterations must be at least 1000"));
        }
        if self.storage.max_attachment_bytes <= 0 {
            return Err(invalid("storage.max_attachment_bytes must be greater than 0"));
        }
        Ok(())
    }

    /// Resolve the database path; relative overrides are taken relative to `dir`.
    pub fn database_path(&self, dir: &Path) -> PathBuf {
        match &self.storage.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => dir.join(path),
            None => dir.join(crate::store::workspace::DB_FILE_NAME),
        }
    }
}

fn invalid(message: impl Into<String>) -> TasklaneError {
    TasklaneError::invalid(format!("config: {}", message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_toml_matches_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, DEFAULT_CONFIG_TOML).unwrap();
        let parsed: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[server]\nport = 9100\n[auth]\nallow_registration = false\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert!(!cfg.auth.allow_registration);
        assert_eq!(cfg.auth.session_ttl_hours, 168);
    }

    #[test]
    fn rejects_short_password_policy() {
        let mut cfg = Config::default();
        cfg.auth.min_password_len = 3;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn database_path_resolution() {
        let dir = Path::new("/srv/ws/.tasklane");
        let mut cfg = Config::default();
        assert_eq!(cfg.database_path(dir), dir.join("tasklane.db"));
        cfg.storage.database_path = Some(PathBuf::from("other.db"));
        assert_eq!(cfg.database_path(dir), dir.join("other.db"));
        cfg.storage.database_path = Some(PathBuf::from("/abs/x.db"));
        assert_eq!(cfg.database_path(dir), PathBuf::from("/abs/x.db"));
    }
}
