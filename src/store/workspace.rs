use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE_NAME, Config, DEFAULT_CONFIG_TOML};
use crate::error::{Result, TasklaneError};
use crate::store::db::Db;

pub const WORKSPACE_DIR: &str = ".tasklane";
pub const DB_FILE_NAME: &str = "tasklane.db";
pub const SERVER_LOCK_FILE: &str = "server.lock";

/// An opened workspace: its `.tasklane/` directory, loaded config and database.
pub struct Workspace {
    pub dir: PathBuf,
    pub config: Config,
    pub db: Db,
}

impl Workspace {
    /// Create `.tasklane/` under `root` with a default config and an empty database.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);
        if dir.join(CONFIG_FILE_NAME).exists() {
            return Err(TasklaneError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(CONFIG_FILE_NAME), DEFAULT_CONFIG_TOML)?;
        Self::open(root)
    }

    /// Open the workspace rooted at `root` (the directory containing `.tasklane/`).
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);
        if !dir.is_dir() {
            return Err(TasklaneError::NotInitialized);
        }
        let config = Config::load(&dir)?;
        let db = Db::open(&config.database_path(&dir))?;
        Ok(Self { dir, config, db })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(SERVER_LOCK_FILE)
    }
}

/// Walk up from the current directory to the nearest directory holding `.tasklane/`.
pub fn find_workspace_root() -> Result<PathBuf> {
    let dir = std::env::current_dir().map_err(TasklaneError::Io)?;
    find_workspace_root_from(&dir)
}

pub fn find_workspace_root_from(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(WORKSPACE_DIR).is_dir() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(TasklaneError::NotInitialized);
        }
    }
}
