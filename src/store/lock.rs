use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{Result, TasklaneError};

/// Acquire an exclusive lock on a file, returning the locked File handle.
/// The lock is released when the File is dropped. The holder's pid is
/// written into the file for diagnostics.
pub fn acquire_lock(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    file.try_lock_exclusive()
        .map_err(|_| TasklaneError::Locked(path.display().to_string()))?;

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}
