
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{RepoChatError, Result};

/// A lock older than this is assumed to belong to a crashed build
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Cross-process single-writer lock for index builds.
///
/// The lock file holds the acquisition time in unix seconds and is removed
/// when the guard is dropped.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    #[inline]
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match Self::create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_stale(path) {
                    return Err(RepoChatError::IndexBusy(path.display().to_string()));
                }

                warn!("Removing stale index lock at {}", path.display());
                fs::remove_file(path)?;
                Self::create(path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        RepoChatError::IndexBusy(path.display().to_string())
                    } else {
                        e.into()
                    }
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", Utc::now().timestamp())?;
        debug!("Acquired index lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove index lock {}: {}", self.path.display(), e);
        }
    }
}

/// Age is read from the timestamp in the file, falling back to its mtime
fn is_stale(path: &Path) -> bool {
    let written_at = fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i64>().ok());

    let age = match written_at {
        Some(seconds) => u64::try_from(Utc::now().timestamp() - seconds)
            .ok()
            .map(Duration::from_secs),
        None => fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok()),
    };

    age.is_some_and(|age| age > STALE_LOCK_AGE)
}
