
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{RagError, Result};

pub const LOCK_FILE_NAME: &str = ".indexing.lock";

/// A lock file untouched for this long belongs to a crashed process
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(10 * 60);

/// Advisory lock held for the duration of an indexing pass; released on drop.
///
/// The first line of the file identifies the holder. A holder that was taken
/// over never removes its successor's file.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
    token: String,
}

impl IndexLock {
    #[inline]
    pub fn acquire(persist_dir: &Path) -> Result<Self> {
        Self::acquire_with_stale_age(persist_dir, STALE_LOCK_AGE)
    }

    #[inline]
    pub fn acquire_with_stale_age(persist_dir: &Path, stale_age: Duration) -> Result<Self> {
        fs::create_dir_all(persist_dir)?;
        let path = persist_dir.join(LOCK_FILE_NAME);

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !Self::is_stale(&path, stale_age)? {
                    return Err(RagError::Store(format!(
                        "Another indexing pass is running (lock file {})",
                        path.display()
                    )));
                }

                warn!("Taking over stale indexing lock at {}", path.display());
                fs::remove_file(&path)?;
                Self::create(&path).map_err(RagError::Io)
            }
            Err(e) => Err(RagError::Io(e)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let token = format!("{} {}", std::process::id(), Uuid::new_v4());
        Self::write_token(path, file, token)
    }

    /// Finish creating the lock by writing the holder token; the file is
    /// removed again if that fails
    fn write_token<W: Write>(path: &Path, mut file: W, token: String) -> std::io::Result<Self> {
        if let Err(e) = writeln!(file, "{}\n{}", token, Utc::now().to_rfc3339()) {
            if let Err(remove_error) = fs::remove_file(path) {
                warn!(
                    "Failed to remove half-written lock {}: {}",
                    path.display(),
                    remove_error
                );
            }
            return Err(e);
        }

        debug!("Acquired indexing lock at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            token,
        })
    }

    fn is_stale(path: &Path, stale_age: Duration) -> Result<bool> {
        let modified = fs::metadata(path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age >= stale_age)
    }

    /// Whether the lock file on disk still carries this holder's token
    #[inline]
    pub fn is_held(&self) -> bool {
        fs::read_to_string(&self.path)
            .is_ok_and(|contents| contents.lines().next() == Some(self.token.as_str()))
    }

    /// Mark the lock as alive so long passes are not mistaken for crashed ones.
    ///
    /// Fails if another pass has taken the lock over in the meantime.
    #[inline]
    pub fn refresh(&self) -> Result<()> {
        if !self.is_held() {
            return Err(RagError::Store(format!(
                "Indexing lock {} was taken over by another pass",
                self.path.display()
            )));
        }

        File::options()
            .write(true)
            .open(&self.path)?
            .set_modified(SystemTime::now())?;
        Ok(())
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    #[inline]
    fn drop(&mut self) {
        if !self.is_held() {
            debug!("Indexing lock {} is no longer ours", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove indexing lock {}: {}", self.path.display(), e);
        }
    }
}
