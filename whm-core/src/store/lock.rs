//! File lock that keeps outbox drains exclusive across processes.
//!
//! Every `whm` invocation opens its own store on the same database file, so
//! an in-process mutex isn't enough. The lock lives in `<database>.lock` next
//! to the database and is held for a whole flush cycle.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::{LocalStore, StoreError};

/// Exclusive drain lock on a database. Released on drop.
#[derive(Debug)]
pub struct DrainLock {
    file: File,
}

impl Drop for DrainLock {
    fn drop(&mut self) {
        // Closing the file releases the lock too
        let _ = FileExt::unlock(&self.file);
    }
}

pub(super) fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire(lock_path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    file.lock_exclusive()?;
    Ok(file)
}

impl LocalStore {
    /// Waits until no other process or store holds the drain lock, then
    /// takes it.
    pub async fn lock_drain(&self) -> Result<DrainLock, StoreError> {
        let path = self.lock_path.clone();
        let blocking_path = path.clone();

        let file = tokio::task::spawn_blocking(move || acquire(&blocking_path))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)))
            .map_err(|e| StoreError::Io(path.clone(), e))?;

        debug!(path = %path.display(), "Acquired drain lock");
        Ok(DrainLock { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_sits_next_to_database() {
        assert_eq!(
            lock_path(Path::new("/data/whm/whm.db")),
            PathBuf::from("/data/whm/whm.db.lock")
        );
    }

    #[tokio::test]
    async fn test_lock_excludes_other_store_on_same_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("whm.db");
        let first = LocalStore::open(&db_path).await.unwrap();
        let second = LocalStore::open(&db_path).await.unwrap();

        let held = first.lock_drain().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(200), second.lock_drain()).await;
        assert!(blocked.is_err(), "second store took the lock while it was held");

        drop(held);

        let acquired = tokio::time::timeout(Duration::from_secs(5), second.lock_drain()).await;
        assert!(acquired.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stores_on_different_files_do_not_contend() {
        let temp_dir = TempDir::new().unwrap();
        let a = LocalStore::open(&temp_dir.path().join("a.db")).await.unwrap();
        let b = LocalStore::open(&temp_dir.path().join("b.db")).await.unwrap();

        let _held = a.lock_drain().await.unwrap();
        let other = tokio::time::timeout(Duration::from_secs(5), b.lock_drain()).await;
        assert!(other.unwrap().is_ok());
    }
}
