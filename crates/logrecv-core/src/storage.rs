//! Filesystem persistence shared by the object writer and the multipart
//! coordinator.
//!
//! Objects live at `<root><bucket>/<key>`. Every whole-file write goes to a
//! uniquely named sibling first and is renamed over the destination, so a reader
//! never observes a half written file and concurrent writers of the same path
//! resolve to last-writer-wins. Appends to the same path are serialized through
//! a per-path async mutex so their bytes never interleave.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::error::StoreError;

/// Filesystem object store rooted at one directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    append_locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl FsStore {
    /// Create a store rooted at `root`. Nothing is touched on disk yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append_locks: DashMap::new(),
        }
    }

    /// Directory of a bucket path such as `/20210503`.
    pub fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let mut dir = self.root.clone();
        for segment in bucket.split('/').filter(|s| !s.is_empty()) {
            validate_segment(segment, bucket)?;
            dir.push(segment);
        }
        Ok(dir)
    }

    /// Destination of `key` inside `bucket`.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains('/') {
            return Err(StoreError::InvalidObjectName(key.to_owned()));
        }
        validate_segment(key, key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    /// Per-day aggregate file of a bucket: `<bucket>/<YYYYMMDD>.log` in UTC.
    pub fn aggregate_path(&self, bucket: &str, now: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        Ok(self
            .bucket_dir(bucket)?
            .join(format!("{}.log", now.format("%Y%m%d"))))
    }

    /// Append `data` to `path`, creating the file and its parents if needed.
    ///
    /// Appends to the same path never interleave; each call issues one write.
    pub async fn append(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }

        let lock = self
            .append_locks
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            append_file(path, data).await
        };
        drop(lock);
        // Only the map holds the lock once no other append is in flight.
        self.append_locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);

        result.map_err(|source| StoreError::ObjectWriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        trace!(path = %path.display(), size = data.len(), "appended to aggregate file");
        Ok(())
    }

    #[cfg(test)]
    fn append_locks_in_use(&self) -> usize {
        self.append_locks.len()
    }
}

async fn append_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Create `dir` and all its parents. Succeeds if it already exists.
pub async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| StoreError::DirectoryCreateFailed {
            path: dir.to_path_buf(),
            source,
        })
}

/// Temporary sibling used to stage a whole-file write to `path`.
#[must_use]
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Write `data` to `path` atomically: write a temporary sibling, then rename it
/// over the destination. Parent directories are created as needed.
///
/// `on_error` turns a write or rename failure into the caller's error variant.
async fn write_atomic<F>(path: &Path, data: &[u8], on_error: F) -> Result<(), StoreError>
where
    F: FnOnce(PathBuf, std::io::Error) -> StoreError,
{
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = write_then_rename(&tmp, path, data).await {
        discard(&tmp).await;
        return Err(on_error(path.to_path_buf(), e));
    }

    debug!(path = %path.display(), size = data.len(), "wrote file");
    Ok(())
}

/// [`write_atomic`] for object destinations.
pub async fn write_object(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    write_atomic(path, data, |path, source| StoreError::ObjectWriteFailed {
        path,
        source,
    })
    .await
}

/// Create `path` holding exactly `data`, synced to disk.
pub async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    write_file(tmp, data).await?;
    tokio::fs::rename(tmp, path).await
}

/// Remove a file, ignoring "not found" and logging anything else.
pub async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}

/// Reject path segments that would escape the root directory.
fn validate_segment(segment: &str, name: &str) -> Result<(), StoreError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !segment.contains('\0') => Ok(()),
        _ => Err(StoreError::InvalidObjectName(name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_should_map_bucket_and_key_below_root() {
        let store = FsStore::new("/srv/logs");
        assert_eq!(
            store.object_path("/20210503", "file.log").unwrap(),
            PathBuf::from("/srv/logs/20210503/file.log")
        );
        assert_eq!(
            store.object_path("/", "file").unwrap(),
            PathBuf::from("/srv/logs/file")
        );
        assert_eq!(
            store.object_path("/a/b", "c").unwrap(),
            PathBuf::from("/srv/logs/a/b/c")
        );
    }

    #[test]
    fn test_should_reject_escaping_names() {
        let store = FsStore::new("/srv/logs");
        assert!(matches!(
            store.object_path("/..", "passwd"),
            Err(StoreError::InvalidObjectName(_))
        ));
        assert!(matches!(
            store.object_path("/ok", ".."),
            Err(StoreError::InvalidObjectName(_))
        ));
        assert!(matches!(
            store.object_path("/ok", ""),
            Err(StoreError::InvalidObjectName(_))
        ));
        assert!(matches!(
            store.object_path("/a/./b", "c"),
            Err(StoreError::InvalidObjectName(_))
        ));
    }

    #[test]
    fn test_should_name_aggregate_file_by_utc_day() {
        let store = FsStore::new("/srv/logs");
        let now = Utc.with_ymd_and_hms(2021, 5, 3, 23, 59, 59).unwrap();
        assert_eq!(
            store.aggregate_path("/20210503", now).unwrap(),
            PathBuf::from("/srv/logs/20210503/20210503.log")
        );
    }

    #[tokio::test]
    async fn test_should_write_atomically_and_create_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.log");

        write_object(&path, b"first").await.unwrap();
        write_object(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("a/b"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_should_append_without_interleaving() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStore::new(dir.path()));
        let path = dir.path().join("bucket/20210503.log");

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let store = Arc::clone(&store);
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                let chunk = vec![b'a' + i; 4096];
                store.append(&path, &chunk).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let data = tokio::fs::read(&path).await.unwrap();
        assert_eq!(data.len(), 16 * 4096);
        for chunk in data.chunks(4096) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
        assert_eq!(store.append_locks_in_use(), 0);
    }

    #[tokio::test]
    async fn test_should_release_append_lock_after_each_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        for day in ["20210503", "20210504", "20210505"] {
            let path = dir.path().join(format!("bucket/{day}.log"));
            store.append(&path, b"line\n").await.unwrap();
        }

        assert_eq!(store.append_locks_in_use(), 0);
        assert_eq!(
            std::fs::read(dir.path().join("bucket/20210504.log")).unwrap(),
            b"line\n"
        );
    }
}
