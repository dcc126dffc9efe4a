//! Multipart upload coordination.
//!
//! An upload moves through `Initiated → PartsAccumulating → Completed`, or ends
//! in `Aborted` on an explicit abort or when the reaper finds it older than the
//! configured TTL. Sessions live in a concurrent map keyed by upload ID and make
//! no assumption about which connection delivers which request.
//!
//! Parts are staged as `<staging>/<uploadId>.<partNumber>.part`, each written
//! atomically so a retried part simply replaces the earlier bytes. A completion
//! freezes the session first: from then on parts, aborts and other completions
//! are refused until it fails or succeeds. Completion
//! copies the staged parts, in manifest order, into a temporary sibling of the
//! destination while hashing them, and renames it into place only after every
//! part was appended.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use rand::RngExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::checksums::Md5Hasher;
use crate::config::{Md5Policy, ReceiverConfig};
use crate::error::StoreError;
use crate::object::check_body;
use crate::storage::{FsStore, discard, ensure_dir, temp_sibling, write_file};

/// Highest part number S3 clients may use.
pub const MAX_PART_NUMBER: u32 = 10_000;

const PART_EXTENSION: &str = ".part";
const TEMP_EXTENSION: &str = ".tmp";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Generate an unguessable upload ID: 32 random bytes, hex encoded.
///
/// # Examples
///
/// ```
/// use logrecv_core::multipart::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert_eq!(id.len(), 64);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// State of one in-progress upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Bucket path recorded at initiation.
    pub bucket: String,
    /// Key recorded at initiation.
    pub key: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Part numbers staged so far.
    pub parts: BTreeSet<u32>,
    /// A completion is assembling the parts; the part set is frozen.
    pub completing: bool,
}

/// Result of a successful initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedUpload {
    /// Bucket path.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Freshly generated upload ID.
    pub upload_id: String,
}

/// One part as received from the wire.
#[derive(Debug, Clone)]
pub struct UploadPart<'a> {
    /// Upload the part belongs to.
    pub upload_id: &'a str,
    /// Part number, `1..=10000`.
    pub part_number: u32,
    /// The complete part body.
    pub body: Bytes,
    /// Value of `Content-Length`.
    pub content_length: u64,
    /// Value of `Content-MD5`, if present.
    pub content_md5: Option<&'a str>,
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    /// `https://<domain><bucket>/<key>`.
    pub location: String,
    /// Bucket path.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Quoted hex MD5 of the assembled object.
    pub etag: String,
    /// File holding the assembled object.
    pub path: PathBuf,
    /// Size of the assembled object.
    pub size: u64,
}

/// What one reaper pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Expired sessions dropped.
    pub sessions: usize,
    /// Staged files deleted.
    pub files: usize,
}

/// Tracks multipart sessions and assembles their parts.
#[derive(Debug)]
pub struct MultipartCoordinator {
    store: Arc<FsStore>,
    staging_dir: PathBuf,
    domain: String,
    md5_policy: Md5Policy,
    upload_ttl: Duration,
    sessions: DashMap<String, UploadSession>,
}

impl MultipartCoordinator {
    /// Create a coordinator that assembles objects into `store`.
    #[must_use]
    pub fn new(store: Arc<FsStore>, config: &ReceiverConfig) -> Self {
        Self {
            store,
            staging_dir: config.staging_dir.clone(),
            domain: config.domain.clone(),
            md5_policy: config.md5_policy,
            upload_ttl: config.upload_ttl(),
            sessions: DashMap::new(),
        }
    }

    /// Number of uploads currently in progress.
    #[must_use]
    pub fn active_uploads(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn session(&self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.get(upload_id).map(|s| s.value().clone())
    }

    /// Staging path of a part.
    #[must_use]
    pub fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.staging_dir
            .join(format!("{upload_id}.{part_number}{PART_EXTENSION}"))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start an upload targeting `bucket`/`key`.
    pub fn initiate(&self, bucket: &str, key: &str) -> Result<InitiatedUpload, StoreError> {
        self.store.object_path(bucket, key)?;

        let upload_id = generate_upload_id();
        self.sessions.insert(
            upload_id.clone(),
            UploadSession {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                initiated: Utc::now(),
                parts: BTreeSet::new(),
                completing: false,
            },
        );

        info!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        Ok(InitiatedUpload {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id,
        })
    }

    /// Stage one part and return its ETag (the declared `Content-MD5`).
    ///
    /// Re-uploading a part number replaces the earlier bytes.
    pub async fn upload_part(&self, req: UploadPart<'_>) -> Result<String, StoreError> {
        if !(1..=MAX_PART_NUMBER).contains(&req.part_number) {
            return Err(StoreError::InvalidPartNumber(req.part_number));
        }
        self.check_open(req.upload_id)?;

        let etag = check_body(
            &req.body,
            req.content_length,
            req.content_md5,
            self.md5_policy,
        )?;

        let path = self.part_path(req.upload_id, req.part_number);
        let write_failed = |source| StoreError::PartWriteFailed {
            path: path.clone(),
            source,
        };
        ensure_dir(&self.staging_dir).await?;
        let tmp = temp_sibling(&path);
        if let Err(e) = write_file(&tmp, &req.body).await {
            discard(&tmp).await;
            return Err(write_failed(e));
        }

        // Publish under the session entry so a completion either sees the new
        // bytes or rejects this part; a frozen part set is never touched.
        let published = match self.sessions.get_mut(req.upload_id) {
            None => Err(StoreError::NoSuchUpload(req.upload_id.to_owned())),
            Some(session) if session.completing => {
                Err(StoreError::UploadCompleting(req.upload_id.to_owned()))
            }
            Some(mut session) => std::fs::rename(&tmp, &path)
                .map(|()| {
                    session.parts.insert(req.part_number);
                })
                .map_err(write_failed),
        };
        if let Err(err) = published {
            discard(&tmp).await;
            return Err(err);
        }

        debug!(
            upload_id = req.upload_id,
            part_number = req.part_number,
            size = req.body.len(),
            "staged part"
        );
        Ok(etag)
    }

    /// Assemble the parts listed in `manifest`, in that order, into the object
    /// recorded at initiation.
    ///
    /// Nothing is written to the destination unless every listed part is
    /// staged. On failure the session stays open so the client may retry.
    pub async fn complete(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        manifest: &[u32],
    ) -> Result<CompletedUpload, StoreError> {
        // Freeze the session so concurrent completions cannot both assemble it
        // and no part can be replaced underneath the assembly.
        let session = {
            let Some(mut entry) = self.sessions.get_mut(upload_id) else {
                return Err(StoreError::NoSuchUpload(upload_id.to_owned()));
            };
            if entry.completing {
                return Err(StoreError::UploadCompleting(upload_id.to_owned()));
            }
            entry.completing = true;
            entry.clone()
        };

        match self.assemble(upload_id, &session, bucket, key, manifest).await {
            Ok(done) => {
                self.sessions.remove(upload_id);
                let removed = self.discard_parts(upload_id, &session.parts).await;
                info!(
                    upload_id,
                    bucket,
                    key,
                    parts = manifest.len(),
                    size = done.size,
                    staged_removed = removed,
                    "completed multipart upload"
                );
                Ok(done)
            }
            Err(err) => {
                if let Some(mut entry) = self.sessions.get_mut(upload_id) {
                    entry.completing = false;
                }
                Err(err)
            }
        }
    }

    /// Drop an upload and delete its staged parts.
    pub async fn abort(&self, upload_id: &str) -> Result<(), StoreError> {
        self.check_open(upload_id)?;
        let Some((_, session)) = self.sessions.remove_if(upload_id, |_, s| !s.completing) else {
            return Err(StoreError::UploadCompleting(upload_id.to_owned()));
        };
        let removed = self.discard_parts(upload_id, &session.parts).await;
        info!(
            upload_id,
            bucket = %session.bucket,
            key = %session.key,
            staged_removed = removed,
            "aborted multipart upload"
        );
        Ok(())
    }

    async fn assemble(
        &self,
        upload_id: &str,
        session: &UploadSession,
        bucket: &str,
        key: &str,
        manifest: &[u32],
    ) -> Result<CompletedUpload, StoreError> {
        if session.bucket != bucket || session.key != key {
            return Err(StoreError::UploadTargetMismatch {
                upload_id: upload_id.to_owned(),
                expected: join_target(&session.bucket, &session.key),
                requested: join_target(bucket, key),
            });
        }
        if manifest.is_empty() {
            return Err(StoreError::MalformedManifest);
        }

        let mut sources = Vec::with_capacity(manifest.len());
        for &part_number in manifest {
            let path = self.part_path(upload_id, part_number);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => sources.push((part_number, path)),
                Ok(_) => return Err(part_not_found(upload_id, part_number)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(part_not_found(upload_id, part_number));
                }
                Err(source) => return Err(StoreError::PartReadFailed { path, source }),
            }
        }

        let dest = self.store.object_path(&session.bucket, &session.key)?;
        if let Some(parent) = dest.parent() {
            ensure_dir(parent).await?;
        }

        let tmp = temp_sibling(&dest);
        let (etag, size) = match concatenate(upload_id, &sources, &tmp, &dest).await {
            Ok(assembled) => assembled,
            Err(err) => {
                discard(&tmp).await;
                return Err(err);
            }
        };

        Ok(CompletedUpload {
            location: self.location(&session.bucket, &session.key),
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            etag,
            path: dest,
            size,
        })
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("https://{}{}", self.domain, join_target(bucket, key))
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Fail unless `upload_id` names a session that is not being completed.
    fn check_open(&self, upload_id: &str) -> Result<(), StoreError> {
        match self.sessions.get(upload_id) {
            None => Err(StoreError::NoSuchUpload(upload_id.to_owned())),
            Some(session) if session.completing => {
                Err(StoreError::UploadCompleting(upload_id.to_owned()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Delete the staged files of `parts`. Returns how many were removed.
    async fn discard_parts(&self, upload_id: &str, parts: &BTreeSet<u32>) -> usize {
        let mut removed = 0;
        for &part_number in parts {
            if remove_staged(&self.part_path(upload_id, part_number)).await {
                removed += 1;
            }
        }
        removed
    }

    /// Drop sessions initiated more than the TTL before `now` together with
    /// their parts, and delete staged files older than the TTL that belong to
    /// no live session.
    ///
    /// Failures are logged and skipped.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> ReapStats {
        let mut stats = ReapStats::default();
        let Some(cutoff) = TimeDelta::from_std(self.upload_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return stats;
        };

        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.initiated < cutoff && !entry.completing)
            .map(|entry| entry.key().clone())
            .collect();
        for upload_id in expired {
            if let Some((_, session)) = self
                .sessions
                .remove_if(&upload_id, |_, s| s.initiated < cutoff && !s.completing)
            {
                stats.sessions += 1;
                stats.files += self.discard_parts(&upload_id, &session.parts).await;
                info!(upload_id = %upload_id, "reaped expired multipart upload");
            }
        }

        for path in self.staged_files().await {
            let Some(name) = file_name(&path) else {
                continue;
            };
            let orphan = if name.ends_with(TEMP_EXTENSION) {
                true
            } else if name.ends_with(PART_EXTENSION) {
                let upload_id = name.split('.').next().unwrap_or_default();
                !self.sessions.contains_key(upload_id)
            } else {
                false
            };
            if !orphan {
                continue;
            }

            match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) if DateTime::<Utc>::from(modified) < cutoff => {
                    if remove_staged(&path).await {
                        stats.files += 1;
                        debug!(path = %path.display(), "reaped orphaned staged file");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "cannot stat staged file"),
            }
        }

        stats
    }

    /// Run [`reap_expired`](Self::reap_expired) every `period` on a background
    /// task. The first pass happens one period after the call.
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            info!(
                interval_secs = period.as_secs(),
                ttl_secs = coordinator.upload_ttl.as_secs(),
                "multipart reaper started"
            );

            // The first tick fires immediately.
            timer.tick().await;

            loop {
                timer.tick().await;
                let stats = coordinator.reap_expired(Utc::now()).await;
                if stats == ReapStats::default() {
                    debug!("reaper pass removed nothing");
                } else {
                    info!(
                        sessions = stats.sessions,
                        files = stats.files,
                        "reaper pass finished"
                    );
                }
            }
        })
    }

    async fn staged_files(&self) -> Vec<PathBuf> {
        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.staging_dir.display(), error = %e, "cannot list staging directory");
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => files.push(entry.path()),
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.staging_dir.display(), error = %e, "error while listing staging directory");
                    break;
                }
            }
        }
        files
    }
}

/// Copy `sources` into `tmp` while hashing, then rename `tmp` over `dest`.
async fn concatenate(
    upload_id: &str,
    sources: &[(u32, PathBuf)],
    tmp: &Path,
    dest: &Path,
) -> Result<(String, u64), StoreError> {
    let write_failed = |source| StoreError::ObjectWriteFailed {
        path: dest.to_path_buf(),
        source,
    };

    let mut out = tokio::fs::File::create(tmp).await.map_err(write_failed)?;
    let mut hasher = Md5Hasher::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    for (part_number, path) in sources {
        let read_failed = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::NotFound {
                part_not_found(upload_id, *part_number)
            } else {
                StoreError::PartReadFailed {
                    path: path.clone(),
                    source,
                }
            }
        };

        let mut part = tokio::fs::File::open(path).await.map_err(read_failed)?;
        loop {
            let n = part.read(&mut buf).await.map_err(read_failed)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n]).await.map_err(write_failed)?;
            size += n as u64;
        }
    }

    out.sync_all().await.map_err(write_failed)?;
    drop(out);
    tokio::fs::rename(tmp, dest).await.map_err(write_failed)?;

    Ok((hasher.finish_etag(), size))
}

async fn remove_staged(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove staged file");
            false
        }
    }
}

fn part_not_found(upload_id: &str, part_number: u32) -> StoreError {
    StoreError::PartNotFound {
        upload_id: upload_id.to_owned(),
        part_number,
    }
}

fn join_target(bucket: &str, key: &str) -> String {
    let bucket = bucket.trim_end_matches('/');
    if bucket.is_empty() || bucket.starts_with('/') {
        format!("{bucket}/{key}")
    } else {
        format!("/{bucket}/{key}")
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::checksums::md5_base64;

    fn coordinator(dir: &TempDir) -> MultipartCoordinator {
        let config = ReceiverConfig::builder()
            .root_dir(dir.path().join("objects"))
            .staging_dir(dir.path().join("staging"))
            .domain("logs.example.com".to_owned())
            .build();
        MultipartCoordinator::new(Arc::new(FsStore::new(config.root_dir.clone())), &config)
    }

    async fn upload(
        coordinator: &MultipartCoordinator,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError> {
        let md5 = md5_base64(body);
        coordinator
            .upload_part(UploadPart {
                upload_id,
                part_number,
                body: Bytes::copy_from_slice(body),
                content_length: body.len() as u64,
                content_md5: Some(&md5),
            })
            .await
    }

    fn staged_parts(dir: &TempDir) -> Vec<String> {
        match std::fs::read_dir(dir.path().join("staging")) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|n| n.ends_with(PART_EXTENSION))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_should_generate_distinct_upload_ids() {
        assert_ne!(generate_upload_id(), generate_upload_id());
    }

    #[tokio::test]
    async fn test_should_assemble_out_of_order_parts() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let initiated = coordinator.initiate("/20210503", "file.log").unwrap();
        let id = initiated.upload_id.as_str();

        let etag = upload(&coordinator, id, 2, b"bbb").await.unwrap();
        assert_eq!(etag, md5_base64(b"bbb"));
        upload(&coordinator, id, 3, b"cc").await.unwrap();
        upload(&coordinator, id, 1, b"a").await.unwrap();
        assert_eq!(
            coordinator.session(id).unwrap().parts,
            BTreeSet::from([1, 2, 3])
        );

        let done = coordinator
            .complete(id, "/20210503", "file.log", &[1, 2, 3])
            .await
            .unwrap();

        let mut expected = Md5Hasher::new();
        expected.update(b"abbbcc");
        assert_eq!(done.etag, expected.finish_etag());
        assert_eq!(done.size, 6);
        assert_eq!(done.location, "https://logs.example.com/20210503/file.log");
        assert_eq!(
            std::fs::read(dir.path().join("objects/20210503/file.log")).unwrap(),
            b"abbbcc"
        );
        assert!(staged_parts(&dir).is_empty());
        assert_eq!(coordinator.active_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_honor_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;

        upload(&coordinator, &id, 1, b"first").await.unwrap();
        upload(&coordinator, &id, 2, b"second").await.unwrap();
        let done = coordinator.complete(&id, "/b", "k", &[2, 1]).await.unwrap();

        assert_eq!(std::fs::read(done.path).unwrap(), b"secondfirst");
    }

    #[tokio::test]
    async fn test_should_fail_whole_completion_on_missing_part() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"one").await.unwrap();

        let result = coordinator.complete(&id, "/b", "k", &[1, 2]).await;

        assert!(matches!(
            result,
            Err(StoreError::PartNotFound { part_number: 2, .. })
        ));
        assert!(!dir.path().join("objects/b/k").exists());
        assert_eq!(staged_parts(&dir).len(), 1);
        assert!(coordinator.session(&id).is_some());
    }

    #[tokio::test]
    async fn test_should_keep_last_upload_of_a_part() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;

        upload(&coordinator, &id, 3, b"old bytes").await.unwrap();
        upload(&coordinator, &id, 3, b"new").await.unwrap();

        assert_eq!(
            std::fs::read(coordinator.part_path(&id, 3)).unwrap(),
            b"new"
        );
        assert_eq!(staged_parts(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_unknown_upload_and_bad_part_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);

        assert!(matches!(
            upload(&coordinator, "nope", 1, b"x").await,
            Err(StoreError::NoSuchUpload(_))
        ));

        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        for bad in [0, MAX_PART_NUMBER + 1] {
            assert!(matches!(
                upload(&coordinator, &id, bad, b"x").await,
                Err(StoreError::InvalidPartNumber(n)) if n == bad
            ));
        }
    }

    #[tokio::test]
    async fn test_should_reject_part_with_bad_md5() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;

        let wrong = md5_base64(b"other");
        let result = coordinator
            .upload_part(UploadPart {
                upload_id: &id,
                part_number: 1,
                body: Bytes::from_static(b"data"),
                content_length: 4,
                content_md5: Some(&wrong),
            })
            .await;

        assert!(matches!(result, Err(StoreError::Md5Mismatch { .. })));
        assert!(staged_parts(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_completion_for_other_target() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"one").await.unwrap();

        let result = coordinator.complete(&id, "/b", "other", &[1]).await;

        assert!(matches!(
            result,
            Err(StoreError::UploadTargetMismatch { .. })
        ));
        assert!(coordinator.session(&id).is_some());
    }

    #[tokio::test]
    async fn test_should_reject_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;

        let result = coordinator.complete(&id, "/b", "k", &[]).await;
        assert!(matches!(result, Err(StoreError::MalformedManifest)));
    }

    #[tokio::test]
    async fn test_should_abort_and_remove_parts() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"one").await.unwrap();
        upload(&coordinator, &id, 2, b"two").await.unwrap();

        coordinator.abort(&id).await.unwrap();

        assert!(staged_parts(&dir).is_empty());
        assert!(matches!(
            coordinator.abort(&id).await,
            Err(StoreError::NoSuchUpload(_))
        ));
        assert!(matches!(
            coordinator.complete(&id, "/b", "k", &[1]).await,
            Err(StoreError::NoSuchUpload(_))
        ));
    }

    #[tokio::test]
    async fn test_should_reject_part_changes_while_completing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"staged").await.unwrap();
        coordinator.sessions.get_mut(&id).unwrap().completing = true;

        assert!(matches!(
            upload(&coordinator, &id, 1, b"late").await,
            Err(StoreError::UploadCompleting(_))
        ));
        assert!(matches!(
            coordinator.abort(&id).await,
            Err(StoreError::UploadCompleting(_))
        ));
        assert!(matches!(
            coordinator.complete(&id, "/b", "k", &[1]).await,
            Err(StoreError::UploadCompleting(_))
        ));
        assert_eq!(
            std::fs::read(coordinator.part_path(&id, 1)).unwrap(),
            b"staged"
        );
        assert_eq!(std::fs::read_dir(dir.path().join("staging")).unwrap().count(), 1);

        coordinator.sessions.get_mut(&id).unwrap().completing = false;
        let done = coordinator.complete(&id, "/b", "k", &[1]).await.unwrap();
        assert_eq!(std::fs::read(done.path).unwrap(), b"staged");
    }

    #[tokio::test]
    async fn test_should_keep_parts_acknowledged_during_failed_completion() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(coordinator(&dir));
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"one").await.unwrap();

        let completion = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.complete(&id, "/b", "k", &[1, 2]).await })
        };
        let mut retries = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            retries.push(tokio::spawn(async move {
                upload(&coordinator, &id, 1, b"one").await
            }));
        }

        assert!(matches!(
            completion.await.unwrap(),
            Err(StoreError::PartNotFound { part_number: 2, .. })
        ));
        for retry in retries {
            match retry.await.unwrap() {
                Ok(_) | Err(StoreError::UploadCompleting(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(std::fs::read(coordinator.part_path(&id, 1)).unwrap(), b"one");
        let session = coordinator.session(&id).unwrap();
        assert!(!session.completing);
        assert_eq!(session.parts, BTreeSet::from([1]));

        upload(&coordinator, &id, 2, b"two").await.unwrap();
        let done = coordinator.complete(&id, "/b", "k", &[1, 2]).await.unwrap();
        assert_eq!(std::fs::read(done.path).unwrap(), b"onetwo");
    }

    #[tokio::test]
    async fn test_should_only_discard_parts_of_the_finished_upload() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let kept = coordinator.initiate("/b", "kept").unwrap().upload_id;
        let aborted = coordinator.initiate("/b", "aborted").unwrap().upload_id;
        let completed = coordinator.initiate("/b", "completed").unwrap().upload_id;
        for id in [&kept, &aborted, &completed] {
            upload(&coordinator, id, 1, b"x").await.unwrap();
            upload(&coordinator, id, 2, b"y").await.unwrap();
        }

        coordinator.abort(&aborted).await.unwrap();
        coordinator
            .complete(&completed, "/b", "completed", &[1, 2])
            .await
            .unwrap();

        let mut remaining = staged_parts(&dir);
        remaining.sort();
        assert_eq!(
            remaining,
            vec![format!("{kept}.1{PART_EXTENSION}"), format!("{kept}.2{PART_EXTENSION}")]
        );
    }

    #[tokio::test]
    async fn test_should_reap_expired_sessions_and_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let id = coordinator.initiate("/b", "k").unwrap().upload_id;
        upload(&coordinator, &id, 1, b"one").await.unwrap();
        std::fs::write(dir.path().join("staging/deadbeef.4.part"), b"orphan").unwrap();

        let stats = coordinator.reap_expired(Utc::now()).await;
        assert_eq!(stats, ReapStats::default());
        assert_eq!(staged_parts(&dir).len(), 2);

        let later = Utc::now() + TimeDelta::days(2);
        let stats = coordinator.reap_expired(later).await;
        assert_eq!(
            stats,
            ReapStats {
                sessions: 1,
                files: 2
            }
        );
        assert!(staged_parts(&dir).is_empty());
        assert_eq!(coordinator.active_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_reject_unsafe_target_at_initiation() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        assert!(matches!(
            coordinator.initiate("/b", ".."),
            Err(StoreError::InvalidObjectName(_))
        ));
    }

    #[test]
    fn test_should_join_location_targets() {
        assert_eq!(join_target("/20210503", "f"), "/20210503/f");
        assert_eq!(join_target("/", "f"), "/f");
        assert_eq!(join_target("b", "f"), "/b/f");
    }
}
