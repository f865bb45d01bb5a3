use crate::error::{FolioError, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

const BLOB_EXTENSION: &str = "txt";

/// Result of writing one version's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Opaque handle recorded in the ledger; also the file name.
    pub blob_ref: String,
    /// Random component of the name, reused as the version record id.
    pub version_id: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Parsed form of a blob name: `{page_id}_v{version_number}_{version_id}.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobName {
    pub page_id: String,
    pub version_number: i64,
    pub version_id: String,
}

impl BlobName {
    pub fn new(page_id: &str, version_number: i64, version_id: &str) -> Self {
        Self {
            page_id: page_id.to_string(),
            version_number,
            version_id: version_id.to_string(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(&format!(".{}", BLOB_EXTENSION))?;
        let (page_id, rest) = stem.split_once("_v")?;
        let (version_number, version_id) = rest.split_once('_')?;
        if page_id.is_empty() || version_id.is_empty() {
            return None;
        }

        Some(Self {
            page_id: page_id.to_string(),
            version_number: version_number.parse().ok()?,
            version_id: version_id.to_string(),
        })
    }

    pub fn page_prefix(page_id: &str) -> String {
        format!("{}_", page_id)
    }
}

impl std::fmt::Display for BlobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_v{}_{}.{}",
            self.page_id, self.version_number, self.version_id, BLOB_EXTENSION
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub blob_ref: String,
    pub error: String,
}

/// Outcome of a best-effort bulk delete. Failures are reported, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<CleanupFailure>,
    pub list_error: Option<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.list_error.is_none()
    }
}

/// Write-once storage for version content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under a fresh name derived from the page and version.
    async fn put(&self, page_id: &str, version_number: i64, content: &str) -> Result<StoredBlob>;

    /// Read a blob. A miss is [`FolioError::BlobNotFound`].
    async fn get(&self, blob_ref: &str) -> Result<String>;

    async fn exists(&self, blob_ref: &str) -> Result<bool>;

    async fn delete(&self, blob_ref: &str) -> Result<()>;

    /// Every stored blob name, in no particular order.
    async fn list(&self) -> Result<Vec<String>>;

    /// Delete every blob belonging to `page_id`. Individual failures are logged
    /// and collected; the remaining deletions still run.
    async fn delete_all_for_page(&self, page_id: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        let prefix = BlobName::page_prefix(page_id);

        let names = match self.list().await {
            Ok(names) => names,
            Err(error) => {
                tracing::warn!(
                    "Blob cleanup could not list blobs. page={} error={}",
                    page_id,
                    error
                );
                report.list_error = Some(error.to_string());
                return report;
            }
        };

        let targets: Vec<String> = names
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect();

        let results = join_all(targets.iter().map(|name| self.delete(name))).await;

        for (name, result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => report.removed.push(name),
                Err(error) => {
                    tracing::warn!(
                        "Blob cleanup failed. page={} blob={} error={}",
                        page_id,
                        name,
                        error
                    );
                    report.failed.push(CleanupFailure {
                        blob_ref: name,
                        error: error.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Filesystem blob store: one file per version under `base_path`.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn blob_path(&self, blob_ref: &str) -> Result<PathBuf> {
        if blob_ref.is_empty()
            || blob_ref.contains('/')
            || blob_ref.contains('\\')
            || blob_ref.starts_with('.')
        {
            return Err(FolioError::InvalidRequest(format!(
                "invalid blob reference: {}",
                blob_ref
            )));
        }
        Ok(self.base_path.join(blob_ref))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, page_id: &str, version_number: i64, content: &str) -> Result<StoredBlob> {
        let version_id = Ulid::new().to_string();
        let blob_ref = BlobName::new(page_id, version_number, &version_id).to_string();
        let blob_path = self.blob_path(&blob_ref)?;

        if fs::try_exists(&blob_path).await? {
            return Err(FolioError::InvariantViolation(format!(
                "blob {} already exists",
                blob_ref
            )));
        }

        write_atomically(&blob_path, content.as_bytes()).await?;

        tracing::debug!(
            "Stored blob {} for page {} (version {}, {} bytes)",
            blob_ref,
            page_id,
            version_number,
            content.len()
        );

        Ok(StoredBlob {
            blob_ref,
            version_id,
            size_bytes: content.len() as u64,
            sha256: compute_hash(content.as_bytes()),
        })
    }

    async fn get(&self, blob_ref: &str) -> Result<String> {
        let blob_path = self.blob_path(blob_ref)?;

        let data = match fs::read(&blob_path).await {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(FolioError::BlobNotFound(blob_ref.to_string()));
            }
            Err(error) => return Err(error.into()),
        };

        String::from_utf8(data).map_err(|_| {
            FolioError::InvariantViolation(format!("blob {} is not valid UTF-8", blob_ref))
        })
    }

    async fn exists(&self, blob_ref: &str) -> Result<bool> {
        let blob_path = self.blob_path(blob_ref)?;
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete(&self, blob_ref: &str) -> Result<()> {
        let blob_path = self.blob_path(blob_ref)?;
        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if BlobName::parse(name).is_some() {
                    names.push(name.to_string());
                }
            }
        }

        Ok(names)
    }
}

/// Write to a temporary file first, then rename into place. The temporary
/// file is removed again when any step fails.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let written: std::io::Result<()> = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(error) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove temporary blob file {:?}: {}",
                    temp_path,
                    cleanup
                );
            }
        }
        return Err(error.into());
    }

    Ok(())
}

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that blob content matches the digest recorded in the ledger
pub fn verify_hash(blob_ref: &str, data: &[u8], expected_hash: &str) -> Result<()> {
    let actual_hash = compute_hash(data);
    if actual_hash != expected_hash {
        return Err(FolioError::InvariantViolation(format!(
            "blob {} hash mismatch: expected {}, actual {}",
            blob_ref, expected_hash, actual_hash
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let stored = store.put("page1", 1, "hello").await.unwrap();
        assert!(stored.blob_ref.starts_with("page1_v1_"));
        assert!(stored.blob_ref.ends_with(".txt"));
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.sha256, compute_hash(b"hello"));

        let content = store.get(&stored.blob_ref).await.unwrap();
        assert_eq!(content, "hello");
        assert!(store.exists(&stored.blob_ref).await.unwrap());

        let names = store.list().await.unwrap();
        assert_eq!(names, vec![stored.blob_ref.clone()]);

        store.delete(&stored.blob_ref).await.unwrap();
        assert!(!store.exists(&stored.blob_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_removes_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the final rename fail.
        let target = temp_dir.path().join("page1_v1_x.txt");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), "x").unwrap();

        let err = write_atomically(&target, b"hello").await.unwrap_err();
        assert!(matches!(err, FolioError::Io(_)));

        assert!(!temp_dir.path().join("page1_v1_x.tmp").exists());
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_empty_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let stored = store.put("page1", 1, "").await.unwrap();
        assert_eq!(store.get(&stored.blob_ref).await.unwrap(), "");
        assert_eq!(stored.size_bytes, 0);
    }

    #[tokio::test]
    async fn test_same_version_gets_distinct_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let a = store.put("page1", 2, "a").await.unwrap();
        let b = store.put("page1", 2, "b").await.unwrap();
        assert_ne!(a.blob_ref, b.blob_ref);
        assert_eq!(store.get(&a.blob_ref).await.unwrap(), "a");
        assert_eq!(store.get(&b.blob_ref).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_missing_blob_is_blob_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let err = store.get("page1_v1_missing.txt").await.unwrap_err();
        assert!(matches!(err, FolioError::BlobNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let err = store.get("../metadata.db").await.unwrap_err();
        assert!(matches!(err, FolioError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_delete_all_for_page_only_touches_that_page() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let a1 = store.put("pageA", 1, "a1").await.unwrap();
        let a2 = store.put("pageA", 2, "a2").await.unwrap();
        let b1 = store.put("pageB", 1, "b1").await.unwrap();

        let report = store.delete_all_for_page("pageA").await;
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);

        assert!(!store.exists(&a1.blob_ref).await.unwrap());
        assert!(!store.exists(&a2.blob_ref).await.unwrap());
        assert_eq!(store.get(&b1.blob_ref).await.unwrap(), "b1");
    }

    #[test]
    fn test_blob_name_round_trip() {
        let name = BlobName::new("01HZX", 12, "01J00");
        let rendered = name.to_string();
        assert_eq!(rendered, "01HZX_v12_01J00.txt");
        assert_eq!(BlobName::parse(&rendered), Some(name));
        assert_eq!(BlobName::parse("not-a-blob.txt"), None);
        assert_eq!(BlobName::parse("p_vx_id.txt"), None);
    }

    #[test]
    fn test_verify_hash() {
        let digest = compute_hash(b"abc");
        assert_eq!(digest.len(), 64);
        assert!(verify_hash("b", b"abc", &digest).is_ok());
        assert!(matches!(
            verify_hash("b", b"abd", &digest),
            Err(FolioError::InvariantViolation(_))
        ));
    }
}
