use super::discard_blob;
use crate::storage::metadata_store::require_title;
use crate::{
    BlobStore, FolioError, MetadataStore, NewPage, Page, PageLocks, PageRegistry, Result, Version,
    VersionLedger,
};
use chrono::Utc;
use std::sync::Arc;
use ulid::Ulid;

#[derive(Clone)]
pub struct CreatePageOperation {
    metadata: Arc<MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
    page_locks: PageLocks,
}

#[derive(Debug, Clone)]
pub struct CreatePageOperationRequest {
    pub title: String,
    pub content: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub is_index_page: bool,
    pub editor_name: String,
}

#[derive(Debug, Clone)]
pub struct CreatePageOperationResult {
    pub page: Page,
    pub version: Version,
}

impl CreatePageOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        blob_store: Arc<dyn BlobStore>,
        page_locks: PageLocks,
    ) -> Self {
        Self {
            metadata,
            blob_store,
            page_locks,
        }
    }

    pub async fn run(&self, request: CreatePageOperationRequest) -> Result<CreatePageOperationResult> {
        let CreatePageOperationRequest {
            title,
            content,
            book_id,
            chapter_id,
            is_index_page,
            editor_name,
        } = request;

        let title = require_title(&title)?;
        if book_id.trim().is_empty() {
            return Err(FolioError::InvalidRequest(
                "book_id cannot be empty".to_string(),
            ));
        }

        let page_id = Ulid::new().to_string();
        // Held so an integrity repair cannot mistake the blob for an orphan
        // before the metadata commit.
        let _guard = self.page_locks.lock(&page_id).await;

        let stored = self.blob_store.put(&page_id, 1, &content).await?;
        let now = Utc::now();

        let version = Version {
            id: stored.version_id.clone(),
            page_id: page_id.clone(),
            version_number: 1,
            blob_ref: stored.blob_ref.clone(),
            size_bytes: stored.size_bytes,
            sha256: stored.sha256.clone(),
            editor_name,
            timestamp: now,
        };

        let fields = NewPage {
            title,
            book_id,
            chapter_id: chapter_id.filter(|id| !id.trim().is_empty()),
            is_index_page,
        };

        // The page row and its first version become visible together.
        let committed = self.metadata.write(|tx| {
            let page = PageRegistry::new(tx).create(&page_id, &fields, now)?;
            VersionLedger::new(tx).append(&version)?;
            Ok(page)
        });

        let page = match committed {
            Ok(page) => page,
            Err(error) => {
                discard_blob(self.blob_store.as_ref(), &stored.blob_ref).await;
                return Err(error);
            }
        };

        tracing::info!(
            "Created page {} ({}) in book {}",
            page.id,
            page.title,
            page.book_id
        );

        Ok(CreatePageOperationResult { page, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsBlobStore;

    fn operation(dir: &std::path::Path) -> (CreatePageOperation, Arc<MetadataStore>, Arc<FsBlobStore>) {
        let metadata = Arc::new(MetadataStore::new(dir.join("metadata.db")).unwrap());
        let blobs = Arc::new(FsBlobStore::new(dir.join("blobs")).unwrap());
        let op = CreatePageOperation::new(metadata.clone(), blobs.clone(), PageLocks::new());
        (op, metadata, blobs)
    }

    fn request(title: &str, content: &str) -> CreatePageOperationRequest {
        CreatePageOperationRequest {
            title: title.to_string(),
            content: content.to_string(),
            book_id: "book1".to_string(),
            chapter_id: None,
            is_index_page: false,
            editor_name: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_page_writes_version_one() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (op, metadata, blobs) = operation(temp_dir.path());

        let result = op.run(request("Intro", "hello")).await.unwrap();
        assert_eq!(result.page.current_version, 1);
        assert_eq!(result.version.version_number, 1);
        assert_eq!(result.version.editor_name, "alice");

        let versions = metadata
            .read(|conn| VersionLedger::new(conn).list_by_page(&result.page.id, crate::VersionOrder::Ascending))
            .unwrap();
        assert_eq!(versions, vec![result.version.clone()]);

        assert_eq!(blobs.get(&result.version.blob_ref).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_create_page_rejects_blank_title() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (op, _metadata, blobs) = operation(temp_dir.path());

        let err = op.run(request("  ", "hello")).await.unwrap_err();
        assert!(matches!(err, FolioError::InvalidRequest(_)));
        assert!(blobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_page_and_no_blob() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (op, metadata, blobs) = operation(temp_dir.path());

        // Break the versions table so the ledger append fails inside the
        // transaction that also inserts the page.
        metadata
            .write(|tx| {
                tx.execute("DROP TABLE versions", [])?;
                Ok(())
            })
            .unwrap();

        let err = op.run(request("Intro", "hello")).await.unwrap_err();
        assert!(matches!(err, FolioError::Sqlite(_)));

        let pages = metadata.read(|conn| PageRegistry::new(conn).list()).unwrap();
        assert!(pages.is_empty());
        assert!(blobs.list().await.unwrap().is_empty());
    }
}
