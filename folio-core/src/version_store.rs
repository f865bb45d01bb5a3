use crate::hierarchy::Hierarchy;
use crate::operations::{
    CheckIntegrityOperation, CheckIntegrityOperationRequest, CreatePageOperation,
    CreatePageOperationRequest, DeletePageOperation, DeletePageOperationOutcome,
    DeletePageOperationRequest, IntegrityReport, ListVersionsOperation,
    ListVersionsOperationRequest, ReadContentOperation, ReadContentOperationRequest,
    RestoreVersionOperation, RestoreVersionOperationRequest, RestoreVersionOperationResult,
    UpdatePageOperation, UpdatePageOperationRequest,
};
use crate::{
    BlobStore, FsBlobStore, MetadataStore, Page, PageLocks, PageRegistry, Result, VersionSummary,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const METADATA_FILE: &str = "metadata.db";
pub const BLOBS_DIR: &str = "blobs";

/// Where the metadata database and the blob directory live.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub metadata_path: PathBuf,
    pub blobs_dir: PathBuf,
}

impl StoreLayout {
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            metadata_path: data_dir.join(METADATA_FILE),
            blobs_dir: data_dir.join(BLOBS_DIR),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Page version store.
///
/// Every content change becomes a new immutable version and the page's
/// `current_version` only ever moves forward by one. All operations on the
/// same page share one set of page locks.
#[derive(Clone)]
pub struct VersionStore {
    metadata: Arc<MetadataStore>,
    create_page: CreatePageOperation,
    update_page: UpdatePageOperation,
    read_content: ReadContentOperation,
    restore_version: RestoreVersionOperation,
    delete_page: DeletePageOperation,
    list_versions: ListVersionsOperation,
    check_integrity: CheckIntegrityOperation,
    hierarchy: Hierarchy,
}

impl VersionStore {
    pub fn new(metadata: Arc<MetadataStore>, blob_store: Arc<dyn BlobStore>) -> Self {
        let page_locks = PageLocks::new();

        let create_page =
            CreatePageOperation::new(metadata.clone(), blob_store.clone(), page_locks.clone());
        let update_page =
            UpdatePageOperation::new(metadata.clone(), blob_store.clone(), page_locks.clone());
        let read_content = ReadContentOperation::new(metadata.clone(), blob_store.clone());

        Self {
            restore_version: RestoreVersionOperation::new(
                read_content.clone(),
                update_page.clone(),
            ),
            delete_page: DeletePageOperation::new(
                metadata.clone(),
                blob_store.clone(),
                page_locks.clone(),
            ),
            list_versions: ListVersionsOperation::new(metadata.clone()),
            check_integrity: CheckIntegrityOperation::new(
                metadata.clone(),
                blob_store,
                page_locks,
            ),
            hierarchy: Hierarchy::new(metadata.clone(), create_page.clone()),
            metadata,
            create_page,
            update_page,
            read_content,
        }
    }

    /// Open (or initialize) a store with `metadata.db` and `blobs/` under
    /// `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_layout(&StoreLayout::in_dir(data_dir))
    }

    pub fn open_layout(layout: &StoreLayout) -> Result<Self> {
        let metadata = Arc::new(MetadataStore::new(layout.metadata_path.clone())?);
        let blob_store = Arc::new(FsBlobStore::new(layout.blobs_dir.clone())?);

        tracing::info!(
            "Opened version store. metadata={} blobs={}",
            layout.metadata_path.display(),
            layout.blobs_dir.display()
        );

        Ok(Self::new(metadata, blob_store))
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub async fn create_page(
        &self,
        title: &str,
        content: &str,
        book_id: &str,
        chapter_id: Option<&str>,
        is_index_page: bool,
        editor_name: &str,
    ) -> Result<Page> {
        let result = self
            .create_page
            .run(CreatePageOperationRequest {
                title: title.to_string(),
                content: content.to_string(),
                book_id: book_id.to_string(),
                chapter_id: chapter_id.map(str::to_string),
                is_index_page,
                editor_name: editor_name.to_string(),
            })
            .await?;
        Ok(result.page)
    }

    pub fn get_page(&self, id: &str) -> Result<Page> {
        self.metadata.read(|conn| PageRegistry::new(conn).get(id))
    }

    pub fn list_pages(&self) -> Result<Vec<Page>> {
        self.metadata.read(|conn| PageRegistry::new(conn).list())
    }

    pub fn list_pages_by_book(&self, book_id: &str) -> Result<Vec<Page>> {
        self.metadata
            .read(|conn| PageRegistry::new(conn).list_by_book(book_id))
    }

    pub fn list_pages_by_chapter(&self, chapter_id: &str) -> Result<Vec<Page>> {
        self.metadata
            .read(|conn| PageRegistry::new(conn).list_by_chapter(chapter_id))
    }

    pub async fn get_current_content(&self, page_id: &str) -> Result<String> {
        self.read(page_id, None).await
    }

    pub async fn get_version_content(&self, page_id: &str, version_number: i64) -> Result<String> {
        self.read(page_id, Some(version_number)).await
    }

    async fn read(&self, page_id: &str, version_number: Option<i64>) -> Result<String> {
        let result = self
            .read_content
            .run(ReadContentOperationRequest {
                page_id: page_id.to_string(),
                version_number,
            })
            .await?;
        Ok(result.content)
    }

    /// Apply a title and/or content change. Content, even when unchanged,
    /// always produces a new version.
    pub async fn update_page(&self, id: &str, update: PageUpdate, editor_name: &str) -> Result<Page> {
        let result = self
            .update_page
            .run(UpdatePageOperationRequest {
                page_id: id.to_string(),
                title: update.title,
                content: update.content,
                editor_name: editor_name.to_string(),
            })
            .await?;
        Ok(result.page)
    }

    /// Returns `false` when the page does not exist.
    pub async fn delete_page(&self, id: &str) -> Result<bool> {
        let outcome = self
            .delete_page
            .run(DeletePageOperationRequest {
                page_id: id.to_string(),
            })
            .await?;
        Ok(matches!(outcome, DeletePageOperationOutcome::Deleted(_)))
    }

    /// Version history, newest first.
    pub fn list_version_history(&self, page_id: &str) -> Result<Vec<VersionSummary>> {
        self.list_versions.run(ListVersionsOperationRequest {
            page_id: page_id.to_string(),
        })
    }

    pub async fn restore_version(
        &self,
        page_id: &str,
        version_number: i64,
        editor_name: &str,
    ) -> Result<RestoreVersionOperationResult> {
        self.restore_version
            .run(RestoreVersionOperationRequest {
                page_id: page_id.to_string(),
                version_number,
                editor_name: editor_name.to_string(),
            })
            .await
    }

    pub async fn check_integrity(&self, repair: bool) -> Result<IntegrityReport> {
        self.check_integrity
            .run(CheckIntegrityOperationRequest { repair })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FolioError;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().join("data");

        let store = VersionStore::open(&data_dir).unwrap();
        assert!(data_dir.join(METADATA_FILE).exists());
        assert!(data_dir.join(BLOBS_DIR).is_dir());
        assert!(store.list_pages().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_pages() {
        let temp_dir = tempfile::tempdir().unwrap();

        let page_id = {
            let store = VersionStore::open(temp_dir.path()).unwrap();
            let page = store
                .create_page("Intro", "hello", "book1", None, false, "alice")
                .await
                .unwrap();
            store
                .update_page(
                    &page.id,
                    PageUpdate {
                        title: None,
                        content: Some("hello again".to_string()),
                    },
                    "bob",
                )
                .await
                .unwrap();
            page.id
        };

        let store = VersionStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get_page(&page_id).unwrap().current_version, 2);
        assert_eq!(store.get_current_content(&page_id).await.unwrap(), "hello again");
        assert_eq!(store.get_version_content(&page_id, 1).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_missing_page_operations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(temp_dir.path()).unwrap();

        assert!(store.get_page("missing").unwrap_err().is_not_found());
        assert!(store.get_current_content("missing").await.unwrap_err().is_not_found());
        assert!(store.list_version_history("missing").unwrap_err().is_not_found());
        assert!(!store.delete_page("missing").await.unwrap());

        let err = store.restore_version("missing", 1, "alice").await.unwrap_err();
        assert!(matches!(err, FolioError::PageNotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_missing_version() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(temp_dir.path()).unwrap();
        let page = store
            .create_page("Intro", "hello", "book1", None, false, "alice")
            .await
            .unwrap();

        let err = store.restore_version(&page.id, 7, "alice").await.unwrap_err();
        assert!(matches!(err, FolioError::VersionNotFound { version: 7, .. }));
        assert_eq!(store.get_page(&page.id).unwrap().current_version, 1);
    }
}
