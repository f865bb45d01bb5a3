use crate::{
    BlobStore, BookTable, CleanupReport, MetadataStore, PageLocks, PageRegistry, Result,
    VersionLedger,
};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeletePageOperation {
    metadata: Arc<MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
    page_locks: PageLocks,
}

#[derive(Debug, Clone)]
pub struct DeletePageOperationRequest {
    pub page_id: String,
}

#[derive(Debug, Clone)]
pub struct DeletePageOperationResult {
    pub versions_removed: usize,
    pub cleanup: CleanupReport,
}

#[derive(Debug, Clone)]
pub enum DeletePageOperationOutcome {
    Deleted(DeletePageOperationResult),
    NotFound,
}

impl DeletePageOperation {
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

    /// Metadata deletion is authoritative and committed first; blob cleanup
    /// afterwards is best-effort and never fails the operation.
    pub async fn run(&self, request: DeletePageOperationRequest) -> Result<DeletePageOperationOutcome> {
        let DeletePageOperationRequest { page_id } = request;
        let _guard = self.page_locks.lock(&page_id).await;

        let versions_removed = self.metadata.write(|tx| {
            if !PageRegistry::new(tx).delete(&page_id)? {
                return Ok(None);
            }
            let removed = VersionLedger::new(tx).delete_by_page(&page_id)?;
            BookTable::new(tx).clear_index_page(&page_id, Utc::now())?;
            Ok(Some(removed))
        })?;

        let Some(versions_removed) = versions_removed else {
            return Ok(DeletePageOperationOutcome::NotFound);
        };

        let cleanup = self.blob_store.delete_all_for_page(&page_id).await;
        if !cleanup.is_clean() {
            tracing::warn!(
                "Page {} deleted with incomplete blob cleanup: {} removed, {} failed",
                page_id,
                cleanup.removed.len(),
                cleanup.failed.len()
            );
        }

        tracing::info!(
            "Deleted page {} ({} versions, {} blobs)",
            page_id,
            versions_removed,
            cleanup.removed.len()
        );

        Ok(DeletePageOperationOutcome::Deleted(DeletePageOperationResult {
            versions_removed,
            cleanup,
        }))
    }
}
