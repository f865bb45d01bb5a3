use super::discard_blob;
use crate::storage::metadata_store::require_title;
use crate::{
    BlobStore, MetadataStore, Page, PageGuard, PageLocks, PageRegistry, Result, Version,
    VersionLedger,
};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct UpdatePageOperation {
    metadata: Arc<MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
    page_locks: PageLocks,
}

#[derive(Debug, Clone)]
pub struct UpdatePageOperationRequest {
    pub page_id: String,
    pub title: Option<String>,
    /// `Some` appends a new version, even when identical to the current one.
    pub content: Option<String>,
    pub editor_name: String,
}

#[derive(Debug, Clone)]
pub struct UpdatePageOperationResult {
    pub page: Page,
    pub new_version: Option<Version>,
}

impl UpdatePageOperation {
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

    pub async fn run(&self, request: UpdatePageOperationRequest) -> Result<UpdatePageOperationResult> {
        let UpdatePageOperationRequest {
            page_id,
            title,
            content,
            editor_name,
        } = request;

        let title = title.as_deref().map(require_title).transpose()?;
        let guard = self.page_locks.lock(&page_id).await;

        let Some(content) = content else {
            let page = self.metadata.write(|tx| {
                let registry = PageRegistry::new(tx);
                if let Some(title) = &title {
                    registry.update_title(&page_id, title, Utc::now())?;
                }
                registry.get(&page_id)
            })?;

            return Ok(UpdatePageOperationResult {
                page,
                new_version: None,
            });
        };

        let (page, version) = self
            .append_version(&guard, &content, &editor_name, title.as_deref())
            .await?;

        Ok(UpdatePageOperationResult {
            page,
            new_version: Some(version),
        })
    }

    /// Write `content` as version `current_version + 1` of the guarded page.
    ///
    /// Order: blob, then ledger entry and pointer advance in one transaction.
    /// A reader following `current_version` therefore never sees a number
    /// without content behind it.
    pub(crate) async fn append_version(
        &self,
        guard: &PageGuard,
        content: &str,
        editor_name: &str,
        title: Option<&str>,
    ) -> Result<(Page, Version)> {
        let page_id = guard.page_id();
        let page = self
            .metadata
            .read(|conn| PageRegistry::new(conn).get(page_id))?;
        let next = page.current_version + 1;

        let stored = self.blob_store.put(page_id, next, content).await?;
        let now = Utc::now();

        let version = Version {
            id: stored.version_id.clone(),
            page_id: page_id.to_string(),
            version_number: next,
            blob_ref: stored.blob_ref.clone(),
            size_bytes: stored.size_bytes,
            sha256: stored.sha256.clone(),
            editor_name: editor_name.to_string(),
            timestamp: now,
        };

        let committed = self.metadata.write(|tx| {
            VersionLedger::new(tx).append(&version)?;
            let registry = PageRegistry::new(tx);
            registry.set_current_version(page_id, next, now)?;
            if let Some(title) = title {
                registry.update_title(page_id, title, now)?;
            }
            registry.get(page_id)
        });

        let page = match committed {
            Ok(page) => page,
            Err(error) => {
                discard_blob(self.blob_store.as_ref(), &stored.blob_ref).await;
                return Err(error);
            }
        };

        tracing::info!(
            "Page {} advanced to version {} by {}",
            page_id,
            next,
            editor_name
        );

        Ok((page, version))
    }

    pub(crate) fn page_locks(&self) -> &PageLocks {
        &self.page_locks
    }
}
