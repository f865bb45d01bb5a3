use crate::{
    BlobStore, MetadataStore, PageRegistry, Result, Version, VersionLedger, verify_hash,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadContentOperation {
    metadata: Arc<MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
}

#[derive(Debug, Clone)]
pub struct ReadContentOperationRequest {
    pub page_id: String,
    /// Defaults to the page's current version.
    pub version_number: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ReadContentOperationResult {
    pub version: Version,
    pub content: String,
}

impl ReadContentOperation {
    pub fn new(metadata: Arc<MetadataStore>, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            metadata,
            blob_store,
        }
    }

    pub async fn run(&self, request: ReadContentOperationRequest) -> Result<ReadContentOperationResult> {
        let ReadContentOperationRequest {
            page_id,
            version_number,
        } = request;

        let version = self.metadata.read(|conn| {
            let page = PageRegistry::new(conn).get(&page_id)?;
            let number = version_number.unwrap_or(page.current_version);
            VersionLedger::new(conn).find(&page_id, number)
        })?;

        let content = self.blob_store.get(&version.blob_ref).await?;
        verify_hash(&version.blob_ref, content.as_bytes(), &version.sha256)?;

        Ok(ReadContentOperationResult { version, content })
    }
}
