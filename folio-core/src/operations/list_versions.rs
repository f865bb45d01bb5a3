use crate::{MetadataStore, PageRegistry, Result, VersionLedger, VersionOrder, VersionSummary};
use std::sync::Arc;

#[derive(Clone)]
pub struct ListVersionsOperation {
    metadata: Arc<MetadataStore>,
}

#[derive(Debug, Clone)]
pub struct ListVersionsOperationRequest {
    pub page_id: String,
}

impl ListVersionsOperation {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Version metadata of an existing page, newest first.
    pub fn run(&self, request: ListVersionsOperationRequest) -> Result<Vec<VersionSummary>> {
        let ListVersionsOperationRequest { page_id } = request;

        let versions = self.metadata.read(|conn| {
            PageRegistry::new(conn).get(&page_id)?;
            VersionLedger::new(conn).list_by_page(&page_id, VersionOrder::Descending)
        })?;

        Ok(versions.into_iter().map(VersionSummary::from).collect())
    }
}
