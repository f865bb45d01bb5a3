pub mod check_integrity;
pub mod create_page;
pub mod delete_page;
pub mod list_versions;
pub mod read_content;
pub mod restore_version;
pub mod update_page;

pub use check_integrity::{
    CheckIntegrityOperation, CheckIntegrityOperationRequest, IntegrityIssue, IntegrityReport,
};
pub use create_page::{
    CreatePageOperation, CreatePageOperationRequest, CreatePageOperationResult,
};
pub use delete_page::{
    DeletePageOperation, DeletePageOperationOutcome, DeletePageOperationRequest,
    DeletePageOperationResult,
};
pub use list_versions::{ListVersionsOperation, ListVersionsOperationRequest};
pub use read_content::{
    ReadContentOperation, ReadContentOperationRequest, ReadContentOperationResult,
};
pub use restore_version::{
    RestoreVersionOperation, RestoreVersionOperationRequest, RestoreVersionOperationResult,
};
pub use update_page::{
    UpdatePageOperation, UpdatePageOperationRequest, UpdatePageOperationResult,
};

use crate::BlobStore;

/// Remove a blob whose metadata commit failed. The blob was never reachable,
/// so a failure here only leaves an orphan for the integrity check.
pub(crate) async fn discard_blob(blob_store: &dyn BlobStore, blob_ref: &str) {
    if let Err(error) = blob_store.delete(blob_ref).await {
        tracing::warn!(
            "Failed to discard uncommitted blob. blob={} error={}",
            blob_ref,
            error
        );
    }
}
