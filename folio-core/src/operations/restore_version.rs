use super::{ReadContentOperation, ReadContentOperationRequest, UpdatePageOperation};
use crate::{Page, Result, Version};
use serde::Serialize;

/// Restore is an append: the target's content becomes a new version and the
/// pointer keeps moving forward. Intermediate versions stay readable.
#[derive(Clone)]
pub struct RestoreVersionOperation {
    read_content: ReadContentOperation,
    update_page: UpdatePageOperation,
}

#[derive(Debug, Clone)]
pub struct RestoreVersionOperationRequest {
    pub page_id: String,
    pub version_number: i64,
    pub editor_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreVersionOperationResult {
    pub page: Page,
    pub new_version: Version,
    pub restored_from: i64,
}

impl RestoreVersionOperation {
    pub fn new(read_content: ReadContentOperation, update_page: UpdatePageOperation) -> Self {
        Self {
            read_content,
            update_page,
        }
    }

    pub async fn run(
        &self,
        request: RestoreVersionOperationRequest,
    ) -> Result<RestoreVersionOperationResult> {
        let RestoreVersionOperationRequest {
            page_id,
            version_number,
            editor_name,
        } = request;

        let guard = self.update_page.page_locks().lock(&page_id).await;

        let source = self
            .read_content
            .run(ReadContentOperationRequest {
                page_id: page_id.clone(),
                version_number: Some(version_number),
            })
            .await?;

        let (page, new_version) = self
            .update_page
            .append_version(&guard, &source.content, &editor_name, None)
            .await?;

        tracing::info!(
            "Restored page {} version {} as version {}",
            page_id,
            version_number,
            new_version.version_number
        );

        Ok(RestoreVersionOperationResult {
            page,
            new_version,
            restored_from: version_number,
        })
    }
}
