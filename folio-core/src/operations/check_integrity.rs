use crate::{
    BlobName, BlobStore, FolioError, MetadataStore, PageLocks, PageRegistry, Result, Version,
    VersionLedger, verify_hash,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Reconciliation pass over the registry, the ledger and the blob store.
///
/// Findings come from a metadata snapshot plus a blob listing taken right
/// after it, so writes racing the scan can show up as transient findings.
/// Repairs re-check each candidate under its page lock before touching it
/// and only ever delete unreachable data: orphan blobs and ledger entries of
/// pages that no longer exist. Pointers and content are never rewritten.
#[derive(Clone)]
pub struct CheckIntegrityOperation {
    metadata: Arc<MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
    page_locks: PageLocks,
}

#[derive(Debug, Clone, Default)]
pub struct CheckIntegrityOperationRequest {
    pub repair: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    PageWithoutVersions {
        page_id: String,
    },
    VersionSequenceMismatch {
        page_id: String,
        current_version: i64,
        recorded: Vec<i64>,
    },
    MissingBlob {
        page_id: String,
        version_number: i64,
        blob_ref: String,
    },
    CorruptBlob {
        page_id: String,
        version_number: i64,
        blob_ref: String,
        detail: String,
    },
    OrphanVersion {
        page_id: String,
        version_number: i64,
        blob_ref: String,
    },
    OrphanBlob {
        blob_ref: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub pages_checked: usize,
    pub versions_checked: usize,
    pub blobs_checked: usize,
    pub issues: Vec<IntegrityIssue>,
    pub repaired: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

impl CheckIntegrityOperation {
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

    pub async fn run(&self, request: CheckIntegrityOperationRequest) -> Result<IntegrityReport> {
        let (pages, versions) = self.metadata.read(|conn| {
            let pages = PageRegistry::new(conn).list()?;
            let versions = VersionLedger::new(conn).all()?;
            Ok((pages, versions))
        })?;
        let blob_names = self.blob_store.list().await?;

        let mut report = IntegrityReport {
            pages_checked: pages.len(),
            versions_checked: versions.len(),
            blobs_checked: blob_names.len(),
            ..Default::default()
        };

        let referenced: HashSet<&str> = versions.iter().map(|v| v.blob_ref.as_str()).collect();
        let mut by_page: BTreeMap<&str, Vec<&Version>> = BTreeMap::new();
        for version in &versions {
            by_page
                .entry(version.page_id.as_str())
                .or_default()
                .push(version);
        }

        for page in &pages {
            let recorded = by_page.remove(page.id.as_str()).unwrap_or_default();
            if recorded.is_empty() {
                report.issues.push(IntegrityIssue::PageWithoutVersions {
                    page_id: page.id.clone(),
                });
                continue;
            }

            let mut numbers: Vec<i64> = recorded.iter().map(|v| v.version_number).collect();
            numbers.sort_unstable();
            if !numbers.iter().copied().eq(1..=page.current_version) {
                report.issues.push(IntegrityIssue::VersionSequenceMismatch {
                    page_id: page.id.clone(),
                    current_version: page.current_version,
                    recorded: numbers,
                });
            }

            for version in recorded {
                if let Some(issue) = self.check_blob(version).await {
                    report.issues.push(issue);
                }
            }
        }

        // Whatever is left in by_page belongs to pages that are gone.
        for version in by_page.into_values().flatten() {
            report.issues.push(IntegrityIssue::OrphanVersion {
                page_id: version.page_id.clone(),
                version_number: version.version_number,
                blob_ref: version.blob_ref.clone(),
            });
        }

        for name in &blob_names {
            if !referenced.contains(name.as_str()) {
                report.issues.push(IntegrityIssue::OrphanBlob {
                    blob_ref: name.clone(),
                });
            }
        }

        for issue in &report.issues {
            tracing::warn!("Integrity issue: {:?}", issue);
        }

        if request.repair {
            report.repaired = self.repair(&report.issues).await?;
        }

        tracing::info!(
            "Integrity check finished: {} pages, {} versions, {} blobs, {} issues, {} repaired",
            report.pages_checked,
            report.versions_checked,
            report.blobs_checked,
            report.issues.len(),
            report.repaired.len()
        );

        Ok(report)
    }

    async fn check_blob(&self, version: &Version) -> Option<IntegrityIssue> {
        let content = match self.blob_store.get(&version.blob_ref).await {
            Ok(content) => content,
            Err(FolioError::BlobNotFound(_)) => {
                return Some(IntegrityIssue::MissingBlob {
                    page_id: version.page_id.clone(),
                    version_number: version.version_number,
                    blob_ref: version.blob_ref.clone(),
                });
            }
            Err(error) => {
                return Some(IntegrityIssue::CorruptBlob {
                    page_id: version.page_id.clone(),
                    version_number: version.version_number,
                    blob_ref: version.blob_ref.clone(),
                    detail: error.to_string(),
                });
            }
        };

        verify_hash(&version.blob_ref, content.as_bytes(), &version.sha256)
            .err()
            .map(|error| IntegrityIssue::CorruptBlob {
                page_id: version.page_id.clone(),
                version_number: version.version_number,
                blob_ref: version.blob_ref.clone(),
                detail: error.to_string(),
            })
    }

    async fn repair(&self, issues: &[IntegrityIssue]) -> Result<Vec<IntegrityIssue>> {
        let mut repaired = Vec::new();
        let mut purged_pages = HashSet::new();

        for issue in issues {
            match issue {
                IntegrityIssue::OrphanBlob { blob_ref } => {
                    let Some(name) = BlobName::parse(blob_ref) else {
                        continue;
                    };
                    let _guard = self.page_locks.lock(&name.page_id).await;

                    let still_orphan = self
                        .metadata
                        .read(|conn| VersionLedger::new(conn).find_by_blob_ref(blob_ref))?
                        .is_none();
                    if !still_orphan {
                        continue;
                    }

                    self.blob_store.delete(blob_ref).await?;
                    tracing::info!("Removed orphan blob {}", blob_ref);
                    repaired.push(issue.clone());
                }
                IntegrityIssue::OrphanVersion { page_id, .. } => {
                    if !purged_pages.insert(page_id.clone()) {
                        repaired.push(issue.clone());
                        continue;
                    }
                    let _guard = self.page_locks.lock(page_id).await;

                    let removed = self.metadata.write(|tx| {
                        if PageRegistry::new(tx).find(page_id)?.is_some() {
                            return Ok(None);
                        }
                        VersionLedger::new(tx).delete_by_page(page_id).map(Some)
                    })?;

                    let Some(removed) = removed else {
                        purged_pages.remove(page_id);
                        continue;
                    };

                    let cleanup = self.blob_store.delete_all_for_page(page_id).await;
                    tracing::info!(
                        "Removed {} orphan ledger entries and {} blobs of deleted page {}",
                        removed,
                        cleanup.removed.len(),
                        page_id
                    );
                    repaired.push(issue.clone());
                }
                _ => {}
            }
        }

        Ok(repaired)
    }
}
