use super::metadata_store::{format_timestamp, is_constraint_violation, timestamp_column};
use crate::error::{FolioError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

/// One immutable version record. The content lives in the blob store under
/// `blob_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    pub page_id: String,
    pub version_number: i64,
    pub blob_ref: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub editor_name: String,
    pub timestamp: DateTime<Utc>,
}

/// History entry exposed to callers: metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version_number: i64,
    pub editor_name: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Version> for VersionSummary {
    fn from(version: Version) -> Self {
        Self {
            version_number: version.version_number,
            editor_name: version.editor_name,
            timestamp: version.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Ascending,
    /// Most recent first, for history display.
    Descending,
}

impl VersionOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

const VERSION_COLUMNS: &str =
    "id, page_id, version_number, blob_ref, size_bytes, sha256, editor_name, created_at";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    let size_bytes: i64 = row.get(4)?;

    Ok(Version {
        id: row.get(0)?,
        page_id: row.get(1)?,
        version_number: row.get(2)?,
        blob_ref: row.get(3)?,
        size_bytes: size_bytes as u64,
        sha256: row.get(5)?,
        editor_name: row.get(6)?,
        timestamp: timestamp_column(row, 7)?,
    })
}

/// Append-only collection of version records.
pub struct VersionLedger<'c> {
    conn: &'c Connection,
}

impl<'c> VersionLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append a record. The caller picks the version number; a duplicate
    /// `(page_id, version_number)` is rejected.
    pub fn append(&self, version: &Version) -> Result<()> {
        let inserted = self.conn.execute(
            "INSERT INTO versions (
                id, page_id, version_number, blob_ref, size_bytes, sha256,
                editor_name, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id,
                version.page_id,
                version.version_number,
                version.blob_ref,
                version.size_bytes as i64,
                version.sha256,
                version.editor_name,
                format_timestamp(&version.timestamp),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::debug!(
                    "Appended version {} for page {} (blob {})",
                    version.version_number,
                    version.page_id,
                    version.blob_ref
                );
                Ok(())
            }
            Err(error) if is_constraint_violation(&error) => {
                Err(FolioError::InvariantViolation(format!(
                    "version {} of page {} already recorded",
                    version.version_number, version.page_id
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn list_by_page(&self, page_id: &str, order: VersionOrder) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM versions WHERE page_id = ?1 ORDER BY version_number {}",
            VERSION_COLUMNS,
            order.sql()
        ))?;

        let rows = stmt.query_map([page_id], version_from_row)?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    pub fn find(&self, page_id: &str, version_number: i64) -> Result<Version> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM versions WHERE page_id = ?1 AND version_number = ?2",
                    VERSION_COLUMNS
                ),
                params![page_id, version_number],
                version_from_row,
            )
            .optional()?
            .ok_or_else(|| FolioError::VersionNotFound {
                page_id: page_id.to_string(),
                version: version_number,
            })
    }

    pub fn find_by_blob_ref(&self, blob_ref: &str) -> Result<Option<Version>> {
        let version = self
            .conn
            .query_row(
                &format!("SELECT {} FROM versions WHERE blob_ref = ?1", VERSION_COLUMNS),
                [blob_ref],
                version_from_row,
            )
            .optional()?;
        Ok(version)
    }

    /// Every record in insertion order.
    pub fn all(&self) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM versions ORDER BY pk",
            VERSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], version_from_row)?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    pub fn delete_by_page(&self, page_id: &str) -> Result<usize> {
        let affected = self
            .conn
            .execute("DELETE FROM versions WHERE page_id = ?1", [page_id])?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MetadataStore;

    fn version(page_id: &str, n: i64) -> Version {
        Version {
            id: format!("{}-{}", page_id, n),
            page_id: page_id.to_string(),
            version_number: n,
            blob_ref: format!("{}_v{}_x.txt", page_id, n),
            size_bytes: 3,
            sha256: "00".repeat(32),
            editor_name: "ed".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn store() -> (tempfile::TempDir, MetadataStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("metadata.db")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_append_and_list() {
        let (_dir, store) = store();
        store
            .write(|tx| {
                let ledger = VersionLedger::new(tx);
                ledger.append(&version("p1", 1))?;
                ledger.append(&version("p1", 2))?;
                ledger.append(&version("p2", 1))?;
                ledger.append(&version("p1", 3))?;
                Ok(())
            })
            .unwrap();

        store
            .read(|conn| {
                let ledger = VersionLedger::new(conn);
                let newest_first: Vec<i64> = ledger
                    .list_by_page("p1", VersionOrder::Descending)?
                    .into_iter()
                    .map(|v| v.version_number)
                    .collect();
                assert_eq!(newest_first, vec![3, 2, 1]);

                let oldest_first: Vec<i64> = ledger
                    .list_by_page("p1", VersionOrder::Ascending)?
                    .into_iter()
                    .map(|v| v.version_number)
                    .collect();
                assert_eq!(oldest_first, vec![1, 2, 3]);

                assert_eq!(ledger.all()?.len(), 4);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_duplicate_version_number_is_rejected() {
        let (_dir, store) = store();
        store
            .write(|tx| VersionLedger::new(tx).append(&version("p1", 1)))
            .unwrap();

        let mut dup = version("p1", 1);
        dup.id = "other".to_string();
        let err = store
            .write(|tx| VersionLedger::new(tx).append(&dup))
            .unwrap_err();
        assert!(matches!(err, FolioError::InvariantViolation(_)));
    }

    #[test]
    fn test_find() {
        let (_dir, store) = store();
        let v1 = version("p1", 1);
        store.write(|tx| VersionLedger::new(tx).append(&v1)).unwrap();

        let found = store
            .read(|conn| VersionLedger::new(conn).find("p1", 1))
            .unwrap();
        assert_eq!(found, v1);

        let by_blob = store
            .read(|conn| VersionLedger::new(conn).find_by_blob_ref(&v1.blob_ref))
            .unwrap();
        assert_eq!(by_blob, Some(v1));

        let missing = store.read(|conn| VersionLedger::new(conn).find("p1", 2));
        assert!(matches!(
            missing,
            Err(FolioError::VersionNotFound { version: 2, .. })
        ));
    }

    #[test]
    fn test_delete_by_page() {
        let (_dir, store) = store();
        store
            .write(|tx| {
                let ledger = VersionLedger::new(tx);
                ledger.append(&version("p1", 1))?;
                ledger.append(&version("p1", 2))?;
                ledger.append(&version("p2", 1))?;
                Ok(())
            })
            .unwrap();

        let removed = store
            .write(|tx| VersionLedger::new(tx).delete_by_page("p1"))
            .unwrap();
        assert_eq!(removed, 2);

        store
            .read(|conn| {
                let ledger = VersionLedger::new(conn);
                assert!(ledger.list_by_page("p1", VersionOrder::Ascending)?.is_empty());
                assert_eq!(ledger.list_by_page("p2", VersionOrder::Ascending)?.len(), 1);
                Ok(())
            })
            .unwrap();
    }
}
