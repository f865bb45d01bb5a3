use super::metadata_store::{format_timestamp, timestamp_column};
use crate::error::{FolioError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub title: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub is_index_page: bool,
    pub current_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a page is created.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub is_index_page: bool,
}

const PAGE_COLUMNS: &str =
    "id, title, book_id, chapter_id, is_index_page, current_version, created_at, updated_at";

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        title: row.get(1)?,
        book_id: row.get(2)?,
        chapter_id: row.get(3)?,
        is_index_page: row.get(4)?,
        current_version: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}

/// Page records and their `current_version` pointers.
pub struct PageRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> PageRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert a page with `current_version = 1`.
    pub fn create(&self, id: &str, fields: &NewPage, now: DateTime<Utc>) -> Result<Page> {
        let page = Page {
            id: id.to_string(),
            title: fields.title.clone(),
            book_id: fields.book_id.clone(),
            chapter_id: fields.chapter_id.clone(),
            is_index_page: fields.is_index_page,
            current_version: 1,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO pages (
                id, title, book_id, chapter_id, is_index_page, current_version,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                page.id,
                page.title,
                page.book_id,
                page.chapter_id,
                page.is_index_page,
                page.current_version,
                format_timestamp(&page.created_at),
                format_timestamp(&page.updated_at),
            ],
        )?;

        Ok(page)
    }

    pub fn find(&self, id: &str) -> Result<Option<Page>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                [id],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    pub fn get(&self, id: &str) -> Result<Page> {
        self.find(id)?
            .ok_or_else(|| FolioError::PageNotFound(id.to_string()))
    }

    /// Advance the pointer from `n - 1` to `n`.
    ///
    /// The update is conditional on the stored value, so a lost or duplicated
    /// advance fails with `InvariantViolation` instead of overwriting.
    pub fn set_current_version(&self, id: &str, n: i64, now: DateTime<Utc>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE pages SET current_version = ?2, updated_at = ?3
             WHERE id = ?1 AND current_version = ?2 - 1",
            params![id, n, format_timestamp(&now)],
        )?;

        if affected == 1 {
            return Ok(());
        }

        let page = self.get(id)?;
        Err(FolioError::InvariantViolation(format!(
            "page {} cannot move current_version from {} to {}",
            id, page.current_version, n
        )))
    }

    pub fn update_title(&self, id: &str, title: &str, now: DateTime<Utc>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE pages SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, title, format_timestamp(&now)],
        )?;

        if affected == 0 {
            return Err(FolioError::PageNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM pages WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    pub fn list(&self) -> Result<Vec<Page>> {
        self.query(
            &format!("SELECT {} FROM pages ORDER BY rowid", PAGE_COLUMNS),
            None,
        )
    }

    pub fn list_by_book(&self, book_id: &str) -> Result<Vec<Page>> {
        self.query(
            &format!(
                "SELECT {} FROM pages WHERE book_id = ?1 ORDER BY rowid",
                PAGE_COLUMNS
            ),
            Some(book_id),
        )
    }

    pub fn list_by_chapter(&self, chapter_id: &str) -> Result<Vec<Page>> {
        self.query(
            &format!(
                "SELECT {} FROM pages WHERE chapter_id = ?1 ORDER BY rowid",
                PAGE_COLUMNS
            ),
            Some(chapter_id),
        )
    }

    fn query(&self, sql: &str, key: Option<&str>) -> Result<Vec<Page>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = match key {
            Some(key) => stmt.query_map([key], page_from_row)?,
            None => stmt.query_map([], page_from_row)?,
        };

        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MetadataStore;

    fn new_page(book_id: &str, chapter_id: Option<&str>) -> NewPage {
        NewPage {
            title: "Intro".to_string(),
            book_id: book_id.to_string(),
            chapter_id: chapter_id.map(str::to_string),
            is_index_page: false,
        }
    }

    fn store() -> (tempfile::TempDir, MetadataStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("metadata.db")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let created = store
            .write(|tx| PageRegistry::new(tx).create("p1", &new_page("b1", None), Utc::now()))
            .unwrap();
        assert_eq!(created.current_version, 1);

        let fetched = store.read(|conn| PageRegistry::new(conn).get("p1")).unwrap();
        assert_eq!(fetched, created);

        let missing = store.read(|conn| PageRegistry::new(conn).get("nope"));
        assert!(matches!(missing, Err(FolioError::PageNotFound(_))));
    }

    #[test]
    fn test_set_current_version_is_monotonic() {
        let (_dir, store) = store();
        store
            .write(|tx| PageRegistry::new(tx).create("p1", &new_page("b1", None), Utc::now()))
            .unwrap();

        store
            .write(|tx| PageRegistry::new(tx).set_current_version("p1", 2, Utc::now()))
            .unwrap();

        // Same value again: a duplicate advance.
        let duplicate =
            store.write(|tx| PageRegistry::new(tx).set_current_version("p1", 2, Utc::now()));
        assert!(matches!(duplicate, Err(FolioError::InvariantViolation(_))));

        // Backwards.
        let backwards =
            store.write(|tx| PageRegistry::new(tx).set_current_version("p1", 1, Utc::now()));
        assert!(matches!(backwards, Err(FolioError::InvariantViolation(_))));

        // Skipping a number.
        let skip =
            store.write(|tx| PageRegistry::new(tx).set_current_version("p1", 5, Utc::now()));
        assert!(matches!(skip, Err(FolioError::InvariantViolation(_))));

        let missing =
            store.write(|tx| PageRegistry::new(tx).set_current_version("nope", 2, Utc::now()));
        assert!(matches!(missing, Err(FolioError::PageNotFound(_))));

        let page = store.read(|conn| PageRegistry::new(conn).get("p1")).unwrap();
        assert_eq!(page.current_version, 2);
    }

    #[test]
    fn test_list_filters_and_delete() {
        let (_dir, store) = store();
        store
            .write(|tx| {
                let registry = PageRegistry::new(tx);
                registry.create("p1", &new_page("b1", Some("c1")), Utc::now())?;
                registry.create("p2", &new_page("b1", None), Utc::now())?;
                registry.create("p3", &new_page("b2", Some("c1")), Utc::now())?;
                Ok(())
            })
            .unwrap();

        store
            .read(|conn| {
                let registry = PageRegistry::new(conn);
                assert_eq!(registry.list()?.len(), 3);
                assert_eq!(registry.list_by_book("b1")?.len(), 2);
                assert_eq!(registry.list_by_chapter("c1")?.len(), 2);
                Ok(())
            })
            .unwrap();

        assert!(store.write(|tx| PageRegistry::new(tx).delete("p1")).unwrap());
        assert!(!store.write(|tx| PageRegistry::new(tx).delete("p1")).unwrap());
    }

    #[test]
    fn test_update_title() {
        let (_dir, store) = store();
        store
            .write(|tx| PageRegistry::new(tx).create("p1", &new_page("b1", None), Utc::now()))
            .unwrap();
        store
            .write(|tx| PageRegistry::new(tx).update_title("p1", "Renamed", Utc::now()))
            .unwrap();

        let page = store.read(|conn| PageRegistry::new(conn).get("p1")).unwrap();
        assert_eq!(page.title, "Renamed");
        assert_eq!(page.current_version, 1);
    }
}
