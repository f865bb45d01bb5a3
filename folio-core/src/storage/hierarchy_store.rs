use super::metadata_store::{format_timestamp, timestamp_column};
use crate::error::{FolioError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub index_page_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub book_id: String,
    pub title: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BOOK_COLUMNS: &str = "id, title, description, index_page_id, created_at, updated_at";
const CHAPTER_COLUMNS: &str = "id, book_id, title, sort_order, created_at, updated_at";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        index_page_id: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        book_id: row.get(1)?,
        title: row.get(2)?,
        order: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

pub struct BookTable<'c> {
    conn: &'c Connection,
}

impl<'c> BookTable<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, book: &Book) -> Result<()> {
        self.conn.execute(
            "INSERT INTO books (id, title, description, index_page_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                book.id,
                book.title,
                book.description,
                book.index_page_id,
                format_timestamp(&book.created_at),
                format_timestamp(&book.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, id: &str) -> Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
                [id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    pub fn get(&self, id: &str) -> Result<Book> {
        self.find(id)?
            .ok_or_else(|| FolioError::BookNotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Book>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM books ORDER BY rowid", BOOK_COLUMNS))?;
        let rows = stmt.query_map([], book_from_row)?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    /// Write back title, description and index page of an existing book.
    pub fn update(&self, book: &Book) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE books SET title = ?2, description = ?3, index_page_id = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                book.id,
                book.title,
                book.description,
                book.index_page_id,
                format_timestamp(&book.updated_at),
            ],
        )?;

        if affected == 0 {
            return Err(FolioError::BookNotFound(book.id.clone()));
        }
        Ok(())
    }

    /// Drop index page references to a page that no longer exists.
    pub fn clear_index_page(&self, page_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE books SET index_page_id = NULL, updated_at = ?2 WHERE index_page_id = ?1",
            params![page_id, format_timestamp(&now)],
        )?;
        Ok(affected)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM books WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }
}

pub struct ChapterTable<'c> {
    conn: &'c Connection,
}

impl<'c> ChapterTable<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, chapter: &Chapter) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chapters (id, book_id, title, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chapter.id,
                chapter.book_id,
                chapter.title,
                chapter.order,
                format_timestamp(&chapter.created_at),
                format_timestamp(&chapter.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, id: &str) -> Result<Option<Chapter>> {
        let chapter = self
            .conn
            .query_row(
                &format!("SELECT {} FROM chapters WHERE id = ?1", CHAPTER_COLUMNS),
                [id],
                chapter_from_row,
            )
            .optional()?;
        Ok(chapter)
    }

    pub fn get(&self, id: &str) -> Result<Chapter> {
        self.find(id)?
            .ok_or_else(|| FolioError::ChapterNotFound(id.to_string()))
    }

    pub fn count_by_book(&self, book_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
            [book_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_by_book(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM chapters WHERE book_id = ?1 ORDER BY sort_order, rowid",
            CHAPTER_COLUMNS
        ))?;
        let rows = stmt.query_map([book_id], chapter_from_row)?;

        let mut chapters = Vec::new();
        for row in rows {
            chapters.push(row?);
        }
        Ok(chapters)
    }

    pub fn update(&self, chapter: &Chapter) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE chapters SET title = ?2, sort_order = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                chapter.id,
                chapter.title,
                chapter.order,
                format_timestamp(&chapter.updated_at),
            ],
        )?;

        if affected == 0 {
            return Err(FolioError::ChapterNotFound(chapter.id.clone()));
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM chapters WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }
}
