//! Book and chapter bookkeeping around the version store.
//!
//! Books and chapters are plain records. They reference pages by id and never
//! own version history; the only call into the version store is creating the
//! pages a new book starts with.

use crate::operations::{CreatePageOperation, CreatePageOperationRequest};
use crate::storage::metadata_store::require_title;
use crate::{
    Book, BookTable, Chapter, ChapterTable, FolioError, MetadataStore, Page, PageRegistry, Result,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use ulid::Ulid;

const DEFAULT_INDEX_CONTENT: &str = "Index page content";

#[derive(Debug, Clone)]
pub struct CreateBookRequest {
    pub title: String,
    pub description: Option<String>,
    /// Content of the index page; a default text is used when absent.
    pub index_content: Option<String>,
    /// Number of empty pages to create after the index page.
    pub initial_pages: usize,
    pub editor_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateChapterRequest {
    pub book_id: String,
    pub title: String,
    /// Defaults to one past the number of chapters already in the book.
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub index_page: Option<Page>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterWithPages {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub pages: Vec<Page>,
}

#[derive(Clone)]
pub struct Hierarchy {
    metadata: Arc<MetadataStore>,
    create_page: CreatePageOperation,
}

impl Hierarchy {
    pub fn new(metadata: Arc<MetadataStore>, create_page: CreatePageOperation) -> Self {
        Self {
            metadata,
            create_page,
        }
    }

    /// Create a book together with its index page and `initial_pages` empty
    /// pages.
    pub async fn create_book(&self, request: CreateBookRequest) -> Result<Book> {
        let CreateBookRequest {
            title,
            description,
            index_content,
            initial_pages,
            editor_name,
        } = request;

        let title = require_title(&title)?;
        let now = Utc::now();
        let mut book = Book {
            id: Ulid::new().to_string(),
            title,
            description,
            index_page_id: None,
            created_at: now,
            updated_at: now,
        };

        self.metadata.write(|tx| BookTable::new(tx).insert(&book))?;

        let index_page = self
            .create_page
            .run(CreatePageOperationRequest {
                title: format!("{} - Index", book.title),
                content: index_content.unwrap_or_else(|| DEFAULT_INDEX_CONTENT.to_string()),
                book_id: book.id.clone(),
                chapter_id: None,
                is_index_page: true,
                editor_name: editor_name.clone(),
            })
            .await?
            .page;

        book.index_page_id = Some(index_page.id);
        book.updated_at = Utc::now();
        self.metadata.write(|tx| BookTable::new(tx).update(&book))?;

        for i in 1..=initial_pages {
            self.create_page
                .run(CreatePageOperationRequest {
                    title: format!("Page {}", i),
                    content: String::new(),
                    book_id: book.id.clone(),
                    chapter_id: None,
                    is_index_page: false,
                    editor_name: editor_name.clone(),
                })
                .await?;
        }

        tracing::info!(
            "Created book {} ({}) with {} initial pages",
            book.id,
            book.title,
            initial_pages
        );

        Ok(book)
    }

    pub fn get_book(&self, id: &str) -> Result<Book> {
        self.metadata.read(|conn| BookTable::new(conn).get(id))
    }

    pub fn list_books(&self) -> Result<Vec<Book>> {
        self.metadata.read(|conn| BookTable::new(conn).list())
    }

    pub fn update_book(&self, id: &str, update: BookUpdate) -> Result<Book> {
        let title = update.title.as_deref().map(require_title).transpose()?;

        self.metadata.write(|tx| {
            let books = BookTable::new(tx);
            let mut book = books.get(id)?;
            if let Some(title) = title {
                book.title = title;
            }
            if let Some(description) = update.description {
                book.description = Some(description);
            }
            book.updated_at = Utc::now();
            books.update(&book)?;
            Ok(book)
        })
    }

    /// Remove the book record. Its pages and chapters are left in place.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        self.metadata.write(|tx| BookTable::new(tx).delete(id))
    }

    pub fn get_book_details(&self, id: &str) -> Result<BookDetails> {
        self.metadata.read(|conn| {
            let book = BookTable::new(conn).get(id)?;
            let chapters = ChapterTable::new(conn).list_by_book(id)?;
            let index_page = match &book.index_page_id {
                Some(page_id) => PageRegistry::new(conn).find(page_id)?,
                None => None,
            };
            Ok(BookDetails {
                book,
                index_page,
                chapters,
            })
        })
    }

    pub fn create_chapter(&self, request: CreateChapterRequest) -> Result<Chapter> {
        let CreateChapterRequest {
            book_id,
            title,
            order,
        } = request;
        let title = require_title(&title)?;

        let chapter = self.metadata.write(|tx| {
            BookTable::new(tx).get(&book_id)?;
            let chapters = ChapterTable::new(tx);
            let order = match order {
                Some(order) => order,
                None => chapters.count_by_book(&book_id)? + 1,
            };

            let now = Utc::now();
            let chapter = Chapter {
                id: Ulid::new().to_string(),
                book_id: book_id.clone(),
                title,
                order,
                created_at: now,
                updated_at: now,
            };
            chapters.insert(&chapter)?;
            Ok(chapter)
        })?;

        tracing::info!(
            "Created chapter {} ({}) in book {} at position {}",
            chapter.id,
            chapter.title,
            chapter.book_id,
            chapter.order
        );
        Ok(chapter)
    }

    pub fn get_chapter(&self, id: &str) -> Result<Chapter> {
        self.metadata.read(|conn| ChapterTable::new(conn).get(id))
    }

    pub fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        self.metadata
            .read(|conn| ChapterTable::new(conn).list_by_book(book_id))
    }

    pub fn update_chapter(&self, id: &str, update: ChapterUpdate) -> Result<Chapter> {
        let title = update.title.as_deref().map(require_title).transpose()?;
        if update.order.is_some_and(|order| order < 1) {
            return Err(FolioError::InvalidRequest(
                "chapter order must be at least 1".to_string(),
            ));
        }

        self.metadata.write(|tx| {
            let chapters = ChapterTable::new(tx);
            let mut chapter = chapters.get(id)?;
            if let Some(title) = title {
                chapter.title = title;
            }
            if let Some(order) = update.order {
                chapter.order = order;
            }
            chapter.updated_at = Utc::now();
            chapters.update(&chapter)?;
            Ok(chapter)
        })
    }

    pub fn delete_chapter(&self, id: &str) -> Result<bool> {
        self.metadata.write(|tx| ChapterTable::new(tx).delete(id))
    }

    pub fn get_chapter_with_pages(&self, id: &str) -> Result<ChapterWithPages> {
        self.metadata.read(|conn| {
            let chapter = ChapterTable::new(conn).get(id)?;
            let pages = PageRegistry::new(conn).list_by_chapter(id)?;
            Ok(ChapterWithPages { chapter, pages })
        })
    }
}
