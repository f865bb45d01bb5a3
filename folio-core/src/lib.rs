//! Folio Core - versioned page storage for a book/chapter/page CMS
//!
//! Every edit to a page becomes an immutable, numbered version:
//! - Full content per version in write-once blob files
//! - Version ledger, page registry and hierarchy in SQLite
//! - Per-page locks plus compare-and-swap pointer advances
//! - Restore appends a copy of an old version instead of rewinding

pub mod error;
pub mod hierarchy;
pub mod operations;
pub mod storage;
pub mod version_store;

pub use error::{ErrorKind, FolioError, Result};
pub use hierarchy::{
    BookDetails, BookUpdate, ChapterUpdate, ChapterWithPages, CreateBookRequest,
    CreateChapterRequest, Hierarchy,
};
pub use operations::{IntegrityIssue, IntegrityReport, RestoreVersionOperationResult};
pub use storage::{
    BlobName, BlobStore, Book, BookTable, Chapter, ChapterTable, CleanupFailure, CleanupReport,
    FsBlobStore, MetadataStore, NewPage, Page, PageGuard, PageLocks, PageRegistry, StoredBlob,
    Version, VersionLedger, VersionOrder, VersionSummary, compute_hash, verify_hash,
};
pub use version_store::{BLOBS_DIR, METADATA_FILE, PageUpdate, StoreLayout, VersionStore};
