//! Storage modules for Folio
//!
//! Blob files hold version content; a SQLite metadata store holds the page
//! registry, the version ledger and the book/chapter hierarchy.

pub mod blob_store;
pub mod hierarchy_store;
pub mod metadata_store;
pub mod page_locks;
pub mod page_registry;
pub mod version_ledger;

pub use blob_store::{
    BlobName, BlobStore, CleanupFailure, CleanupReport, FsBlobStore, StoredBlob, compute_hash,
    verify_hash,
};
pub use hierarchy_store::{Book, BookTable, Chapter, ChapterTable};
pub use metadata_store::MetadataStore;
pub use page_locks::{PageGuard, PageLocks};
pub use page_registry::{NewPage, Page, PageRegistry};
pub use version_ledger::{Version, VersionLedger, VersionOrder, VersionSummary};
