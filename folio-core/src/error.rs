use thiserror::Error;

/// Coarse classification of a [`FolioError`], for callers that translate
/// failures into protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvariantViolation,
    IoFailure,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("version {version} not found for page {page_id}")]
    VersionNotFound { page_id: String, version: i64 },

    /// A ledger entry points at a blob that is gone. Never a normal miss.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("book not found: {0}")]
    BookNotFound(String),

    #[error("chapter not found: {0}")]
    ChapterNotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FolioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PageNotFound(_)
            | Self::VersionNotFound { .. }
            | Self::BlobNotFound(_)
            | Self::BookNotFound(_)
            | Self::ChapterNotFound(_) => ErrorKind::NotFound,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Io(_) | Self::Sqlite(_) => ErrorKind::IoFailure,
            Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::InvalidRequest,
            Self::Internal(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// True for page, version, book and chapter misses. A missing blob is an
    /// integrity failure and is excluded.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound && !matches!(self, Self::BlobNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FolioError::PageNotFound("p".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FolioError::VersionNotFound {
                page_id: "p".to_string(),
                version: 3
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FolioError::InvariantViolation("x".to_string()).kind(),
            ErrorKind::InvariantViolation
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(FolioError::from(io).kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_blob_miss_is_not_a_plain_not_found() {
        assert!(FolioError::PageNotFound("p".to_string()).is_not_found());
        assert!(!FolioError::BlobNotFound("p_v1_x.txt".to_string()).is_not_found());
    }

    #[test]
    fn test_display() {
        let err = FolioError::VersionNotFound {
            page_id: "abc".to_string(),
            version: 7,
        };
        assert_eq!(err.to_string(), "version 7 not found for page abc");
    }
}
