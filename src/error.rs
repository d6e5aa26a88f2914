//! Error types for Canopy

use uuid::Uuid;

/// Coarse error categories the calling API layer maps onto status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InsecureOperation,
    SelfInheritance,
    CannotInheritOutsideTree,
    Internal,
}

/// The main error type for Canopy operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanopyError {
    #[error("page not found: {0}")]
    PageNotFound(Uuid),

    #[error("permission not found: {0}")]
    PermissionNotFound(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insecure operation: {0}")]
    InsecureOperation(String),

    #[error("a page cannot inherit from its own permission")]
    SelfInheritance,

    #[error("page {target_page} cannot inherit from {source_page}, which is not one of its ancestors")]
    CannotInheritOutsideTree { source_page: Uuid, target_page: Uuid },

    #[error("corrupt page tree: {0}")]
    CorruptTree(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CanopyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PageNotFound(_) | Self::PermissionNotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InsecureOperation(_) => ErrorKind::InsecureOperation,
            Self::SelfInheritance => ErrorKind::SelfInheritance,
            Self::CannotInheritOutsideTree { .. } => ErrorKind::CannotInheritOutsideTree,
            Self::CorruptTree(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    #[inline]
    pub fn insecure(msg: impl Into<String>) -> Self {
        Self::InsecureOperation(msg.into())
    }
}

/// Result type alias for Canopy operations
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Convert a storage or serialization error to CanopyError
pub fn err<E: std::fmt::Display>(e: E) -> CanopyError {
    CanopyError::Storage(e.to_string())
}
