use crate::db::query::IndexRequirement;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `class`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a request-validation error for a specific origin.
    pub(crate) fn validation(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, origin, message)
    }

    /// Construct a corruption error for a specific origin.
    pub(crate) fn corruption(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, origin, message)
    }

    /// Construct an internal error for a specific origin.
    pub(crate) fn internal(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, origin, message)
    }

    /// Construct an unsupported-operation error for a specific origin.
    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    /// Construct a planner-origin validation error.
    pub(crate) fn bad_query(message: impl Into<String>) -> Self {
        Self::validation(ErrorOrigin::Planner, message)
    }

    /// Construct an index-origin corruption error.
    pub(crate) fn index_corruption(message: impl Into<String>) -> Self {
        Self::corruption(ErrorOrigin::Index, message)
    }

    /// Construct a data-origin corruption error.
    pub(crate) fn data_corruption(message: impl Into<String>) -> Self {
        Self::corruption(ErrorOrigin::Data, message)
    }

    /// Construct the "needs index" condition for a query shape that no
    /// ready composite index satisfies.
    pub(crate) fn needs_index(requirement: IndexRequirement) -> Self {
        Self {
            class: ErrorClass::NeedsIndex,
            origin: ErrorOrigin::Planner,
            message: format!("query requires a composite index: {requirement}"),
            detail: Some(ErrorDetail::NeedsIndex(requirement)),
        }
    }

    /// Wrap a store failure, classifying it by retryability.
    pub(crate) fn store(origin: ErrorOrigin, err: StoreError) -> Self {
        let class = err.class();

        Self {
            class,
            origin,
            message: format!("{origin}: {err}"),
            detail: Some(ErrorDetail::Store(err)),
        }
    }

    #[must_use]
    pub const fn is_needs_index(&self) -> bool {
        matches!(self.class, ErrorClass::NeedsIndex)
    }

    /// True if the failure came from the store and may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => err.is_retryable(),
            _ => false,
        }
    }

    /// Borrow the store failure carried by this error, if any.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => Some(err),
            _ => None,
        }
    }

    /// Borrow the missing-index shape carried by a needs-index error.
    #[must_use]
    pub const fn index_requirement(&self) -> Option<&IndexRequirement> {
        match &self.detail {
            Some(ErrorDetail::NeedsIndex(requirement)) => Some(requirement),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        Self::store(ErrorOrigin::Store, err)
    }
}

///
/// ErrorDetail
///
/// Structured, class-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    NeedsIndex(IndexRequirement),

    #[error("{0}")]
    Store(StoreError),
}

///
/// StoreError
///
/// Failures reported by the transactional store.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("transaction not committed due to conflict with another transaction")]
    NotCommitted,

    #[error("transaction is too old to perform reads or be committed")]
    TransactionTooOld,

    #[error("transaction may or may not have committed")]
    CommitUnknownResult,

    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("invalid key selector or range: {message}")]
    InvalidSelector { message: String },

    #[error("operation issued while a commit was outstanding")]
    UsedDuringCommit,
}

impl StoreError {
    /// Conflicts, stale transactions and ambiguous commits can be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotCommitted | Self::TransactionTooOld | Self::CommitUnknownResult
        )
    }

    /// True if the mutation may have been applied despite the error.
    #[must_use]
    pub const fn maybe_committed(&self) -> bool {
        matches!(self, Self::CommitUnknownResult)
    }

    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::NotCommitted | Self::TransactionTooOld | Self::CommitUnknownResult => {
                ErrorClass::Conflict
            }
            Self::Unavailable { .. } => ErrorClass::Unavailable,
            Self::InvalidSelector { .. } | Self::UsedDuringCommit => ErrorClass::Internal,
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Validation,
    NeedsIndex,
    Conflict,
    Unavailable,
    Corruption,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::NeedsIndex => "needs_index",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Corruption => "corruption",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Codec,
    Allocator,
    Iterator,
    Planner,
    Index,
    Data,
    Store,
    Serialize,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Codec => "codec",
            Self::Allocator => "allocator",
            Self::Iterator => "iterator",
            Self::Planner => "planner",
            Self::Index => "index",
            Self::Data => "data",
            Self::Store => "store",
            Self::Serialize => "serialize",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
