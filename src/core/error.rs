use std::fmt;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidState,
    Internal,
    UnsupportedQuery,
    UnknownCollection,
    InconsistentQuery,   // dual bound containing an equality on one property
    InvalidOrderBy,      // ORDER BY target has no ordered index
    DomainNotComplete,   // "only if complete" query not covered by the loaded domain
    ConditionNotSatisfied,
    FailedToAcquireLock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn unknown_collection(name: &str) -> Self {
        Error::new(ErrorKind::UnknownCollection, format!("Collection '{}' is not registered", name))
    }

    pub fn inconsistent_query(property: &str) -> Self {
        Error::new(ErrorKind::InconsistentQuery, format!("Inconsistent query on index {}", property))
    }

    pub fn invalid_order_by(property: &str) -> Self {
        Error::new(
            ErrorKind::InvalidOrderBy,
            format!("Can not order by '{}': it is not an ordered index", property),
        )
    }

    pub fn condition_not_satisfied(context: String) -> Self {
        Error::new(ErrorKind::ConditionNotSatisfied, context)
    }

    /// None of the kinds are retried by this layer; retry policy belongs to callers.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
