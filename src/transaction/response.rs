use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind};
use crate::core::types::PackedObject;
use crate::executor::pivot::PivotLevel;

/// Count of matching objects and whether the in-memory data answers it completely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub count: usize,
    pub complete: bool,
}

/// Outcome signal sent back to a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Null,
    Ready,
    ItemsCount(usize),
    Items(Vec<PackedObject>),
    Eval(EvalResponse),
    Pivot(PivotLevel),
    Exception { kind: ErrorKind, message: String },
}

impl Response {
    pub fn is_exception(&self) -> bool {
        matches!(self, Response::Exception { .. })
    }

    pub fn exception_kind(&self) -> Option<ErrorKind> {
        match self {
            Response::Exception { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::Exception { kind: err.kind, message: err.context }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_become_exceptions() {
        let response: Response = Error::unknown_collection("nope").into();
        assert!(response.is_exception());
        assert_eq!(response.exception_kind(), Some(ErrorKind::UnknownCollection));
        assert_eq!(Response::Ready.exception_kind(), None);
    }
}
