use crate::value::Value;
use std::fmt;

pub type IndexResult<T> = Result<T, IndexError>;

/// Which kind of index-owned handle an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Dimension,
    Group,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Dimension => f.write_str("dimension"),
            HandleKind::Group => f.write_str("group"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("schema mismatch: expected {expected} values, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column position {position} out of range for {width} columns")]
    ColumnOutOfRange { position: usize, width: usize },

    #[error("{kind} handle used after dispose")]
    DisposedHandle { kind: HandleKind },

    #[error("dimension limit reached: at most {limit} live dimensions per index")]
    DimensionLimit { limit: usize },

    #[error("invalid range: lower bound {lower} is greater than upper bound {upper}")]
    InvalidRange { lower: Value, upper: Value },
}

impl IndexError {
    pub(crate) fn disposed_dimension() -> Self {
        IndexError::DisposedHandle {
            kind: HandleKind::Dimension,
        }
    }

    pub(crate) fn disposed_group() -> Self {
        IndexError::DisposedHandle {
            kind: HandleKind::Group,
        }
    }

    /// Lifecycle misuse (as opposed to bad input data).
    pub fn is_disposed_handle(&self) -> bool {
        matches!(self, IndexError::DisposedHandle { .. })
    }
}
