//! In-memory dimensional index for cross-filtered dashboards.
//!
//! This crate focuses on:
//! - Row records normalized from tabular query results.
//! - Dimensions (a projection of every record to a key) with sorted key order for fast
//!   exact/range filtering.
//! - Groups that keep per-key aggregates incrementally up to date as dimension filters change.
//!
//! All dimensions and groups live inside the [`DimensionalIndex`] that created them and are
//! addressed through generation-checked ids, so a disposed handle is reported as
//! [`IndexError::DisposedHandle`] instead of reading stale state.

#![forbid(unsafe_code)]

mod arena;
mod bitmap;
mod dimension;
mod error;
mod group;
mod index;
mod record;
mod reducer;
mod selection;
mod value;

pub use crate::bitmap::BitVec;
pub use crate::dimension::{DimensionId, Projector};
pub use crate::error::{HandleKind, IndexError, IndexResult};
pub use crate::group::{GroupEntry, GroupId, GroupScope};
pub use crate::index::{DimensionalIndex, MAX_DIMENSIONS};
pub use crate::record::{ColumnRef, ResultData, RowRecord};
pub use crate::reducer::{CustomReducer, ReduceFns, Reducer};
pub use crate::selection::{FilterKey, FilterSelection};
pub use crate::value::Value;
