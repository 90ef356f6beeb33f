use crate::error::IndexResult;
use crate::record::{ColumnRef, RowRecord};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A user-supplied incremental reduction.
///
/// Groups are maintained incrementally, so implementations must be reversible:
/// `remove(add(acc, r), r)` must be observationally equal to `acc` for every accumulator and
/// record.
pub trait CustomReducer: Send + Sync {
    fn initial(&self) -> Value;
    fn add(&self, acc: Value, record: &RowRecord) -> Value;
    fn remove(&self, acc: Value, record: &RowRecord) -> Value;
}

/// A [`CustomReducer`] assembled from three closures.
pub struct ReduceFns<I, A, R> {
    pub initial: I,
    pub add: A,
    pub remove: R,
}

impl<I, A, R> CustomReducer for ReduceFns<I, A, R>
where
    I: Fn() -> Value + Send + Sync,
    A: Fn(Value, &RowRecord) -> Value + Send + Sync,
    R: Fn(Value, &RowRecord) -> Value + Send + Sync,
{
    fn initial(&self) -> Value {
        (self.initial)()
    }

    fn add(&self, acc: Value, record: &RowRecord) -> Value {
        (self.add)(acc, record)
    }

    fn remove(&self, acc: Value, record: &RowRecord) -> Value {
        (self.remove)(acc, record)
    }
}

/// How a group folds the records of each key into an aggregate.
#[derive(Clone)]
pub enum Reducer {
    /// Number of records.
    Count,
    /// Sum of a numeric column; non-numeric cells contribute nothing.
    Sum(ColumnRef),
    Custom(Arc<dyn CustomReducer>),
}

impl Reducer {
    pub fn count() -> Self {
        Reducer::Count
    }

    pub fn sum(column: impl Into<ColumnRef>) -> Self {
        Reducer::Sum(column.into())
    }

    pub fn custom(reducer: impl CustomReducer + 'static) -> Self {
        Reducer::Custom(Arc::new(reducer))
    }

    pub fn from_fns<I, A, R>(initial: I, add: A, remove: R) -> Self
    where
        I: Fn() -> Value + Send + Sync + 'static,
        A: Fn(Value, &RowRecord) -> Value + Send + Sync + 'static,
        R: Fn(Value, &RowRecord) -> Value + Send + Sync + 'static,
    {
        Self::custom(ReduceFns {
            initial,
            add,
            remove,
        })
    }

    pub(crate) fn bind(&self, columns: &[String]) -> IndexResult<BoundReducer> {
        Ok(match self {
            Reducer::Count => BoundReducer::Count,
            Reducer::Sum(column) => BoundReducer::Sum(column.position_in(columns)?),
            Reducer::Custom(custom) => BoundReducer::Custom(Arc::clone(custom)),
        })
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Count => f.write_str("Count"),
            Reducer::Sum(column) => f.debug_tuple("Sum").field(column).finish(),
            Reducer::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A [`Reducer`] with its column resolved against an index schema.
#[derive(Clone)]
pub(crate) enum BoundReducer {
    Count,
    Sum(usize),
    Custom(Arc<dyn CustomReducer>),
}

impl BoundReducer {
    pub(crate) fn initial(&self) -> Value {
        match self {
            BoundReducer::Count | BoundReducer::Sum(_) => Value::from(0.0),
            BoundReducer::Custom(custom) => custom.initial(),
        }
    }

    pub(crate) fn add(&self, acc: Value, record: &RowRecord) -> Value {
        match self {
            BoundReducer::Count => Value::from(number(&acc) + 1.0),
            BoundReducer::Sum(idx) => {
                Value::from(number(&acc) + record.at(*idx).as_number().unwrap_or(0.0))
            }
            BoundReducer::Custom(custom) => custom.add(acc, record),
        }
    }

    pub(crate) fn remove(&self, acc: Value, record: &RowRecord) -> Value {
        match self {
            BoundReducer::Count => Value::from(number(&acc) - 1.0),
            BoundReducer::Sum(idx) => {
                Value::from(number(&acc) - record.at(*idx).as_number().unwrap_or(0.0))
            }
            BoundReducer::Custom(custom) => custom.remove(acc, record),
        }
    }
}

fn number(value: &Value) -> f64 {
    value.as_number().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, sales: f64) -> RowRecord {
        let columns: Arc<[String]> = Arc::from(vec!["region".to_string(), "sales".to_string()]);
        RowRecord::new(columns, vec![Value::from(region), Value::from(sales)]).unwrap()
    }

    #[test]
    fn sum_binds_by_name_and_is_reversible() {
        let columns = vec!["region".to_string(), "sales".to_string()];
        let reducer = Reducer::sum("sales").bind(&columns).unwrap();
        let r = record("West", 7.0);
        let acc = reducer.add(reducer.initial(), &r);
        assert_eq!(acc, Value::from(7.0));
        assert_eq!(reducer.remove(acc, &r), reducer.initial());
    }

    #[test]
    fn sum_of_unknown_column_fails_to_bind() {
        let columns = vec!["region".to_string()];
        assert!(Reducer::sum("sales").bind(&columns).is_err());
    }

    #[test]
    fn count_ignores_record_contents() {
        let reducer = Reducer::count().bind(&[]).unwrap();
        let r = record("West", 7.0);
        let acc = reducer.add(reducer.add(reducer.initial(), &r), &r);
        assert_eq!(acc, Value::from(2.0));
    }
}
