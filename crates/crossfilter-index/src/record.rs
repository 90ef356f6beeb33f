use crate::error::{IndexError, IndexResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Addresses a column of a [`RowRecord`] either by name or by position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Name(String),
    Position(usize),
}

impl ColumnRef {
    /// Resolve against a column list.
    pub fn position_in(&self, columns: &[String]) -> IndexResult<usize> {
        match self {
            ColumnRef::Name(name) => columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| IndexError::UnknownColumn(name.clone())),
            ColumnRef::Position(position) if *position < columns.len() => Ok(*position),
            ColumnRef::Position(position) => Err(IndexError::ColumnOutOfRange {
                position: *position,
                width: columns.len(),
            }),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(value: &str) -> Self {
        ColumnRef::Name(value.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(value: String) -> Self {
        ColumnRef::Name(value)
    }
}

impl From<usize> for ColumnRef {
    fn from(value: usize) -> Self {
        ColumnRef::Position(value)
    }
}

/// One row of a query result, addressable by column name or position.
///
/// Records produced from the same result share a single column list.
#[derive(Clone, Debug, PartialEq)]
pub struct RowRecord {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl RowRecord {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> IndexResult<Self> {
        if values.len() != columns.len() {
            return Err(IndexError::SchemaMismatch {
                expected: columns.len(),
                actual: values.len(),
            });
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `column`, or `Null` when the column does not exist.
    pub fn get(&self, column: &ColumnRef) -> &Value {
        match column {
            ColumnRef::Name(name) => self.by_name(name),
            ColumnRef::Position(position) => self.at(*position),
        }
    }

    pub fn by_name(&self, name: &str) -> &Value {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.at(idx))
            .unwrap_or(&NULL)
    }

    pub fn at(&self, position: usize) -> &Value {
        self.values.get(position).unwrap_or(&NULL)
    }
}

/// A loaded query result as delivered by the dashboard layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultData {
    pub fn new(columns: Vec<impl Into<String>>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Normalize into records (`record[columns[j]] = row[j]`).
    pub fn into_records(self) -> IndexResult<Vec<RowRecord>> {
        let columns: Arc<[String]> = Arc::from(self.columns);
        self.rows
            .into_iter()
            .map(|row| RowRecord::new(Arc::clone(&columns), row))
            .collect()
    }

    pub fn records(&self) -> IndexResult<Vec<RowRecord>> {
        self.clone().into_records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ResultData {
        ResultData::new(
            vec!["region", "sales"],
            vec![
                vec![Value::from("West"), Value::from(10.0)],
                vec![Value::from("East"), Value::from(4.0)],
            ],
        )
    }

    #[test]
    fn records_are_addressable_by_name_and_position() {
        let records = result().into_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].by_name("region"), &Value::from("West"));
        assert_eq!(records[1].at(1), &Value::from(4.0));
        assert_eq!(records[1].get(&ColumnRef::from("missing")), &Value::Null);
        assert_eq!(records[1].get(&ColumnRef::from(9usize)), &Value::Null);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut data = result();
        data.rows.push(vec![Value::from("North")]);
        assert_eq!(
            data.into_records().unwrap_err(),
            IndexError::SchemaMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn column_refs_resolve_against_schema() {
        let columns = vec!["a".to_string(), "b".to_string()];
        assert_eq!(ColumnRef::from("b").position_in(&columns), Ok(1));
        assert_eq!(
            ColumnRef::from("c").position_in(&columns),
            Err(IndexError::UnknownColumn("c".into()))
        );
        assert_eq!(
            ColumnRef::from(2usize).position_in(&columns),
            Err(IndexError::ColumnOutOfRange {
                position: 2,
                width: 2
            })
        );
    }

    #[test]
    fn result_data_parses_from_json() {
        let data: ResultData =
            serde_json::from_str(r#"{"columns":["region","sales"],"rows":[["West",10],["East",null]]}"#)
                .unwrap();
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.rows[1][1], Value::Null);
    }
}
