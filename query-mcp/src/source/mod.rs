//! Row-oriented query backends.
//!
//! A [`QuerySource`] answers a bounded [`Query`] with a fully materialized
//! [`QueryResult`]. Streaming is layered on top by [`stream::execute_streaming`],
//! which slices that result into ordered batches on a producer task, so any
//! backend that can answer a query can also be streamed.

pub mod mock;
pub mod stream;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use mock::MockSource;
pub use stream::{BatchStream, StreamBatch, StreamOptions, execute_streaming};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub query_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            row_count,
            query_time_ms: 0,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Equality; text comparison ignores ASCII case.
    Equals { column: String, value: CellValue },
    /// Inclusive numeric lower bound.
    AtLeast { column: String, value: f64 },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Equals { column, .. } | Filter::AtLeast { column, .. } => column,
        }
    }

    pub fn matches(&self, cell: &CellValue) -> bool {
        match (self, cell) {
            (Filter::Equals { value: CellValue::Text(want), .. }, CellValue::Text(have)) => {
                want.eq_ignore_ascii_case(have)
            }
            (Filter::Equals { value, .. }, cell) => match (value.as_f64(), cell.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Filter::AtLeast { value, .. }, cell) => cell.as_f64().is_some_and(|v| v >= *value),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { column, value } => write!(f, "{column} = {value}"),
            Filter::AtLeast { column, value } => write!(f, "{column} >= {value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    ShowTables,
    Select { table: String, filters: Vec<Filter> },
}

impl Query {
    pub fn select(table: impl Into<String>) -> Self {
        Query::Select {
            table: table.into(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        if let Query::Select { filters, .. } = &mut self {
            filters.push(filter);
        }
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::ShowTables => f.write_str("SHOW TABLES"),
            Query::Select { table, filters } => {
                write!(f, "SELECT * FROM {table}")?;
                for (i, filter) in filters.iter().enumerate() {
                    let kw = if i == 0 { "WHERE" } else { "AND" };
                    write!(f, " {kw} {filter}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unsupported query: {0}")]
    Unsupported(String),
    #[error("query cancelled")]
    Cancelled,
}

#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Runs `query` to completion. Resolves to [`QueryError::Cancelled`] as
    /// soon as `cancel` fires.
    async fn execute(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError>;

    /// Names of the tables this source can answer.
    fn tables(&self) -> Vec<String>;
}
