pub mod databricks;

use crate::error::TableportError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One row as delivered by the `JSON_ARRAY` result format: every cell is text or NULL.
pub type RawRow = Vec<Option<String>>;

/// The output of executing a query, before conversion to records.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<RawRow>,
    pub total_rows: Option<u64>,
    pub truncated: bool,
}

/// A SQL statement with named parameter bindings (`:name` markers).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<StatementParameter>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }
}

/// A named parameter as accepted by the Statement Execution API.
///
/// `value: None` binds SQL NULL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementParameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// One chunk of a statement's result.
#[derive(Debug, Clone, Default)]
pub struct ResultChunk {
    pub chunk_index: u32,
    pub rows: Vec<RawRow>,
    pub next_chunk_index: Option<u32>,
}

/// A finished statement: its schema and the first chunk of its result.
#[derive(Debug, Clone, Default)]
pub struct StatementResult {
    pub statement_id: String,
    pub columns: Vec<ColumnMeta>,
    pub first_chunk: ResultChunk,
    pub total_chunk_count: Option<u32>,
    pub total_row_count: Option<u64>,
    pub truncated: bool,
}

/// Normalized SQL warehouse identifier, used as the connection cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

const WAREHOUSE_PATH_PREFIX: &str = "/sql/1.0/warehouses/";

impl EndpointId {
    /// Accepts a bare warehouse ID or a warehouse HTTP path
    /// (`/sql/1.0/warehouses/<id>`).
    pub fn parse(input: &str) -> Result<Self, TableportError> {
        let trimmed = input.trim();
        let id = match trimmed.strip_prefix(WAREHOUSE_PATH_PREFIX) {
            Some(rest) => rest.trim_end_matches('/'),
            None => trimmed,
        };

        if id.is_empty() {
            return Err(TableportError::validation("warehouse ID must not be empty"));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(TableportError::validation(format!(
                "invalid warehouse identifier: '{trimmed}'"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn http_path(&self) -> String {
        format!("{WAREHOUSE_PATH_PREFIX}{}", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates connections to a warehouse endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &EndpointId) -> Result<Arc<dyn Connection>, TableportError>;
}

/// An established session against one warehouse.
#[async_trait]
pub trait Connection: Send + Sync {
    fn endpoint(&self) -> &EndpointId;

    /// Run a statement to completion and return its first result chunk.
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, TableportError>;

    /// Look up a statement that was started elsewhere.
    async fn get_statement(&self, statement_id: &str) -> Result<StatementResult, TableportError>;

    async fn fetch_chunk(
        &self,
        statement_id: &str,
        chunk_index: u32,
    ) -> Result<ResultChunk, TableportError>;
}
