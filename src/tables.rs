use crate::backend::{EndpointId, QueryResult};
use crate::error::{Details, TableportError};
use crate::executor::QueryExecutor;
use crate::filter::Filter;
use crate::query::{ColumnSelection, InsertStatement, Pagination, TableQuery, TableRef};
use crate::records::{Record, to_records};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct TableSettings {
    pub warehouse_id: Option<EndpointId>,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            warehouse_id: None,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Query string of `GET /table`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableQueryParams {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub columns: Option<String>,
    pub filter_expr: Option<String>,
}

/// Body of `POST /table`.
#[derive(Debug, Clone, Deserialize)]
pub struct TableInsertRequest {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub data: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableResponse {
    pub data: Vec<Record>,
    pub count: usize,
    pub total: Option<u64>,
}

/// Table reads and appends against the configured warehouse.
pub struct TableService {
    executor: QueryExecutor,
    settings: TableSettings,
}

impl TableService {
    pub fn new(executor: QueryExecutor, settings: TableSettings) -> Self {
        Self { executor, settings }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Validate request parameters into a query descriptor.
    pub fn build_query(&self, params: &TableQueryParams) -> Result<TableQuery, TableportError> {
        let table = TableRef::new(&params.catalog, &params.schema, &params.table)?;
        let columns = ColumnSelection::parse(params.columns.as_deref().unwrap_or("*"))?;
        let filter = params
            .filter_expr
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(Filter::parse)
            .transpose()?;
        let pagination = Pagination::validate(
            params.limit.unwrap_or(i64::from(self.settings.default_limit)),
            params.offset.unwrap_or(0),
            self.settings.max_limit,
        )?;

        Ok(TableQuery {
            table,
            columns,
            filter,
            pagination,
        })
    }

    fn warehouse(&self) -> Result<&EndpointId, TableportError> {
        self.settings.warehouse_id.as_ref().ok_or_else(|| {
            TableportError::config("SQL warehouse ID not configured")
                .with_detail("setting", "databricks_warehouse_id")
        })
    }

    pub async fn read(&self, params: TableQueryParams) -> Result<TableResponse, TableportError> {
        let query = self.build_query(&params)?;
        let warehouse = self.warehouse()?;
        let statement = query.to_statement();

        tracing::debug!(table = %query.table, sql = %statement.sql, "reading table");
        let result = self
            .executor
            .run(warehouse, &statement)
            .await
            .map_err(|e| with_table_context(e, "Failed to query table", &query.table))?;

        let data = to_records(&result.columns, &result.rows);
        Ok(TableResponse {
            count: data.len(),
            data,
            total: None,
        })
    }

    pub async fn insert(&self, request: TableInsertRequest) -> Result<TableResponse, TableportError> {
        let table = TableRef::new(&request.catalog, &request.schema, &request.table)?;
        if request.data.is_empty() {
            return Ok(TableResponse {
                data: Vec::new(),
                count: 0,
                total: Some(0),
            });
        }

        let insert = InsertStatement::build(&table, &request.data)?;
        let warehouse = self.warehouse()?;

        tracing::debug!(
            table = %table,
            rows = insert.row_count(),
            parameters = insert.placeholder_count,
            "inserting rows"
        );
        let result = self
            .executor
            .run(warehouse, &insert.statement)
            .await
            .map_err(|e| with_table_context(e, "Failed to insert data", &table))?;

        let inserted = affected_rows(&result).unwrap_or_else(|| insert.row_count());
        tracing::info!(table = %table, inserted, "insert complete");
        Ok(TableResponse {
            count: inserted as usize,
            data: request.data,
            total: Some(inserted),
        })
    }

    /// Full result of a statement started elsewhere, assembled from all its chunks.
    pub async fn statement_result(&self, statement_id: &str) -> Result<TableResponse, TableportError> {
        let statement_id = statement_id.trim();
        if statement_id.is_empty()
            || !statement_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(TableportError::validation(format!(
                "invalid statement ID: '{}'",
                statement_id
            )));
        }
        let warehouse = self.warehouse()?;

        let result = self
            .executor
            .fetch(warehouse, statement_id)
            .await
            .map_err(|e| match e {
                TableportError::Database { message, details } => TableportError::Database {
                    message: format!("Failed to fetch statement result: {}", message),
                    details,
                }
                .with_detail("statement_id", statement_id),
                other => other,
            })?;

        let data = to_records(&result.columns, &result.rows);
        Ok(TableResponse {
            count: data.len(),
            data,
            total: result.total_rows,
        })
    }
}

fn with_table_context(err: TableportError, prefix: &str, table: &TableRef) -> TableportError {
    match err {
        TableportError::Database { message, .. } => {
            let mut details = Details::new();
            details.insert("catalog".to_string(), json!(table.catalog));
            details.insert("schema".to_string(), json!(table.schema));
            details.insert("table".to_string(), json!(table.table));
            TableportError::Database {
                message: format!("{}: {}", prefix, message),
                details,
            }
        }
        other => other,
    }
}

/// `num_affected_rows` from an INSERT result, if the backend reported it.
fn affected_rows(result: &QueryResult) -> Option<u64> {
    let index = result
        .columns
        .iter()
        .position(|c| c.name == "num_affected_rows")?;
    result
        .rows
        .first()?
        .get(index)?
        .as_deref()?
        .parse()
        .ok()
}
