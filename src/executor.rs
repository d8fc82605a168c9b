use crate::backend::{EndpointId, QueryResult, Statement};
use crate::cache::ConnectionCache;
use crate::error::TableportError;
use crate::reader::{self, ReadLimits};
use std::sync::Arc;
use std::time::Instant;

/// Runs statements over cached connections and assembles complete results.
///
/// Backend failures are wrapped as [`TableportError::Database`]. The
/// connection stays cached after a failure.
pub struct QueryExecutor {
    cache: Arc<ConnectionCache>,
    limits: ReadLimits,
}

impl QueryExecutor {
    pub fn new(cache: Arc<ConnectionCache>, limits: ReadLimits) -> Self {
        Self { cache, limits }
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    pub async fn run(
        &self,
        endpoint: &EndpointId,
        statement: &Statement,
    ) -> Result<QueryResult, TableportError> {
        let connection = self.cache.get(endpoint).await.map_err(|e| {
            TableportError::database(format!("Failed to connect to warehouse {}: {}", endpoint, e))
        })?;

        let timer = Instant::now();
        let first = connection.execute(statement).await.map_err(wrap_query_error)?;
        let result = reader::read_all(connection.as_ref(), first, self.limits)
            .await
            .map_err(wrap_query_error)?;

        tracing::info!(
            warehouse = %endpoint,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            rows = result.rows.len(),
            "query complete"
        );
        Ok(result)
    }

    /// Read the full result of an already started statement.
    pub async fn fetch(
        &self,
        endpoint: &EndpointId,
        statement_id: &str,
    ) -> Result<QueryResult, TableportError> {
        let connection = self.cache.get(endpoint).await.map_err(|e| {
            TableportError::database(format!("Failed to connect to warehouse {}: {}", endpoint, e))
        })?;
        reader::fetch_statement(connection.as_ref(), statement_id, self.limits)
            .await
            .map_err(wrap_query_error)
    }
}

fn wrap_query_error(err: TableportError) -> TableportError {
    match err {
        TableportError::ResultTooLarge { .. } => err,
        other => TableportError::database(format!("Query failed: {}", other)),
    }
}
