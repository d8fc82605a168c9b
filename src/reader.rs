use crate::backend::{Connection, QueryResult, StatementResult};
use crate::error::TableportError;

/// Upper bound on how many result chunks a single read may assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    pub max_chunks: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self { max_chunks: 64 }
    }
}

/// Follow `next_chunk_index` from the first chunk until the result is complete.
pub async fn read_all(
    connection: &dyn Connection,
    first: StatementResult,
    limits: ReadLimits,
) -> Result<QueryResult, TableportError> {
    let StatementResult {
        statement_id,
        columns,
        first_chunk,
        total_row_count,
        truncated,
        ..
    } = first;

    let mut rows = first_chunk.rows;
    let mut next = first_chunk.next_chunk_index;
    let mut chunks_read = 1;

    while let Some(index) = next {
        if chunks_read >= limits.max_chunks {
            tracing::warn!(
                statement_id = %statement_id,
                max_chunks = limits.max_chunks,
                "result exceeds chunk budget"
            );
            return Err(TableportError::ResultTooLarge {
                max_chunks: limits.max_chunks,
            });
        }

        let chunk = connection.fetch_chunk(&statement_id, index).await?;
        tracing::debug!(
            statement_id = %statement_id,
            chunk_index = index,
            rows = chunk.rows.len(),
            "fetched result chunk"
        );
        rows.extend(chunk.rows);
        next = chunk.next_chunk_index;
        chunks_read += 1;
    }

    Ok(QueryResult {
        columns,
        rows,
        total_rows: total_row_count,
        truncated,
    })
}

/// Read the full result of a statement that was started elsewhere.
pub async fn fetch_statement(
    connection: &dyn Connection,
    statement_id: &str,
    limits: ReadLimits,
) -> Result<QueryResult, TableportError> {
    let first = connection.get_statement(statement_id).await?;
    read_all(connection, first, limits).await
}
