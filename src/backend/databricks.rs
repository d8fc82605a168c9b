use crate::backend::{
    ColumnMeta, Connection, Connector, EndpointId, RawRow, ResultChunk, Statement,
    StatementParameter, StatementResult,
};
use crate::credentials::CredentialProvider;
use crate::error::TableportError;
use crate::volumes::VolumePath;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Server-side wait accepted by the Statement Execution API: `0s` or 5 to 50 seconds.
const MAX_WAIT_SECS: u64 = 50;
const MIN_WAIT_SECS: u64 = 5;

/// Authenticated HTTP access to one Databricks workspace.
pub struct WorkspaceClient {
    host: String,
    credentials: Arc<CredentialProvider>,
    client: Client,
}

/// Warehouse info for the list-warehouses subcommand.
#[derive(Debug, Serialize)]
pub struct WarehouseInfo {
    pub id: String,
    pub name: String,
    pub state: String,
    pub cluster_size: String,
    pub warehouse_type: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "no_parameters")]
    parameters: &'a [StatementParameter],
}

fn no_parameters(parameters: &&[StatementParameter]) -> bool {
    parameters.is_empty()
}

#[derive(Debug, Deserialize)]
pub struct StatementResponse {
    pub statement_id: Option<String>,
    pub status: StatementStatus,
    pub manifest: Option<Manifest>,
    pub result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
pub struct StatementStatus {
    pub state: String,
    pub error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
pub struct StatementError {
    pub error_code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub schema: Option<SchemaInfo>,
    pub total_chunk_count: Option<u32>,
    pub total_row_count: Option<u64>,
    pub truncated: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaInfo {
    pub columns: Option<Vec<ColumnInfo>>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: Option<String>,
}

/// Result payload; also the body of a `result/chunks/{n}` response.
#[derive(Debug, Deserialize)]
pub struct ResultData {
    pub chunk_index: Option<u32>,
    pub next_chunk_index: Option<u32>,
    pub data_array: Option<Vec<RawRow>>,
}

#[derive(Deserialize)]
struct WarehouseListResponse {
    warehouses: Option<Vec<WarehouseEntry>>,
}

#[derive(Deserialize)]
struct WarehouseEntry {
    id: Option<String>,
    name: Option<String>,
    state: Option<String>,
    cluster_size: Option<String>,
    warehouse_type: Option<String>,
}

impl WorkspaceClient {
    pub fn new(host: String, credentials: Arc<CredentialProvider>, client: Client) -> Self {
        Self {
            host,
            credentials,
            client,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://{}/api/2.0{}", self.host, path)
    }

    async fn get(&self, url: &str, what: &str) -> Result<Response, TableportError> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", self.credentials.authorization().await?)
            .send()
            .await
            .map_err(|e| TableportError::Connection {
                message: format!("failed to {}: {}", what, e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_http_error(status.as_u16()));
        }
        Ok(resp)
    }

    /// Look up one warehouse; used to verify access before caching a connection.
    pub async fn get_warehouse(&self, endpoint: &EndpointId) -> Result<WarehouseInfo, TableportError> {
        let url = self.api_url(&format!("/sql/warehouses/{}", endpoint));
        let resp = self.get(&url, "look up warehouse").await?;
        let entry: WarehouseEntry = resp.json().await.map_err(|e| TableportError::Query {
            message: format!("failed to parse warehouse response: {}", e),
        })?;
        Ok(warehouse_info(entry))
    }

    /// List available SQL warehouses.
    pub async fn list_warehouses(&self) -> Result<Vec<WarehouseInfo>, TableportError> {
        let url = self.api_url("/sql/warehouses/");
        let resp = self.get(&url, "list warehouses").await?;
        let response: WarehouseListResponse =
            resp.json().await.map_err(|e| TableportError::Query {
                message: format!("failed to parse warehouse list: {}", e),
            })?;

        Ok(response
            .warehouses
            .unwrap_or_default()
            .into_iter()
            .map(warehouse_info)
            .collect())
    }

    /// Start downloading a volume file. The body is left unread for streaming.
    pub async fn download(&self, path: &VolumePath) -> Result<Response, TableportError> {
        let url = files_api_url(&self.host, path)?;
        let resp = self
            .client
            .get(url)
            .header("Authorization", self.credentials.authorization().await?)
            .send()
            .await
            .map_err(|e| TableportError::Volume {
                message: format!("Databricks error: {}", e),
            })?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(TableportError::NotFound {
                message: format!("file not found: {}", path.as_str()),
            });
        }
        if !status.is_success() {
            return Err(TableportError::Volume {
                message: format!("Databricks error: HTTP {}", status.as_u16()),
            });
        }
        Ok(resp)
    }
}

/// Files API URL for a volume file, each path segment percent-encoded.
pub fn files_api_url(host: &str, path: &VolumePath) -> Result<Url, TableportError> {
    let invalid = || TableportError::Volume {
        message: format!("cannot build download URL for {}", path.as_str()),
    };
    let mut url =
        Url::parse(&format!("https://{}/api/2.0/fs/files", host)).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .extend(path.segments());
    Ok(url)
}

fn warehouse_info(w: WarehouseEntry) -> WarehouseInfo {
    WarehouseInfo {
        id: w.id.unwrap_or_default(),
        name: w.name.unwrap_or_default(),
        state: w.state.unwrap_or_default(),
        cluster_size: w.cluster_size.unwrap_or_default(),
        warehouse_type: w.warehouse_type,
    }
}

pub fn map_http_error(status: u16) -> TableportError {
    match status {
        401 => TableportError::Auth {
            message: "invalid or expired token".to_string(),
        },
        403 => TableportError::Auth {
            message: "insufficient warehouse permissions".to_string(),
        },
        404 => TableportError::Query {
            message: "warehouse or statement not found".to_string(),
        },
        _ => TableportError::Connection {
            message: format!("HTTP error: {}", status),
        },
    }
}

/// Opens [`WarehouseConnection`]s after checking the warehouse is reachable.
pub struct DatabricksConnector {
    workspace: Arc<WorkspaceClient>,
    query_timeout_secs: u64,
}

impl DatabricksConnector {
    pub fn new(workspace: Arc<WorkspaceClient>, query_timeout_secs: u64) -> Self {
        Self {
            workspace,
            query_timeout_secs,
        }
    }
}

#[async_trait]
impl Connector for DatabricksConnector {
    async fn connect(&self, endpoint: &EndpointId) -> Result<Arc<dyn Connection>, TableportError> {
        let started = Instant::now();
        let warehouse = self.workspace.get_warehouse(endpoint).await?;
        tracing::info!(
            warehouse = %endpoint,
            name = %warehouse.name,
            state = %warehouse.state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "connected to warehouse"
        );
        Ok(Arc::new(WarehouseConnection {
            workspace: Arc::clone(&self.workspace),
            endpoint: endpoint.clone(),
            query_timeout_secs: self.query_timeout_secs,
        }))
    }
}

/// Statement execution against one SQL warehouse.
pub struct WarehouseConnection {
    workspace: Arc<WorkspaceClient>,
    endpoint: EndpointId,
    query_timeout_secs: u64,
}

impl WarehouseConnection {
    fn statements_url(&self) -> String {
        self.workspace.api_url("/sql/statements")
    }

    async fn poll_statement(
        &self,
        statement_id: &str,
        submitted: Instant,
    ) -> Result<StatementResponse, TableportError> {
        let url = format!("{}/{}", self.statements_url(), statement_id);

        loop {
            if submitted.elapsed().as_secs() >= self.query_timeout_secs {
                self.cancel(statement_id).await;
                return Err(TableportError::Timeout {
                    seconds: self.query_timeout_secs,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;

            let response: StatementResponse = self
                .workspace
                .get(&url, "poll statement")
                .await?
                .json()
                .await
                .map_err(|e| TableportError::Query {
                    message: format!("failed to parse poll response: {}", e),
                })?;

            match response.status.state.as_str() {
                "PENDING" | "RUNNING" => {
                    tracing::debug!(statement_id, "statement still running");
                    continue;
                }
                _ => return Ok(response),
            }
        }
    }

    async fn cancel(&self, statement_id: &str) {
        let cancel_url = format!("{}/{}/cancel", self.statements_url(), statement_id);
        let Ok(auth) = self.workspace.credentials.authorization().await else {
            return;
        };
        if let Err(e) = self
            .workspace
            .client
            .post(&cancel_url)
            .header("Authorization", auth)
            .send()
            .await
        {
            tracing::warn!(statement_id, error = %e, "failed to cancel statement");
        }
    }
}

#[async_trait]
impl Connection for WarehouseConnection {
    fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    async fn execute(&self, statement: &Statement) -> Result<StatementResult, TableportError> {
        let request = StatementRequest {
            warehouse_id: self.endpoint.as_str(),
            statement: &statement.sql,
            wait_timeout: wait_timeout(self.query_timeout_secs),
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: "INLINE",
            parameters: &statement.parameters,
        };

        tracing::debug!(
            warehouse = %self.endpoint,
            sql = %statement.sql,
            parameters = statement.parameters.len(),
            "submitting statement"
        );

        let submitted = Instant::now();
        let resp = self
            .workspace
            .client
            .post(self.statements_url())
            .header("Authorization", self.workspace.credentials.authorization().await?)
            .json(&request)
            .send()
            .await
            .map_err(|e| TableportError::Connection {
                message: format!("failed to execute statement: {}", e),
            })?;

        let status_code = resp.status();
        if !status_code.is_success() {
            return Err(map_http_error(status_code.as_u16()));
        }

        let response: StatementResponse =
            resp.json().await.map_err(|e| TableportError::Query {
                message: format!("failed to parse response: {}", e),
            })?;

        let response = match response.status.state.as_str() {
            "PENDING" | "RUNNING" => {
                let statement_id = response
                    .statement_id
                    .clone()
                    .ok_or_else(|| TableportError::Query {
                        message: "no statement_id in pending response".to_string(),
                    })?;
                self.poll_statement(&statement_id, submitted).await?
            }
            _ => response,
        };

        parse_statement_response(response)
    }

    async fn get_statement(&self, statement_id: &str) -> Result<StatementResult, TableportError> {
        let url = format!("{}/{}", self.statements_url(), statement_id);
        let response: StatementResponse = self
            .workspace
            .get(&url, "get statement")
            .await?
            .json()
            .await
            .map_err(|e| TableportError::Query {
                message: format!("failed to parse statement response: {}", e),
            })?;
        parse_statement_response(response)
    }

    async fn fetch_chunk(
        &self,
        statement_id: &str,
        chunk_index: u32,
    ) -> Result<ResultChunk, TableportError> {
        let url = format!(
            "{}/{}/result/chunks/{}",
            self.statements_url(),
            statement_id,
            chunk_index
        );
        let data: ResultData = self
            .workspace
            .get(&url, "fetch result chunk")
            .await?
            .json()
            .await
            .map_err(|e| TableportError::Query {
                message: format!("failed to parse result chunk: {}", e),
            })?;
        Ok(parse_chunk(data, chunk_index))
    }
}

/// Synchronous wait for statement submission, never longer than the query timeout.
/// Timeouts below the API minimum return immediately and rely on polling.
pub fn wait_timeout(query_timeout_secs: u64) -> String {
    if query_timeout_secs < MIN_WAIT_SECS {
        "0s".to_string()
    } else {
        format!("{}s", query_timeout_secs.min(MAX_WAIT_SECS))
    }
}

/// Interpret a statement response by its terminal state.
pub fn parse_statement_response(
    response: StatementResponse,
) -> Result<StatementResult, TableportError> {
    match response.status.state.as_str() {
        "SUCCEEDED" => {}
        "FAILED" => {
            let msg = match response.status.error {
                Some(StatementError {
                    error_code: Some(code),
                    message: Some(message),
                }) => format!("[{}] {}", code, message),
                Some(StatementError {
                    message: Some(message),
                    ..
                }) => message,
                _ => "unknown error".to_string(),
            };
            return Err(TableportError::Query { message: msg });
        }
        "CANCELED" | "CLOSED" => {
            return Err(TableportError::Query {
                message: format!(
                    "statement was {}",
                    response.status.state.to_ascii_lowercase()
                ),
            });
        }
        other => {
            return Err(TableportError::Query {
                message: format!("unexpected statement state: {}", other),
            });
        }
    }

    let manifest = response.manifest.unwrap_or(Manifest {
        schema: None,
        total_chunk_count: None,
        total_row_count: None,
        truncated: None,
    });

    let columns = manifest
        .schema
        .and_then(|s| s.columns)
        .unwrap_or_default()
        .into_iter()
        .map(|c| ColumnMeta {
            name: c.name,
            type_name: c.type_name.unwrap_or_else(|| "STRING".to_string()),
        })
        .collect();

    let first_chunk = response
        .result
        .map(|r| parse_chunk(r, 0))
        .unwrap_or_default();

    Ok(StatementResult {
        statement_id: response.statement_id.unwrap_or_default(),
        columns,
        first_chunk,
        total_chunk_count: manifest.total_chunk_count,
        total_row_count: manifest.total_row_count,
        truncated: manifest.truncated.unwrap_or(false),
    })
}

fn parse_chunk(data: ResultData, requested_index: u32) -> ResultChunk {
    ResultChunk {
        chunk_index: data.chunk_index.unwrap_or(requested_index),
        rows: data.data_array.unwrap_or_default(),
        next_chunk_index: data.next_chunk_index,
    }
}
