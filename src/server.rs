//! HTTP server setup and routing.

use crate::backend::databricks::{DatabricksConnector, WorkspaceClient};
use crate::backend::{Connection, Connector, EndpointId};
use crate::cache::ConnectionCache;
use crate::config::AppConfig;
use crate::credentials::{self, CredentialProvider};
use crate::error::TableportError;
use crate::executor::QueryExecutor;
use crate::handlers;
use crate::masking;
use crate::tables::TableService;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tables: Arc<TableService>,
    pub cache: Arc<ConnectionCache>,
    /// `None` when no workspace host is configured; volume downloads then fail.
    pub workspace: Option<Arc<WorkspaceClient>>,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn Connector>,
        workspace: Option<Arc<WorkspaceClient>>,
        config: &AppConfig,
    ) -> Self {
        let cache = Arc::new(ConnectionCache::new(connector));
        let executor = QueryExecutor::new(Arc::clone(&cache), config.read_limits());
        let tables = Arc::new(TableService::new(executor, config.table_settings()));
        Self {
            tables,
            cache,
            workspace,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route(
            "/table",
            get(handlers::read_table).post(handlers::insert_table),
        )
        .route(
            "/statements/{statement_id}/result",
            get(handlers::statement_result),
        )
        .route("/download", get(handlers::download));

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Shared HTTP client for all workspace calls.
pub fn http_client(query_timeout_secs: u64) -> Result<reqwest::Client, TableportError> {
    // Statement submission waits up to 50s server side; leave headroom above that.
    let request_timeout = Duration::from_secs(query_timeout_secs.max(50) + 30);
    reqwest::Client::builder()
        .user_agent(concat!("tableport/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .build()
        .map_err(TableportError::from)
}

/// Build the workspace client from resolved config, if a workspace is configured.
pub fn workspace_client(
    config: &AppConfig,
    client: reqwest::Client,
) -> Option<Arc<WorkspaceClient>> {
    config.workspace.as_ref().map(|ws| {
        let provider = CredentialProvider::new(
            ws.host.clone(),
            credentials::clone_credentials(&ws.credentials),
            client.clone(),
        );
        Arc::new(WorkspaceClient::new(
            ws.host.clone(),
            Arc::new(provider),
            client,
        ))
    })
}

/// Run the REST server until ctrl-c or SIGTERM.
pub async fn run(config: AppConfig) -> Result<(), TableportError> {
    let client = http_client(config.query_timeout_secs)?;
    let workspace = workspace_client(&config, client);

    match &config.workspace {
        Some(ws) => tracing::info!(
            host = %ws.host,
            auth = %masking::describe_credentials(&ws.credentials, config.show_secrets),
            "workspace configured"
        ),
        None => tracing::warn!("no Databricks workspace configured; table requests will fail"),
    }
    match &config.warehouse_id {
        Some(id) => tracing::info!(warehouse = %id, "default warehouse"),
        None => tracing::warn!("no SQL warehouse configured; table requests will fail"),
    }

    let connector: Arc<dyn Connector> = match &workspace {
        Some(ws) => Arc::new(DatabricksConnector::new(
            Arc::clone(ws),
            config.query_timeout_secs,
        )),
        None => Arc::new(UnconfiguredConnector),
    };

    let state = AppState::new(connector, workspace, &config);
    let cache = Arc::clone(&state.cache);
    let app = router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        default_limit = config.default_limit,
        max_limit = config.max_limit,
        max_chunks = config.max_chunks,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache.clear();
    tracing::info!("server stopped");
    Ok(())
}

/// Stands in for the Databricks connector when no workspace host is configured.
struct UnconfiguredConnector;

#[async_trait::async_trait]
impl Connector for UnconfiguredConnector {
    async fn connect(&self, _endpoint: &EndpointId) -> Result<Arc<dyn Connection>, TableportError> {
        Err(TableportError::config("Databricks workspace not configured")
            .with_detail("setting", "databricks_host"))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
