use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tableport",
    about = "REST gateway for Unity Catalog tables on Databricks SQL warehouses"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "TABLEPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true, env = "TABLEPORT_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking in logs
    #[arg(long, global = true, env = "TABLEPORT_SHOW_SECRETS")]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the REST API
    Serve(ServeArgs),

    /// List available Databricks SQL warehouses
    #[command(name = "list-warehouses")]
    ListWarehouses(WorkspaceArgs),
}

/// Workspace connection flags shared by all subcommands.
#[derive(Parser, Debug, Default)]
pub struct WorkspaceArgs {
    /// Databricks workspace host
    #[arg(long = "databricks-host", env = "DATABRICKS_HOST")]
    pub host: Option<String>,

    /// Databricks personal access token
    #[arg(long, env = "DATABRICKS_TOKEN")]
    pub token: Option<String>,

    /// OAuth service principal client ID
    #[arg(long, env = "DATABRICKS_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth service principal client secret
    #[arg(long, env = "DATABRICKS_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Config file profile name
    #[arg(short = 'P', long, env = "TABLEPORT_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// SQL warehouse ID or HTTP path
    #[arg(short = 'w', long, env = "DATABRICKS_WAREHOUSE_ID")]
    pub warehouse: Option<String>,

    /// Address to bind (default: 0.0.0.0)
    #[arg(long, env = "TABLEPORT_BIND")]
    pub bind: Option<String>,

    /// Port to listen on (default: 8000)
    #[arg(short = 'p', long, env = "TABLEPORT_PORT")]
    pub port: Option<u16>,

    /// Rows returned when a request gives no limit (default: 100)
    #[arg(long, env = "TABLEPORT_DEFAULT_LIMIT")]
    pub default_limit: Option<u32>,

    /// Largest limit a request may ask for (default: 1000)
    #[arg(long, env = "TABLEPORT_MAX_LIMIT")]
    pub max_limit: Option<u32>,

    /// Most result chunks assembled for one response (default: 64)
    #[arg(long, env = "TABLEPORT_MAX_CHUNKS")]
    pub max_chunks: Option<usize>,

    /// Query timeout in seconds (default: 60)
    #[arg(short = 't', long, env = "TABLEPORT_TIMEOUT")]
    pub timeout: Option<u64>,
}
