use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tableport::cli::{Cli, Command, ServeArgs, WorkspaceArgs};
use tableport::error::TableportError;
use tableport::{config, credentials, logging, masking, output, server};

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(ref args) => {
            serve(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
        Command::ListWarehouses(ref args) => {
            list_warehouses(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
    };

    if let Err(err) = result {
        output::print_error(&err);
        process::exit(1);
    }
}

async fn serve(
    args: &ServeArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), TableportError> {
    let app_config = config::load_from_serve_args(args, verbose, show_secrets, config_path)?;
    logging::init(app_config.verbose);
    server::run(app_config).await
}

async fn list_warehouses(
    args: &WorkspaceArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), TableportError> {
    logging::init(verbose);
    let workspace = config::load_from_workspace_args(args, config_path)?;
    tracing::debug!(
        host = %workspace.host,
        auth = %masking::describe_credentials(&workspace.credentials, show_secrets),
        "listing warehouses"
    );

    let client = server::http_client(30)?;
    let provider = credentials::CredentialProvider::new(
        workspace.host.clone(),
        workspace.credentials,
        client.clone(),
    );
    let workspace_client = tableport::backend::databricks::WorkspaceClient::new(
        workspace.host,
        Arc::new(provider),
        client,
    );

    let warehouses = workspace_client.list_warehouses().await?;
    output::print_json(&warehouses)
}
