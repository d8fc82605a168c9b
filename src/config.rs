use crate::backend::EndpointId;
use crate::cli::{ServeArgs, WorkspaceArgs};
use crate::credentials::Credentials;
use crate::error::TableportError;
use crate::reader::ReadLimits;
use crate::tables::{DEFAULT_LIMIT, MAX_LIMIT, TableSettings};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub workspace: Option<WorkspaceConfig>,
    pub warehouse_id: Option<EndpointId>,
    pub bind: String,
    pub port: u16,
    pub default_limit: u32,
    pub max_limit: u32,
    pub max_chunks: usize,
    pub query_timeout_secs: u64,
    pub verbose: bool,
    pub show_secrets: bool,
}

impl AppConfig {
    pub fn table_settings(&self) -> TableSettings {
        TableSettings {
            warehouse_id: self.warehouse_id.clone(),
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_chunks: self.max_chunks,
        }
    }
}

/// Databricks workspace target.
#[derive(Debug)]
pub struct WorkspaceConfig {
    /// Host name without scheme, e.g. `adb-123.4.azuredatabricks.net`.
    pub host: String,
    pub credentials: Credentials,
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    bind: Option<String>,
    port: Option<u16>,
    default_limit: Option<u32>,
    max_limit: Option<u32>,
    max_chunks: Option<usize>,
    timeout: Option<u64>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    host: Option<String>,
    token: Option<String>,
    token_env: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    client_secret_env: Option<String>,
    warehouse_id: Option<String>,
}

/// Config path resolution: explicit or auto-resolved.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or TABLEPORT_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Some(path) = env_non_empty("TABLEPORT_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "tableport").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, TableportError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(TableportError::config(format!(
                "config file not found: {}",
                resolved.path.display()
            )));
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| {
        TableportError::config(format!(
            "cannot read config file {}: {}",
            resolved.path.display(),
            e
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        TableportError::config(format!(
            "invalid config file {}: {}",
            resolved.path.display(),
            e
        ))
    })
}

fn load_profile(
    toml_config: &TomlConfig,
    name: Option<&String>,
) -> Result<TomlProfile, TableportError> {
    let profile = name
        .map(|name| {
            toml_config.profiles.get(name).cloned().ok_or_else(|| {
                TableportError::config(format!("profile '{}' not found in config file", name))
            })
        })
        .transpose()?;
    Ok(profile.unwrap_or_default())
}

/// Treat empty strings as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Read an env var, treating unset and empty the same.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve a secret from direct value, env indirection, or env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    if let Some(val) = non_empty(direct) {
        return Some(SecretString::from(val.to_string()));
    }
    // Env indirection (e.g., token_env = "MY_TOKEN")
    if let Some(key) = non_empty(env_key)
        && let Some(val) = env_non_empty(key)
    {
        return Some(SecretString::from(val));
    }
    env_non_empty(fallback_env).map(SecretString::from)
}

/// Strip scheme and trailing slashes from a workspace host.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.trim_end_matches('/').to_string()
}

fn resolve_workspace(
    args: &WorkspaceArgs,
    profile: &TomlProfile,
) -> Result<Option<WorkspaceConfig>, TableportError> {
    let host = non_empty(args.host.as_deref())
        .or(non_empty(profile.host.as_deref()))
        .map(normalize_host);

    let token = resolve_secret(
        args.token.as_deref(),
        profile.token_env.as_deref(),
        "DATABRICKS_TOKEN",
    )
    .or_else(|| {
        non_empty(profile.token.as_deref()).map(|t| SecretString::from(t.to_string()))
    });

    let client_id = non_empty(args.client_id.as_deref())
        .or(non_empty(profile.client_id.as_deref()))
        .map(str::to_string);

    let client_secret = resolve_secret(
        args.client_secret.as_deref(),
        profile.client_secret_env.as_deref(),
        "DATABRICKS_CLIENT_SECRET",
    )
    .or_else(|| {
        non_empty(profile.client_secret.as_deref()).map(|s| SecretString::from(s.to_string()))
    });

    let Some(host) = host else {
        if token.is_some() || client_id.is_some() {
            return Err(TableportError::config(
                "credentials given but no workspace host; use --databricks-host or DATABRICKS_HOST",
            ));
        }
        return Ok(None);
    };
    if host.is_empty() {
        return Err(TableportError::config("workspace host must not be empty"));
    }

    let credentials = match (token, client_id, client_secret) {
        (Some(token), _, _) => Credentials::Token(token),
        (None, Some(client_id), Some(client_secret)) => Credentials::ServicePrincipal {
            client_id,
            client_secret,
        },
        (None, Some(_), None) => {
            return Err(TableportError::config(
                "no client secret specified for OAuth service principal",
            ));
        }
        (None, None, _) => {
            return Err(TableportError::config(format!(
                "no credentials specified for workspace {}; set DATABRICKS_TOKEN or DATABRICKS_CLIENT_ID/DATABRICKS_CLIENT_SECRET",
                host
            )));
        }
    };

    Ok(Some(WorkspaceConfig { host, credentials }))
}

/// Build AppConfig for the serve subcommand.
pub fn load_from_serve_args(
    args: &ServeArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, TableportError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    let profile = load_profile(&toml_config, args.workspace.profile.as_ref())?;
    let defaults = &toml_config.defaults;

    let workspace = resolve_workspace(&args.workspace, &profile)?;

    let warehouse_id = non_empty(args.warehouse.as_deref())
        .or(non_empty(profile.warehouse_id.as_deref()))
        .map(|w| {
            EndpointId::parse(w)
                .map_err(|e| TableportError::config(format!("invalid warehouse ID: {}", e)))
        })
        .transpose()?;

    // limits: CLI/ENV > TOML > built-in
    let max_limit = args.max_limit.or(defaults.max_limit).unwrap_or(MAX_LIMIT);
    let default_limit = args
        .default_limit
        .or(defaults.default_limit)
        .unwrap_or(DEFAULT_LIMIT.min(max_limit));
    if max_limit == 0 {
        return Err(TableportError::config("max limit must be at least 1"));
    }
    if default_limit == 0 || default_limit > max_limit {
        return Err(TableportError::config(format!(
            "default limit {} must be between 1 and the max limit {}",
            default_limit, max_limit
        )));
    }

    let max_chunks = args
        .max_chunks
        .or(defaults.max_chunks)
        .unwrap_or(ReadLimits::default().max_chunks);
    if max_chunks == 0 {
        return Err(TableportError::config("max chunks must be at least 1"));
    }

    let query_timeout_secs = args
        .timeout
        .or(defaults.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if query_timeout_secs == 0 {
        return Err(TableportError::config("timeout must be at least 1 second"));
    }

    let bind = non_empty(args.bind.as_deref())
        .or(non_empty(defaults.bind.as_deref()))
        .unwrap_or(DEFAULT_BIND)
        .to_string();
    let port = args.port.or(defaults.port).unwrap_or(DEFAULT_PORT);

    // verbose: CLI/ENV OR TOML default
    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        workspace,
        warehouse_id,
        bind,
        port,
        default_limit,
        max_limit,
        max_chunks,
        query_timeout_secs,
        verbose,
        show_secrets,
    })
}

/// Resolve the workspace for list-warehouses, where it is mandatory.
pub fn load_from_workspace_args(
    args: &WorkspaceArgs,
    config_path: Option<&PathBuf>,
) -> Result<WorkspaceConfig, TableportError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    let profile = load_profile(&toml_config, args.profile.as_ref())?;

    resolve_workspace(args, &profile)?.ok_or_else(|| {
        TableportError::config("no host specified for list-warehouses")
    })
}
