use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Mutex;
use tableport::cli::{ServeArgs, WorkspaceArgs};
use tableport::config::{
    env_non_empty, load_from_serve_args, load_from_workspace_args, non_empty, normalize_host,
};
use tableport::credentials::Credentials;
use tempfile::TempDir;

/// Static mutex to serialize tests that touch process env vars.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const CREDENTIAL_VARS: &[&str] = &[
    "DATABRICKS_TOKEN",
    "DATABRICKS_CLIENT_SECRET",
    "TABLEPORT_CONFIG",
];

/// RAII guard that sets env vars on creation and removes them on Drop.
/// Holds the ENV_MUTEX lock for its lifetime. Credential fallbacks are
/// cleared first so the ambient environment cannot leak in.
struct EnvGuard {
    keys: Vec<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn new(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for key in CREDENTIAL_VARS {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::remove_var(key); }
        }
        for (key, val) in vars {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::set_var(key, val); }
        }
        EnvGuard {
            keys: vars.iter().map(|(k, _)| k.to_string()).collect(),
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::remove_var(key); }
        }
    }
}

/// Write a config file into a fresh temp dir.
fn config_file(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

fn serve_args(overrides: impl FnOnce(&mut ServeArgs)) -> ServeArgs {
    let mut args = ServeArgs::default();
    overrides(&mut args);
    args
}

fn with_token(args: &mut ServeArgs) {
    args.workspace.host = Some("adb-1.azuredatabricks.net".to_string());
    args.workspace.token = Some("dapi-cli".to_string());
}

#[test]
fn test_defaults_without_workspace() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let config = load_from_serve_args(&serve_args(|_| {}), false, false, Some(&path)).unwrap();

    assert!(config.workspace.is_none());
    assert!(config.warehouse_id.is_none());
    assert_eq!(config.bind, "0.0.0.0");
    assert_eq!(config.port, 8000);
    assert_eq!(config.default_limit, 100);
    assert_eq!(config.max_limit, 1000);
    assert_eq!(config.max_chunks, 64);
    assert_eq!(config.query_timeout_secs, 60);
    assert!(!config.verbose);
}

#[test]
fn test_token_credentials_from_args() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| {
        with_token(a);
        a.warehouse = Some("/sql/1.0/warehouses/abc123".to_string());
    });
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();

    let workspace = config.workspace.unwrap();
    assert_eq!(workspace.host, "adb-1.azuredatabricks.net");
    match workspace.credentials {
        Credentials::Token(token) => assert_eq!(token.expose_secret(), "dapi-cli"),
        other => panic!("Expected token credentials, got {:?}", other),
    }
    assert_eq!(config.warehouse_id.unwrap().as_str(), "abc123");
}

#[test]
fn test_service_principal_credentials() {
    let _guard = EnvGuard::new(&[("DATABRICKS_CLIENT_SECRET", "sp-secret")]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| {
        a.workspace.host = Some("https://adb-1.azuredatabricks.net/".to_string());
        a.workspace.client_id = Some("sp-id".to_string());
    });
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();

    let workspace = config.workspace.unwrap();
    assert_eq!(workspace.host, "adb-1.azuredatabricks.net");
    match workspace.credentials {
        Credentials::ServicePrincipal {
            client_id,
            client_secret,
        } => {
            assert_eq!(client_id, "sp-id");
            assert_eq!(client_secret.expose_secret(), "sp-secret");
        }
        other => panic!("Expected service principal, got {:?}", other),
    }
}

#[test]
fn test_token_wins_over_service_principal() {
    let _guard = EnvGuard::new(&[("DATABRICKS_CLIENT_SECRET", "sp-secret")]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| {
        with_token(a);
        a.workspace.client_id = Some("sp-id".to_string());
    });
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();
    assert!(matches!(
        config.workspace.unwrap().credentials,
        Credentials::Token(_)
    ));
}

#[test]
fn test_client_id_without_secret_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| {
        a.workspace.host = Some("adb-1.azuredatabricks.net".to_string());
        a.workspace.client_id = Some("sp-id".to_string());
    });
    let err = load_from_serve_args(&args, false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("no client secret"), "Got: {}", err);
}

#[test]
fn test_host_without_credentials_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| a.workspace.host = Some("adb-1.azuredatabricks.net".to_string()));
    let err = load_from_serve_args(&args, false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.starts_with("config: no credentials specified"), "Got: {}", err);
}

#[test]
fn test_credentials_without_host_errors() {
    let _guard = EnvGuard::new(&[("DATABRICKS_TOKEN", "dapi-env")]);
    let (_dir, path) = config_file("");
    let err = load_from_serve_args(&serve_args(|_| {}), false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("no workspace host"), "Got: {}", err);
}

#[test]
fn test_profile_supplies_workspace_and_warehouse() {
    let _guard = EnvGuard::new(&[("PROD_TOKEN", "dapi-from-env")]);
    let (_dir, path) = config_file(
        r#"
[profiles.prod]
host = "https://prod.cloud.databricks.com"
token_env = "PROD_TOKEN"
warehouse_id = "wh-prod"
"#,
    );
    let args = serve_args(|a| a.workspace.profile = Some("prod".to_string()));
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();

    let workspace = config.workspace.unwrap();
    assert_eq!(workspace.host, "prod.cloud.databricks.com");
    match workspace.credentials {
        Credentials::Token(token) => assert_eq!(token.expose_secret(), "dapi-from-env"),
        other => panic!("Expected token credentials, got {:?}", other),
    }
    assert_eq!(config.warehouse_id.unwrap().as_str(), "wh-prod");
}

#[test]
fn test_cli_flag_overrides_profile() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file(
        r#"
[profiles.prod]
host = "prod.cloud.databricks.com"
token = "dapi-profile"
warehouse_id = "wh-prod"
"#,
    );
    let args = serve_args(|a| {
        a.workspace.profile = Some("prod".to_string());
        a.workspace.token = Some("dapi-cli".to_string());
        a.warehouse = Some("wh-cli".to_string());
    });
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();

    match config.workspace.unwrap().credentials {
        Credentials::Token(token) => assert_eq!(token.expose_secret(), "dapi-cli"),
        other => panic!("Expected token credentials, got {:?}", other),
    }
    assert_eq!(config.warehouse_id.unwrap().as_str(), "wh-cli");
}

#[test]
fn test_unknown_profile_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| a.workspace.profile = Some("missing".to_string()));
    let err = load_from_serve_args(&args, false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("profile 'missing' not found"), "Got: {}", err);
}

#[test]
fn test_toml_defaults_apply_below_cli() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file(
        r#"
[defaults]
default_limit = 25
max_limit = 500
max_chunks = 8
timeout = 120
port = 9000
verbose = true
"#,
    );
    let args = serve_args(|a| a.port = Some(9100));
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();

    assert_eq!(config.default_limit, 25);
    assert_eq!(config.max_limit, 500);
    assert_eq!(config.max_chunks, 8);
    assert_eq!(config.query_timeout_secs, 120);
    assert_eq!(config.port, 9100);
    assert!(config.verbose);
}

#[test]
fn test_default_limit_above_max_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| {
        a.default_limit = Some(200);
        a.max_limit = Some(100);
    });
    let err = load_from_serve_args(&args, false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("default limit 200"), "Got: {}", err);
}

#[test]
fn test_small_max_limit_lowers_default() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| a.max_limit = Some(10));
    let config = load_from_serve_args(&args, false, false, Some(&path)).unwrap();
    assert_eq!(config.default_limit, 10);
}

#[test]
fn test_zero_chunks_and_timeout_rejected() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");

    let args = serve_args(|a| a.max_chunks = Some(0));
    assert!(load_from_serve_args(&args, false, false, Some(&path)).is_err());

    let args = serve_args(|a| a.timeout = Some(0));
    assert!(load_from_serve_args(&args, false, false, Some(&path)).is_err());
}

#[test]
fn test_invalid_warehouse_id_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let args = serve_args(|a| a.warehouse = Some("abc; DROP".to_string()));
    let err = load_from_serve_args(&args, false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("invalid warehouse ID"), "Got: {}", err);
}

#[test]
fn test_missing_explicit_config_file_errors() {
    let _guard = EnvGuard::new(&[]);
    let path = PathBuf::from("/nonexistent/tableport/config.toml");
    let err = load_from_serve_args(&serve_args(|_| {}), false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("config file not found"), "Got: {}", err);
}

#[test]
fn test_config_path_from_env() {
    let (_dir, path) = config_file("[defaults]\nport = 8123\n");
    let path_str = path.to_string_lossy().to_string();
    let _guard = EnvGuard::new(&[("TABLEPORT_CONFIG", path_str.as_str())]);

    let config = load_from_serve_args(&serve_args(|_| {}), false, false, None).unwrap();
    assert_eq!(config.port, 8123);
}

#[test]
fn test_malformed_config_file_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("[defaults\nport = ");
    let err = load_from_serve_args(&serve_args(|_| {}), false, false, Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("invalid config file"), "Got: {}", err);
}

#[test]
fn test_list_warehouses_requires_host() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = config_file("");
    let err = load_from_workspace_args(&WorkspaceArgs::default(), Some(&path))
        .unwrap_err()
        .to_string();
    assert!(err.contains("no host specified"), "Got: {}", err);
}

#[test]
fn test_list_warehouses_resolves_workspace() {
    let _guard = EnvGuard::new(&[("DATABRICKS_TOKEN", "dapi-env")]);
    let (_dir, path) = config_file("");
    let args = WorkspaceArgs {
        host: Some("adb-1.azuredatabricks.net".to_string()),
        ..WorkspaceArgs::default()
    };
    let workspace = load_from_workspace_args(&args, Some(&path)).unwrap();
    assert_eq!(workspace.host, "adb-1.azuredatabricks.net");
    assert!(matches!(workspace.credentials, Credentials::Token(_)));
}

#[test]
fn test_normalize_host() {
    assert_eq!(normalize_host("https://adb-1.net/"), "adb-1.net");
    assert_eq!(normalize_host("http://adb-1.net"), "adb-1.net");
    assert_eq!(normalize_host("  adb-1.net  "), "adb-1.net");
}

#[test]
fn test_non_empty_helpers() {
    assert_eq!(non_empty(Some("x")), Some("x"));
    assert_eq!(non_empty(Some("")), None);
    assert_eq!(non_empty(None), None);

    let _guard = EnvGuard::new(&[("TABLEPORT_TEST_EMPTY", "")]);
    assert_eq!(env_non_empty("TABLEPORT_TEST_EMPTY"), None);
    assert_eq!(env_non_empty("TABLEPORT_TEST_UNSET_VAR"), None);
}
