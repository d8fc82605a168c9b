use crate::credentials::Credentials;
use secrecy::{ExposeSecret, SecretString};

/// Render a secret for logs. Hidden unless `show_secrets` is set.
pub fn format_secret(secret: &SecretString, show_secrets: bool) -> String {
    if show_secrets {
        secret.expose_secret().to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// One-line description of the configured auth method, for startup logs.
pub fn describe_credentials(credentials: &Credentials, show_secrets: bool) -> String {
    match credentials {
        Credentials::Token(token) => {
            format!("personal access token {}", format_secret(token, show_secrets))
        }
        Credentials::ServicePrincipal {
            client_id,
            client_secret,
        } => format!(
            "service principal {} (secret {})",
            client_id,
            format_secret(client_secret, show_secrets)
        ),
    }
}
