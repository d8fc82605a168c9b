use crate::error::TableportError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Refresh OAuth tokens this long before the server-reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// How the gateway authenticates against the workspace.
#[derive(Debug)]
pub enum Credentials {
    /// Personal access token.
    Token(SecretString),
    /// OAuth machine-to-machine service principal.
    ServicePrincipal {
        client_id: String,
        client_secret: SecretString,
    },
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

pub fn clone_credentials(credentials: &Credentials) -> Credentials {
    match credentials {
        Credentials::Token(token) => Credentials::Token(clone_secret(token)),
        Credentials::ServicePrincipal {
            client_id,
            client_secret,
        } => Credentials::ServicePrincipal {
            client_id: client_id.clone(),
            client_secret: clone_secret(client_secret),
        },
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Produces `Authorization` header values for workspace API calls.
pub struct CredentialProvider {
    host: String,
    credentials: Credentials,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl CredentialProvider {
    pub fn new(host: String, credentials: Credentials, client: Client) -> Self {
        Self {
            host,
            credentials,
            client,
            cached: Mutex::new(None),
        }
    }

    pub async fn authorization(&self) -> Result<String, TableportError> {
        match &self.credentials {
            Credentials::Token(token) => Ok(format!("Bearer {}", token.expose_secret())),
            Credentials::ServicePrincipal {
                client_id,
                client_secret,
            } => {
                let mut cached = self.cached.lock().await;
                if let Some(entry) = cached.as_ref()
                    && Instant::now() < entry.expires_at
                {
                    return Ok(format!("Bearer {}", entry.token.expose_secret()));
                }

                let fresh = self.request_token(client_id, client_secret).await?;
                let header = format!("Bearer {}", fresh.token.expose_secret());
                *cached = Some(fresh);
                Ok(header)
            }
        }
    }

    async fn request_token(
        &self,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<CachedToken, TableportError> {
        let url = format!("https://{}/oidc/v1/token", self.host);
        tracing::debug!(%url, client_id, "requesting OAuth token");

        let resp = self
            .client
            .post(&url)
            .basic_auth(client_id, Some(client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .await
            .map_err(|e| TableportError::Connection {
                message: format!("failed to request OAuth token: {}", e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TableportError::Auth {
                message: format!("OAuth token request rejected with HTTP {}", status.as_u16()),
            });
        }

        let body: TokenResponse = resp.json().await.map_err(|e| TableportError::Auth {
            message: format!("failed to parse OAuth token response: {}", e),
        })?;

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        Ok(CachedToken {
            token: SecretString::from(body.access_token),
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        })
    }
}
