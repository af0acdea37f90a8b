//! Verify credentials against the users API.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{Result, ServerError};
use crate::user::{LoginRequest, User};

const LOGIN_PATH: &str = "users/login";

/// Port for credential verification.
#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Authenticate `email`/`password` and return the matching [`User`].
    async fn login_user(&self, email: &str, password: &str) -> Result<User>;
}

/// Error body produced by the users API.
#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
    status: u16,
}

/// [`UsersRepository`] calling the users API over HTTP.
#[derive(Clone, Debug)]
pub struct HttpUsersRepository {
    client: Client,
    login_url: Url,
}

impl HttpUsersRepository {
    /// Create a new [`HttpUsersRepository`].
    ///
    /// Every login call is cancelled after `timeout`.
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(address).map_err(|err| ServerError::Internal {
            details: format!("invalid users API address {address:?}"),
            source: Some(Box::new(err)),
        })?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let login_url = base.join(LOGIN_PATH).map_err(|err| ServerError::Internal {
            details: "cannot build users API login URL".into(),
            source: Some(Box::new(err)),
        })?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, login_url })
    }
}

#[async_trait]
impl UsersRepository for HttpUsersRepository {
    async fn login_user(&self, email: &str, password: &str) -> Result<User> {
        let response = self
            .client
            .post(self.login_url.clone())
            .json(&LoginRequest { email, password })
            .send()
            .await
            .inspect_err(|err| {
                tracing::warn!(error = %err, "users API unreachable");
            })?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            let remote = serde_json::from_slice::<RemoteError>(&body).map_err(|err| {
                ServerError::Internal {
                    details: "invalid error interface when trying to login the user"
                        .into(),
                    source: Some(Box::new(err)),
                }
            })?;

            return match StatusCode::from_u16(remote.status) {
                Ok(code) if code.is_client_error() => Err(ServerError::InvalidCredentials {
                    status: code,
                    message: remote.message,
                }),
                _ => Err(ServerError::internal(format!(
                    "users API failed with status {status}: {}",
                    remote.message
                ))),
            };
        }

        serde_json::from_slice::<User>(&body).map_err(|err| ServerError::Internal {
            details: "error when trying to unmarshal user response".into(),
            source: Some(Box::new(err)),
        })
    }
}
