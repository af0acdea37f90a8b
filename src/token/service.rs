use std::sync::Arc;

use validator::Validate;

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::telemetry;
use crate::token::{AccessToken, AccessTokenRequest, TokenRepository};
use crate::user::UsersRepository;

/// Access token manager.
///
/// Holds no state of its own; everything lives behind the repositories.
#[derive(Clone)]
pub struct TokenService {
    repo: Arc<dyn TokenRepository>,
    users: Arc<dyn UsersRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new [`TokenService`].
    pub fn new(
        repo: Arc<dyn TokenRepository>,
        users: Arc<dyn UsersRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, users, clock }
    }

    /// Find an access token using its identifier.
    pub async fn get_by_id(&self, id: &str) -> Result<AccessToken> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ServerError::BadRequest(
                "invalid access token id".into(),
            ));
        }

        let result = self.repo.get_by_id(id).await;
        telemetry::record_token_lookup(&result);

        result
    }

    /// Verify credentials then issue and store a new access token.
    pub async fn create(
        &self,
        request: AccessTokenRequest,
    ) -> Result<AccessToken> {
        request.validate()?;

        // Both grant types authenticate with username and password for now.
        let user = self
            .users
            .login_user(&request.username, &request.password)
            .await?;

        let token = AccessToken::generate_at(user.id, self.clock.now());
        self.repo.create(&token).await?;

        tracing::debug!(
            user_id = token.user_id,
            grant_type = request.grant_type().map(|g| g.as_str()),
            "access token issued"
        );
        telemetry::record_token_issued(&request.grant_type);

        Ok(token)
    }

    /// Persist the current expiration of `token`.
    pub async fn update_expiration_time(
        &self,
        token: &AccessToken,
    ) -> Result<()> {
        token.validate()?;

        let token = AccessToken {
            access_token: token.access_token.trim().to_owned(),
            ..token.clone()
        };
        self.repo.update_expiration_time(&token).await
    }
}
