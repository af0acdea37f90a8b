//! Opaque access tokens.

mod repository;
mod service;

pub use repository::*;
pub use service::*;

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::{Validate, ValidationError};

use crate::error::{Result, ServerError};

/// Validity window of a freshly generated token, in hours.
pub const EXPIRATION_TIME: i64 = 24;
const SALT_LENGTH: usize = 32;

/// Authentication method declared by an [`AccessTokenRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl FromStr for GrantType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, ValidationError> {
        match s {
            "password" => Ok(GrantType::Password),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            _ => Err(ValidationError::new("invalid_grant_type").with_message(
                "\"grantType\" must be \"password\" or \"client_credentials\"."
                    .into(),
            )),
        }
    }
}

fn validate_grant_type(grant_type: &str) -> std::result::Result<(), ValidationError> {
    grant_type.parse::<GrantType>().map(|_| ())
}

/// Body asking for a new access token.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessTokenRequest {
    #[validate(custom(function = "validate_grant_type"))]
    pub grant_type: String,
    pub scope: String,

    // `password` grant type.
    pub username: String,
    pub password: String,

    // `client_credentials` grant type.
    pub client_id: String,
    pub client_secret: String,
}

impl AccessTokenRequest {
    /// Parsed grant type, if recognized.
    pub fn grant_type(&self) -> Option<GrantType> {
        self.grant_type.parse().ok()
    }
}

/// Access token as stored on database.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow,
)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessToken {
    pub access_token: String,
    pub user_id: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub client_id: i64,
    /// Unix timestamp, in seconds.
    pub expires: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl AccessToken {
    /// Create a new [`AccessToken`] for `user_id`, valid for
    /// [`EXPIRATION_TIME`] hours.
    pub fn generate(user_id: i64) -> Self {
        Self::generate_at(user_id, Utc::now())
    }

    /// Create a new [`AccessToken`] as if it was issued at `now`.
    pub fn generate_at(user_id: i64, now: DateTime<Utc>) -> Self {
        let expires = (now + Duration::hours(EXPIRATION_TIME)).timestamp();

        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);

        let digest = Sha256::digest(
            format!("at-{user_id}-{expires}-{}", hex::encode(salt)).as_bytes(),
        );

        Self {
            access_token: hex::encode(digest),
            user_id,
            client_id: 0,
            expires,
        }
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BadRequest`] on the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(ServerError::BadRequest("invalid access token".into()));
        }

        if self.user_id <= 0 {
            return Err(ServerError::BadRequest("invalid user id".into()));
        }

        if self.client_id <= 0 {
            return Err(ServerError::BadRequest("invalid client id".into()));
        }

        if self.expires <= 0 {
            return Err(ServerError::BadRequest(
                "invalid expiration time".into(),
            ));
        }

        Ok(())
    }

    /// Whether expiration is already past.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether expiration is strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let seconds = now.timestamp();
        self.expires < seconds
            || (self.expires == seconds && now.timestamp_subsec_nanos() > 0)
    }
}
