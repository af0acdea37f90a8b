//! In-memory repositories. MUST NEVER be used in production.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::error::{Result, ServerError};
use crate::token::{AccessToken, TokenRepository};
use crate::user::{User, UsersRepository};

/// [`TokenRepository`] keeping tokens in a map.
#[derive(Default)]
pub struct MemoryTokenRepository {
    tokens: Mutex<HashMap<String, AccessToken>>,
    fail_writes: bool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryTokenRepository {
    /// Repository whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, token: AccessToken) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.access_token.clone(), token);
    }

    pub fn get(&self, id: &str) -> Option<AccessToken> {
        self.tokens.lock().unwrap().get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn get_by_id(&self, id: &str) -> Result<AccessToken> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.get(id).ok_or_else(|| {
            ServerError::NotFound("no access token found with given id".into())
        })
    }

    async fn create(&self, token: &AccessToken) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(ServerError::internal("error creating access token"));
        }

        self.insert(token.clone());
        Ok(())
    }

    async fn update_expiration_time(&self, token: &AccessToken) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(ServerError::internal("error updating access token"));
        }

        if let Some(stored) =
            self.tokens.lock().unwrap().get_mut(&token.access_token)
        {
            stored.expires = token.expires;
        }
        Ok(())
    }
}

/// [`UsersRepository`] answering the same way to every login.
pub struct StaticUsersRepository {
    user: Option<User>,
    last_login: Mutex<Option<(String, String)>>,
    pub calls: AtomicUsize,
}

impl StaticUsersRepository {
    /// Accept every credential as user `id`.
    pub fn user(id: i64) -> Self {
        Self {
            user: Some(User {
                id,
                ..Default::default()
            }),
            last_login: Mutex::default(),
            calls: AtomicUsize::default(),
        }
    }

    /// Refuse every credential.
    pub fn invalid_credentials() -> Self {
        Self {
            user: None,
            last_login: Mutex::default(),
            calls: AtomicUsize::default(),
        }
    }

    pub fn last_login(&self) -> Option<(String, String)> {
        self.last_login.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsersRepository for StaticUsersRepository {
    async fn login_user(&self, email: &str, password: &str) -> Result<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_login.lock().unwrap() =
            Some((email.to_owned(), password.to_owned()));

        self.user
            .clone()
            .ok_or_else(|| ServerError::InvalidCredentials {
                status: StatusCode::NOT_FOUND,
                message: "invalid user credentials".into(),
            })
    }
}
