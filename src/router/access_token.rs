//! Issue and introspect access tokens.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::Result;
use crate::token::{AccessToken, AccessTokenRequest, TokenService};

/// Handler returning an access token by its identifier.
pub async fn get(
    State(tokens): State<Arc<TokenService>>,
    Path(access_token_id): Path<String>,
) -> Result<Json<AccessToken>> {
    Ok(Json(tokens.get_by_id(&access_token_id).await?))
}

/// Handler issuing a new access token.
pub async fn create(
    State(tokens): State<Arc<TokenService>>,
    body: std::result::Result<Json<AccessTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccessToken>)> {
    let Json(request) = body?;
    let token = tokens.create(request).await?;

    Ok((StatusCode::CREATED, Json(token)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::testing::{MemoryTokenRepository, StaticUsersRepository};
    use crate::token::AccessToken;
    use crate::*;

    fn state(
        repo: Arc<MemoryTokenRepository>,
        users: StaticUsersRepository,
    ) -> AppState {
        AppState::new(
            Arc::new(config::Configuration::default()),
            token::TokenService::new(
                repo,
                Arc::new(users),
                Arc::new(clock::SystemClock),
            ),
        )
    }

    #[tokio::test]
    async fn test_create_handler() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let app = app(state(repo.clone(), StaticUsersRepository::user(123456)));

        let body = json!({
            "grantType": "password",
            "username": "u",
            "password": "p",
        });
        let response = make_request(
            app,
            Method::POST,
            "/oauth/access_token",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let token: AccessToken = serde_json::from_slice(&body).unwrap();
        assert_eq!(token.user_id, 123456);
        assert!(!token.is_expired());
        assert_eq!(repo.get(&token.access_token), Some(token));
    }

    #[tokio::test]
    async fn test_create_with_bad_grant_type() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let app = app(state(repo, StaticUsersRepository::user(1)));

        let response = make_request(
            app,
            Method::POST,
            "/oauth/access_token",
            json!({ "grantType": "bogus" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"][0]["field"], "grant_type");
        assert_eq!(
            body["errors"][0]["message"],
            "\"grantType\" must be \"password\" or \"client_credentials\"."
        );
    }

    #[tokio::test]
    async fn test_create_with_invalid_json() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let app = app(state(repo, StaticUsersRepository::user(1)));

        let response = make_request(
            app,
            Method::POST,
            "/oauth/access_token",
            "{not json".into(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_with_invalid_credentials() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let app = app(state(
            repo.clone(),
            StaticUsersRepository::invalid_credentials(),
        ));

        let response = make_request(
            app,
            Method::POST,
            "/oauth/access_token",
            json!({ "grantType": "password", "username": "u" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_create_with_store_failure() {
        let repo = Arc::new(MemoryTokenRepository::failing());
        let app = app(state(repo, StaticUsersRepository::user(1)));

        let response = make_request(
            app,
            Method::POST,
            "/oauth/access_token",
            json!({ "grantType": "password" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_get_handler() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let token = AccessToken {
            access_token: "abc".into(),
            user_id: 3,
            client_id: 4,
            expires: 1_700_000_000,
        };
        repo.insert(token.clone());
        let app = app(state(repo, StaticUsersRepository::user(1)));

        let response = make_request(
            app,
            Method::GET,
            "/oauth/access_token/abc",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: AccessToken = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, token);
    }

    #[tokio::test]
    async fn test_get_handler_errors() {
        let repo = Arc::new(MemoryTokenRepository::default());
        let state = state(repo.clone(), StaticUsersRepository::user(1));

        let response = make_request(
            app(state.clone()),
            Method::GET,
            "/oauth/access_token/missing",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = make_request(
            app(state),
            Method::GET,
            "/oauth/access_token/%20%20",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            repo.reads.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
