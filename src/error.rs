//! Error handler for oauth.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Coarse classification of a [`ServerError`].
///
/// Transport layers map a kind onto their own representation, such as an
/// HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied malformed or invalid input.
    BadRequest,
    /// Requested resource does not exist.
    NotFound,
    /// A collaborator failed.
    Internal,
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid json body")]
    Axum(#[from] JsonRejection),

    #[error("{0}")]
    NotFound(String),

    /// Users API refused the credentials.
    #[error("{message}")]
    InvalidCredentials { status: StatusCode, message: String },

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("users API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Create an [`ServerError::Internal`] without underlying source.
    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal {
            details: details.into(),
            source: None,
        }
    }

    /// Machine-checkable classification of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Validation(_)
            | ServerError::BadRequest(_)
            | ServerError::Axum(_)
            | ServerError::InvalidCredentials { .. } => ErrorKind::BadRequest,
            ServerError::NotFound(_)
            | ServerError::Sql(SQLxError::RowNotFound) => ErrorKind::NotFound,
            ServerError::Sql(_)
            | ServerError::Request(_)
            | ServerError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status code matching the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidCredentials { status, .. } => *status,
            _ => match self.kind() {
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .details(&self.to_string())
            .status(self.status());

        let response = match (&self, self.kind()) {
            (ServerError::Validation(validation_errors), _) => response
                .title("There were validation errors with your request.")
                .errors(validation_errors),

            (ServerError::InvalidCredentials { .. }, _) => {
                response.title("Invalid credentials.")
            },

            (_, ErrorKind::BadRequest) => {
                response.title("Your request could not be processed.")
            },

            (_, ErrorKind::NotFound) => {
                response.title("Requested resource was not found.")
            },

            (_, ErrorKind::Internal) => {
                tracing::error!(error = %self, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
