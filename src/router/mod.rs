//! HTTP API.
pub mod access_token;
pub mod status;
