//! Boundary to the hosted platform: relational rows, auth and object storage.
//!
//! Everything behind [`Backend`] is owned by the platform, including row-level
//! access control. `RestBackend` talks to it over HTTPS; `MemoryBackend` is an
//! in-process stand-in used by tests and the offline demo mode.

pub mod memory;
pub mod query;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryBackend;
pub use query::{Filter, Query};
pub use rest::RestBackend;

/// Credentials attached to a single platform call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    Anonymous,
    Bearer(String),
}

impl Auth {
    pub fn token(&self) -> Option<&str> {
        match self {
            Auth::Anonymous => None,
            Auth::Bearer(token) => Some(token.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("platform returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode platform response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session missing or expired")]
    Unauthorized,

    #[error("conflicting row: {0}")]
    Conflict(String),

    #[error("platform unavailable")]
    Unavailable,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn count(&self, auth: &Auth, query: &Query) -> Result<u64, BackendError>;

    async fn insert(
        &self,
        auth: &Auth,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, BackendError>;

    /// Inserts without reading the rows back. Use for tables the caller may
    /// write to but not select from.
    async fn append(&self, auth: &Auth, table: &str, rows: Vec<Value>) -> Result<(), BackendError>;

    async fn update(
        &self,
        auth: &Auth,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn upsert(
        &self,
        auth: &Auth,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError>;

    /// Returns `None` when the platform requires e-mail confirmation before
    /// issuing a session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<Option<AuthSession>, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// `Ok(None)` for an unknown or expired token.
    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError>;

    async fn upload(
        &self,
        auth: &Auth,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}
