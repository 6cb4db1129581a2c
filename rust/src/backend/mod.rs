//! Backend gateway: auth + table access on the managed backend.
//!
//! Every call returns a `Result` and never panics past its own boundary. Calls
//! are independently retryable by the caller; nothing here retries internally.

mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use supabase::{SupabaseBackend, SupabaseEndpoint};

/// Authenticated identity as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// What gets persisted in the session store between launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: AuthUser,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
}

/// `session` is `None` when the project requires email confirmation before sign-in.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// Auth-state notifications, broadcast to every subscriber in send order.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
}

impl AuthEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
        }
    }
}

/// Row of the `Artist` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_num: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewArtist {
    pub id: String,
    pub name: String,
    pub email: String,
    pub user_id: String,
    pub phone_num: Option<i64>,
    pub bio: String,
}

/// Full replacement of the user-editable columns; `None` clears the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistUpdate {
    pub name: String,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone_num: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtistFilter {
    pub verified_only: bool,
}

/// Row of the `profiles` table. Only the commonly provisioned columns are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Coarse classification used for auth failures shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredentials,
    NetworkError,
    Unknown,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("backend is not configured (set supabase_url and supabase_anon_key)")]
    NotConfigured,
}

impl BackendError {
    /// The backend refused the credentials themselves, as opposed to being unreachable.
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            BackendError::InvalidCredentials => true,
            BackendError::Api { status, .. } => matches!(status, 400 | 401 | 403),
            _ => false,
        }
    }

    pub fn auth_kind(&self) -> AuthErrorKind {
        match self {
            BackendError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            BackendError::Network(_) => AuthErrorKind::NetworkError,
            _ => AuthErrorKind::Unknown,
        }
    }

    /// Backend message when there is one, generic fallback otherwise.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            BackendError::Api { .. } | BackendError::Decode(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            BackendError::InvalidCredentials => "Invalid email or password".to_string(),
            BackendError::Network(_) => "Network error. Check your connection.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// New receiver for auth-state notifications. Each call is an independent subscription.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_up(&self, req: SignUpRequest) -> Result<SignUpResponse, BackendError>;
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;
    /// Always drops the gateway's in-memory session, even when the revoke call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;
    /// Adopt a previously persisted session; validates (or refreshes) it first.
    async fn restore_session(&self, stored: AuthSession) -> Result<AuthSession, BackendError>;
    /// Rotate the live session's tokens when the access token is expired or close to it.
    /// Returns whether a refresh happened. The new session is published as `SignedIn`;
    /// a rejected refresh token drops the session and publishes `SignedOut`.
    async fn refresh_session_if_expired(&self) -> Result<bool, BackendError>;
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;

    async fn artist(&self, id: &str) -> Result<Option<Artist>, BackendError>;
    async fn create_artist(&self, artist: NewArtist) -> Result<Artist, BackendError>;
    async fn update_artist(&self, id: &str, update: ArtistUpdate) -> Result<Artist, BackendError>;
    /// Always ordered by name ascending.
    async fn list_artists(&self, filter: ArtistFilter) -> Result<Vec<Artist>, BackendError>;

    async fn account(&self, user_id: &str) -> Result<Option<AccountRow>, BackendError>;
}
