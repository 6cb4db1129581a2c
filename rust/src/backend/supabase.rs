// Supabase REST gateway (GoTrue auth + PostgREST tables).

use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};

use super::{
    AccountRow, Artist, ArtistFilter, ArtistUpdate, AuthEvent, AuthSession, AuthTokens, AuthUser,
    Backend, BackendError, NewArtist, SignUpRequest, SignUpResponse,
};

const AUTH_EVENT_CAPACITY: usize = 32;
const ARTIST_TABLE: &str = "Artist";
const ACCOUNT_TABLE: &str = "profiles";
// Refresh slightly before the server-side expiry to avoid racing it.
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseEndpoint {
    pub url: String,
    pub anon_key: String,
}

pub struct SupabaseBackend {
    http: reqwest::Client,
    endpoint: Option<SupabaseEndpoint>,
    session: RwLock<Option<AuthSession>>,
    // Refresh tokens are single use; one exchange at a time.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl GoTrueSession {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now_unix() + secs));
        AuthSession {
            user: self.user,
            tokens: AuthTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at,
            },
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn is_expired(tokens: &AuthTokens) -> bool {
    tokens
        .expires_at
        .map(|at| at - EXPIRY_SKEW_SECS <= now_unix())
        .unwrap_or(false)
}

/// Map a non-2xx response body to a typed error.
///
/// GoTrue reports bad passwords either as `{"error":"invalid_grant"}` (older
/// servers) or `{"error_code":"invalid_credentials"}`.
fn api_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |key: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let code = field("error_code").or_else(|| field("error"));
    if matches!(
        code.as_deref(),
        Some("invalid_credentials") | Some("invalid_grant")
    ) {
        return BackendError::InvalidCredentials;
    }

    let message = field("msg")
        .or_else(|| field("message"))
        .or_else(|| field("error_description"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| body.trim().to_string());
    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Sign-up answers with a full session when auto-confirm is on, and with the
/// bare user object when the email must be confirmed first.
fn parse_sign_up(value: Value) -> Result<SignUpResponse, BackendError> {
    if value.get("access_token").is_some() {
        let session = serde_json::from_value::<GoTrueSession>(value)
            .map_err(|e| BackendError::Decode(e.to_string()))?
            .into_session();
        return Ok(SignUpResponse {
            user: session.user.clone(),
            session: Some(session),
        });
    }
    let user_value = match value.get("user") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    let user = serde_json::from_value::<AuthUser>(user_value)
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(SignUpResponse {
        user,
        session: None,
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(api_error(status, &body));
    }
    Ok(resp.json::<T>().await?)
}

impl SupabaseBackend {
    pub fn new(endpoint: Option<SupabaseEndpoint>, timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%e, "supabase: http client builder failed, using defaults");
                reqwest::Client::new()
            }
        };
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            http,
            endpoint,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
        }
    }

    fn endpoint(&self) -> Result<&SupabaseEndpoint, BackendError> {
        self.endpoint.as_ref().ok_or(BackendError::NotConfigured)
    }

    fn auth_url(&self, path: &str) -> Result<String, BackendError> {
        let ep = self.endpoint()?;
        Ok(format!("{}/auth/v1/{path}", ep.url.trim_end_matches('/')))
    }

    fn rest_url(&self, table: &str) -> Result<String, BackendError> {
        let ep = self.endpoint()?;
        Ok(format!("{}/rest/v1/{table}", ep.url.trim_end_matches('/')))
    }

    fn current_session(&self) -> Option<AuthSession> {
        match self.session.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    fn replace_session(&self, next: Option<AuthSession>) -> Option<AuthSession> {
        match self.session.write() {
            Ok(mut g) => std::mem::replace(&mut *g, next),
            Err(poison) => std::mem::replace(&mut *poison.into_inner(), next),
        }
    }

    fn publish(&self, event: AuthEvent) {
        tracing::info!(event = event.tag(), "supabase: auth state change");
        // No receivers is fine: nobody has subscribed yet.
        let _ = self.events.send(event);
    }

    fn adopt(&self, session: AuthSession) {
        self.replace_session(Some(session.clone()));
        self.publish(AuthEvent::SignedIn(session));
    }

    fn request_as(
        &self,
        method: Method,
        url: &str,
        bearer: &str,
    ) -> Result<RequestBuilder, BackendError> {
        let ep = self.endpoint()?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", ep.anon_key.as_str())
            .bearer_auth(bearer))
    }

    /// Request authenticated with the project key only.
    fn anon_request(&self, method: Method, url: &str) -> Result<RequestBuilder, BackendError> {
        let ep = self.endpoint()?;
        self.request_as(method, url, &ep.anon_key)
    }

    /// Rotate the session whose access token is `stale_access_token`.
    ///
    /// Returns the session to use afterwards: the one another caller already
    /// rotated to, the freshly exchanged one, or `None` once signed out.
    async fn refresh(&self, stale_access_token: &str) -> Result<Option<AuthSession>, BackendError> {
        let _guard = self.refresh_lock.lock().await;
        let Some(current) = self.current_session() else {
            return Ok(None);
        };
        if current.tokens.access_token != stale_access_token {
            return Ok(Some(current));
        }
        tracing::info!(user_id = %current.user.id, "supabase: refreshing access token");
        let grant = self
            .token_grant(
                "refresh_token",
                json!({ "refresh_token": current.tokens.refresh_token }),
            )
            .await;
        match grant {
            Ok(session) => {
                self.adopt(session.clone());
                Ok(Some(session))
            }
            Err(e) if e.is_auth_rejection() => {
                tracing::info!(%e, "supabase: refresh token rejected, dropping session");
                self.replace_session(None);
                self.publish(AuthEvent::SignedOut);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The signed-in user's access token, refreshed first when it is expired.
    async fn user_bearer(&self) -> Result<Option<String>, BackendError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !is_expired(&session.tokens) {
            return Ok(Some(session.tokens.access_token));
        }
        Ok(self
            .refresh(&session.tokens.access_token)
            .await?
            .map(|s| s.tokens.access_token))
    }

    /// Send a table request as the user when signed in, as anon otherwise.
    ///
    /// A 401 on a user token gets one refresh and one resend; the server can
    /// revoke a token before its advertised expiry.
    async fn send_authed<F>(
        &self,
        method: Method,
        url: &str,
        build: F,
    ) -> Result<reqwest::Response, BackendError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let Some(bearer) = self.user_bearer().await? else {
            return Ok(build(self.anon_request(method, url)?).send().await?);
        };
        let resp = build(self.request_as(method.clone(), url, &bearer)?)
            .send()
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        tracing::info!("supabase: access token rejected, refreshing before retry");
        match self.refresh(&bearer).await? {
            Some(session) => Ok(build(self.request_as(
                method,
                url,
                &session.tokens.access_token,
            )?)
            .send()
            .await?),
            None => Ok(resp),
        }
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<AuthSession, BackendError> {
        let url = self.auth_url("token")?;
        let resp = self
            .anon_request(Method::POST, &url)?
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        let session: GoTrueSession = decode(resp).await?;
        Ok(session.into_session())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let ep = self.endpoint()?;
        let url = self.auth_url("user")?;
        let resp = self
            .http
            .get(&url)
            .header("apikey", ep.anon_key.as_str())
            .bearer_auth(access_token)
            .send()
            .await?;
        decode(resp).await
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.rest_url(table)?;
        let resp = self
            .send_authed(Method::GET, &url, |b| b.query(&[("select", "*")]).query(query))
            .await?;
        decode(resp).await
    }

    async fn write_returning<T, F>(
        &self,
        method: Method,
        url: &str,
        build: F,
    ) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let resp = self
            .send_authed(method, url, |b| {
                build(b).header("Prefer", HeaderValue::from_static("return=representation"))
            })
            .await?;
        decode(resp).await
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, req: SignUpRequest) -> Result<SignUpResponse, BackendError> {
        let url = self.auth_url("signup")?;
        let body = json!({
            "email": req.email,
            "password": req.password,
            "data": { "name": req.name, "phone": req.phone },
        });
        let resp = self.anon_request(Method::POST, &url)?.json(&body).send().await?;
        let value: Value = decode(resp).await?;
        let out = parse_sign_up(value)?;
        if let Some(session) = out.session.clone() {
            self.adopt(session);
        }
        Ok(out)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.adopt(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.replace_session(None);
        let result = match (previous, self.auth_url("logout")) {
            (Some(session), Ok(url)) => {
                let ep = self.endpoint()?;
                let sent = self
                    .http
                    .post(&url)
                    .header("apikey", ep.anon_key.as_str())
                    .bearer_auth(&session.tokens.access_token)
                    .send()
                    .await;
                match sent {
                    Ok(resp) if resp.status().is_success() => Ok(()),
                    Ok(resp) => {
                        let status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        Err(api_error(status, &body))
                    }
                    Err(e) => Err(BackendError::from(e)),
                }
            }
            (None, _) => Ok(()),
            (Some(_), Err(e)) => Err(e),
        };
        self.publish(AuthEvent::SignedOut);
        result
    }

    async fn restore_session(&self, stored: AuthSession) -> Result<AuthSession, BackendError> {
        if !is_expired(&stored.tokens) {
            match self.fetch_user(&stored.tokens.access_token).await {
                Ok(user) => {
                    let session = AuthSession {
                        user,
                        tokens: stored.tokens,
                    };
                    self.adopt(session.clone());
                    return Ok(session);
                }
                Err(BackendError::Api { status, .. }) if status == 401 || status == 403 => {
                    tracing::info!("supabase: stored access token rejected, refreshing");
                }
                Err(e) => return Err(e),
            }
        }
        let session = self
            .token_grant(
                "refresh_token",
                json!({ "refresh_token": stored.tokens.refresh_token }),
            )
            .await?;
        self.adopt(session.clone());
        Ok(session)
    }

    async fn refresh_session_if_expired(&self) -> Result<bool, BackendError> {
        let Some(session) = self.current_session() else {
            return Ok(false);
        };
        if !is_expired(&session.tokens) {
            return Ok(false);
        }
        Ok(self.refresh(&session.tokens.access_token).await?.is_some())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        self.fetch_user(&session.tokens.access_token).await.map(Some)
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>, BackendError> {
        let rows: Vec<Artist> = self
            .select(ARTIST_TABLE, &[("id", format!("eq.{id}"))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_artist(&self, artist: NewArtist) -> Result<Artist, BackendError> {
        let url = self.rest_url(ARTIST_TABLE)?;
        let rows: Vec<Artist> = self
            .write_returning(Method::POST, &url, |b| b.json(&artist))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".into()))
    }

    async fn update_artist(&self, id: &str, update: ArtistUpdate) -> Result<Artist, BackendError> {
        let url = self.rest_url(ARTIST_TABLE)?;
        let filter = [("id", format!("eq.{id}"))];
        let rows: Vec<Artist> = self
            .write_returning(Method::PATCH, &url, |b| b.query(&filter).json(&update))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("artist {id}")))
    }

    async fn list_artists(&self, filter: ArtistFilter) -> Result<Vec<Artist>, BackendError> {
        let mut query = vec![("order", "name.asc".to_string())];
        if filter.verified_only {
            query.push(("is_verified", "eq.true".to_string()));
        }
        self.select(ARTIST_TABLE, &query).await
    }

    async fn account(&self, user_id: &str) -> Result<Option<AccountRow>, BackendError> {
        let rows: Vec<AccountRow> = self
            .select(ACCOUNT_TABLE, &[("id", format!("eq.{user_id}"))])
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_at: Option<i64>) -> AuthTokens {
        AuthTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at,
        }
    }

    #[test]
    fn invalid_grant_maps_to_invalid_credentials() {
        let old = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(old, BackendError::InvalidCredentials));

        let new = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert!(matches!(new, BackendError::InvalidCredentials));
    }

    #[test]
    fn api_error_extracts_message() {
        let e = api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        match e {
            BackendError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "User already registered");
            }
            other => panic!("unexpected {other:?}"),
        }

        let postgrest = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":"23505","message":"duplicate key value","details":null}"#,
        );
        assert_eq!(postgrest.to_string(), "duplicate key value");

        let plain = api_error(StatusCode::BAD_GATEWAY, " upstream down \n");
        assert_eq!(plain.to_string(), "upstream down");
    }

    #[test]
    fn sign_up_with_session() {
        let v = json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_at": 1_900_000_000i64,
            "user": {"id": "u1", "email": "a@b.c"}
        });
        let out = parse_sign_up(v).unwrap();
        assert_eq!(out.user.id, "u1");
        let session = out.session.expect("session");
        assert_eq!(session.tokens.access_token, "at");
        assert_eq!(session.tokens.expires_at, Some(1_900_000_000));
    }

    #[test]
    fn sign_up_pending_confirmation() {
        let bare = parse_sign_up(json!({"id": "u2", "email": "x@y.z", "aud": "authenticated"}))
            .unwrap();
        assert_eq!(bare.user.id, "u2");
        assert!(bare.session.is_none());

        let wrapped = parse_sign_up(json!({"user": {"id": "u3"}, "session": null})).unwrap();
        assert_eq!(wrapped.user.id, "u3");
        assert!(wrapped.session.is_none());
    }

    #[test]
    fn expires_in_becomes_absolute() {
        let s: GoTrueSession = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": {"id": "u1"}
        }))
        .unwrap();
        let at = s.into_session().tokens.expires_at.unwrap();
        assert!(at > now_unix() + 3500);
    }

    #[test]
    fn expiry_check() {
        assert!(!is_expired(&tokens(None)));
        assert!(is_expired(&tokens(Some(now_unix() - 10))));
        assert!(!is_expired(&tokens(Some(now_unix() + 3600))));
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let backend = SupabaseBackend::new(
            Some(SupabaseEndpoint {
                url: "https://proj.supabase.co/".into(),
                anon_key: "anon".into(),
            }),
            Duration::from_secs(5),
        );
        assert_eq!(
            backend.auth_url("token").unwrap(),
            "https://proj.supabase.co/auth/v1/token"
        );
        assert_eq!(
            backend.rest_url(ARTIST_TABLE).unwrap(),
            "https://proj.supabase.co/rest/v1/Artist"
        );
    }

    #[tokio::test]
    async fn unconfigured_backend_fails_fast() {
        let backend = SupabaseBackend::new(None, Duration::from_secs(5));
        assert!(matches!(
            backend.list_artists(ArtistFilter::default()).await,
            Err(BackendError::NotConfigured)
        ));
        assert!(matches!(backend.current_user().await, Ok(None)));
    }

    #[tokio::test]
    async fn sign_out_without_session_still_notifies() {
        let backend = SupabaseBackend::new(None, Duration::from_secs(5));
        let mut rx = backend.auth_events();
        backend.sign_out().await.unwrap();
        assert!(matches!(rx.recv().await, Ok(AuthEvent::SignedOut)));
    }
}
