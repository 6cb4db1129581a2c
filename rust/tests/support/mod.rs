//! Shared fixtures for FfiApp integration tests: an in-memory backend, a
//! recording playback sink and polling helpers.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use artisthub_core::backend::{
    AccountRow, Artist, ArtistFilter, ArtistUpdate, AuthEvent, AuthSession, AuthTokens, AuthUser,
    Backend, BackendError, NewArtist, SignUpRequest, SignUpResponse,
};
use artisthub_core::{PlaybackSink, PlaybackSinkError};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, v: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("artisthub_config.json");
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn artist(id: &str, name: &str, verified: bool) -> Artist {
    Artist {
        id: id.to_string(),
        created_at: None,
        name: Some(name.to_string()),
        email: None,
        phone_num: None,
        user_id: None,
        dob: None,
        bio: None,
        is_verified: Some(verified),
    }
}

pub fn session_for(user: &AuthUser) -> AuthSession {
    AuthSession {
        user: user.clone(),
        tokens: AuthTokens {
            access_token: format!("access-{}", user.id),
            refresh_token: format!("refresh-{}", user.id),
            expires_at: None,
        },
    }
}

pub const REVOKED_TOKEN: &str = "revoked";

/// In-memory stand-in for the managed backend.
pub struct FakeBackend {
    events: broadcast::Sender<AuthEvent>,
    subscriptions: AtomicUsize,
    users: Mutex<HashMap<String, (String, AuthUser)>>, // email -> (password, user)
    next_user: AtomicUsize,
    artists: Mutex<BTreeMap<String, Artist>>,
    fail_create_artist: AtomicBool,
    offline: AtomicBool,
    artist_delay_ms: AtomicU64,
    artist_fetches: AtomicUsize,
    restores: AtomicUsize,
    session: Mutex<Option<AuthSession>>,
    token_expired: AtomicBool,
    refresh_rejected: AtomicBool,
    refreshes: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            events,
            subscriptions: AtomicUsize::new(0),
            users: Mutex::new(HashMap::new()),
            next_user: AtomicUsize::new(1),
            artists: Mutex::new(BTreeMap::new()),
            fail_create_artist: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            artist_delay_ms: AtomicU64::new(0),
            artist_fetches: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
            session: Mutex::new(None),
            token_expired: AtomicBool::new(false),
            refresh_rejected: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn add_user(&self, email: &str, password: &str) -> AuthUser {
        let n = self.next_user.fetch_add(1, Ordering::SeqCst);
        let user = AuthUser {
            id: format!("user-{n}"),
            email: Some(email.to_string()),
        };
        self.users
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    pub fn put_artist(&self, artist: Artist) {
        self.artists
            .lock()
            .unwrap()
            .insert(artist.id.clone(), artist);
    }

    pub fn artist_row(&self, id: &str) -> Option<Artist> {
        self.artists.lock().unwrap().get(id).cloned()
    }

    pub fn has_user(&self, email: &str) -> bool {
        self.users.lock().unwrap().contains_key(email)
    }

    pub fn set_fail_create_artist(&self, fail: bool) {
        self.fail_create_artist.store(fail, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_artist_delay(&self, delay: Duration) {
        self.artist_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn artist_fetches(&self) -> usize {
        self.artist_fetches.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    /// The live access token runs out; the next table call or refresh check rotates it.
    pub fn expire_token(&self) {
        self.token_expired.store(true, Ordering::SeqCst);
    }

    pub fn reject_refresh(&self) {
        self.refresh_rejected.store(true, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
    }

    fn adopt(&self, session: AuthSession) {
        *self.session.lock().unwrap() = Some(session.clone());
        self.publish(AuthEvent::SignedIn(session));
    }

    fn rotate_if_expired(&self) -> Result<bool, BackendError> {
        if !self.token_expired.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let Some(current) = self.session.lock().unwrap().clone() else {
            return Ok(false);
        };
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_rejected.load(Ordering::SeqCst) {
            *self.session.lock().unwrap() = None;
            self.publish(AuthEvent::SignedOut);
            return Err(BackendError::InvalidCredentials);
        }
        self.token_expired.store(false, Ordering::SeqCst);
        let tokens = AuthTokens {
            access_token: format!("access-{}-r{n}", current.user.id),
            refresh_token: format!("refresh-{}-r{n}", current.user.id),
            expires_at: None,
        };
        self.adopt(AuthSession {
            user: current.user,
            tokens,
        });
        Ok(true)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.events.subscribe()
    }

    async fn sign_up(&self, req: SignUpRequest) -> Result<SignUpResponse, BackendError> {
        self.check_online()?;
        if self.has_user(&req.email) {
            return Err(BackendError::Api {
                status: 422,
                message: "User already registered".into(),
            });
        }
        let user = self.add_user(&req.email, &req.password);
        let session = session_for(&user);
        self.adopt(session.clone());
        Ok(SignUpResponse {
            user,
            session: Some(session),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        self.check_online()?;
        let user = match self.users.lock().unwrap().get(email) {
            Some((pw, user)) if pw == password => user.clone(),
            _ => return Err(BackendError::InvalidCredentials),
        };
        let session = session_for(&user);
        self.adopt(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        *self.session.lock().unwrap() = None;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn restore_session(&self, stored: AuthSession) -> Result<AuthSession, BackendError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if stored.tokens.access_token == REVOKED_TOKEN {
            return Err(BackendError::InvalidCredentials);
        }
        self.adopt(stored.clone());
        Ok(stored)
    }

    async fn refresh_session_if_expired(&self) -> Result<bool, BackendError> {
        self.check_online()?;
        self.rotate_if_expired()
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(None)
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>, BackendError> {
        self.artist_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.artist_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_online()?;
        self.rotate_if_expired()?;
        Ok(self.artist_row(id))
    }

    async fn create_artist(&self, new: NewArtist) -> Result<Artist, BackendError> {
        self.check_online()?;
        self.rotate_if_expired()?;
        if self.fail_create_artist.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 403,
                message: "new row violates row-level security policy".into(),
            });
        }
        let row = Artist {
            id: new.id,
            created_at: Some("2026-01-01T00:00:00Z".into()),
            name: Some(new.name),
            email: Some(new.email),
            phone_num: new.phone_num,
            user_id: Some(new.user_id),
            dob: None,
            bio: Some(new.bio),
            is_verified: Some(false),
        };
        self.put_artist(row.clone());
        Ok(row)
    }

    async fn update_artist(&self, id: &str, update: ArtistUpdate) -> Result<Artist, BackendError> {
        self.check_online()?;
        self.rotate_if_expired()?;
        let mut artists = self.artists.lock().unwrap();
        let row = artists
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("artist {id}")))?;
        row.name = Some(update.name);
        row.bio = update.bio;
        row.email = update.email;
        row.phone_num = update.phone_num;
        Ok(row.clone())
    }

    async fn list_artists(&self, filter: ArtistFilter) -> Result<Vec<Artist>, BackendError> {
        self.check_online()?;
        self.rotate_if_expired()?;
        let mut rows: Vec<Artist> = self
            .artists
            .lock()
            .unwrap()
            .values()
            .filter(|a| !filter.verified_only || a.is_verified == Some(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn account(&self, _user_id: &str) -> Result<Option<AccountRow>, BackendError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Play(String),
    Pause(String),
    SetMuted(String, bool),
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub calls: Arc<Mutex<Vec<SinkCall>>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: SinkCall) -> Result<(), PlaybackSinkError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(PlaybackSinkError::MediaUnavailable {
                reason: "decoder lost".into(),
            });
        }
        Ok(())
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&self, item_id: String) -> Result<(), PlaybackSinkError> {
        self.record(SinkCall::Play(item_id))
    }

    fn pause(&self, item_id: String) -> Result<(), PlaybackSinkError> {
        self.record(SinkCall::Pause(item_id))
    }

    fn set_muted(&self, item_id: String, muted: bool) -> Result<(), PlaybackSinkError> {
        self.record(SinkCall::SetMuted(item_id, muted))
    }
}
