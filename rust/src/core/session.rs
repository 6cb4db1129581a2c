// Session lifecycle: sign-in/up/out, stored-session restore and the auth subscription.

use tokio::sync::broadcast::error::RecvError;

use super::*;
use crate::backend::{AuthEvent, AuthSession, BackendError, NewArtist, SignUpRequest};
use crate::session_store::SESSION_KEY;
use crate::updates::SignUpOutcome;

const MAX_PHONE_DIGITS: usize = 15;

/// Identifies the session a fetch was started under. Results carrying an old
/// ticket are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub user_id: String,
    pub epoch: u64,
}

pub(super) struct ActiveSession {
    pub ticket: SessionTicket,
    pub session: AuthSession,
}

/// The single forwarder from gateway auth notifications into the actor.
/// Dropping it unsubscribes.
pub(super) struct AuthSubscription {
    forwarder: tokio::task::JoinHandle<()>,
}

impl AuthSubscription {
    fn is_live(&self) -> bool {
        !self.forwarder.is_finished()
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

pub(super) struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) struct ValidSignUp {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub phone_num: i64,
    pub handle: String,
}

/// Digits only; spaces, dashes and a leading `+` are accepted and stripped.
pub(super) fn parse_phone(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    let body = raw.strip_prefix('+').unwrap_or(raw);
    let digits: String = body.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number can only contain digits".to_string());
    }
    if digits.len() > MAX_PHONE_DIGITS {
        return Err("Phone number is too long".to_string());
    }
    digits
        .parse::<i64>()
        .map_err(|_| "Phone number can only contain digits".to_string())
}

/// Public handle derived from the email's local part.
pub(super) fn handle_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

pub(super) fn validate_sign_up(form: &SignUpForm) -> Result<ValidSignUp, String> {
    let email = form.email.trim();
    let name = form.name.trim();
    let phone = form.phone.trim();
    if email.is_empty()
        || form.password.is_empty()
        || form.confirm_password.is_empty()
        || name.is_empty()
        || phone.is_empty()
    {
        return Err("Please fill in all fields".to_string());
    }
    if form.password != form.confirm_password {
        return Err("Passwords do not match".to_string());
    }
    if !email.contains('@') || email.starts_with('@') {
        return Err("Enter a valid email address".to_string());
    }
    let phone_num = parse_phone(phone)?;
    Ok(ValidSignUp {
        email: email.to_string(),
        password: form.password.clone(),
        name: name.to_string(),
        phone: phone.to_string(),
        phone_num,
        handle: handle_from_email(email),
    })
}

/// Identity first, then the Artist row. A failing row insert does not undo the identity.
async fn run_sign_up(
    backend: Arc<dyn Backend>,
    form: ValidSignUp,
) -> Result<SignUpOutcome, BackendError> {
    let resp = backend
        .sign_up(SignUpRequest {
            email: form.email.clone(),
            password: form.password,
            name: form.name.clone(),
            phone: form.phone,
        })
        .await?;
    let user_id = resp.user.id.clone();

    let artist = NewArtist {
        id: user_id.clone(),
        bio: format!("Artist profile for {}", form.name),
        name: form.name,
        email: form.email,
        user_id: form.handle,
        phone_num: Some(form.phone_num),
    };
    let profile_error = match backend.create_artist(artist).await {
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(%e, user_id = %user_id, "sign up: artist row insert failed");
            Some(e)
        }
    };

    Ok(SignUpOutcome {
        user_id,
        signed_in: resp.session.is_some(),
        profile_error,
    })
}

/// Whether the backend refused the stored credentials (as opposed to being unreachable).
impl AppCore {
    pub(super) fn ensure_auth_subscription(&mut self) {
        if self.auth_subscription.as_ref().is_some_and(|s| s.is_live()) {
            return;
        }
        let mut rx = self.backend.auth_events();
        let tx = self.core_sender.clone();
        let forwarder = self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let msg = CoreMsg::Internal(Box::new(InternalEvent::AuthStateChanged(event)));
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "auth events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        tracing::info!("auth: subscribed to state changes");
        self.auth_subscription = Some(AuthSubscription { forwarder });
    }

    pub(super) fn current_ticket(&self) -> Option<SessionTicket> {
        self.session.as_ref().map(|s| s.ticket.clone())
    }

    pub(super) fn ticket_is_current(&self, ticket: &SessionTicket) -> bool {
        self.session.as_ref().map(|s| &s.ticket) == Some(ticket)
    }

    pub(super) fn sign_in(&mut self, email: String, password: String) {
        let email = email.trim().to_string();
        if email.is_empty() || password.is_empty() {
            self.toast("Enter your email and password");
            return;
        }
        self.set_busy(|b| b.signing_in = true);
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend
                .sign_in_with_password(&email, &password)
                .await
                .map(|_| ());
            InternalEvent::SignInFinished { result }
        });
    }

    pub(super) fn handle_sign_in_finished(&mut self, result: Result<(), BackendError>) {
        self.set_busy(|b| b.signing_in = false);
        if let Err(e) = result {
            tracing::warn!(%e, kind = ?e.auth_kind(), "sign in failed");
            self.toast(e.user_message());
        }
    }

    pub(super) fn sign_up(&mut self, form: SignUpForm) {
        let valid = match validate_sign_up(&form) {
            Ok(v) => v,
            Err(msg) => {
                self.toast(msg);
                return;
            }
        };
        self.set_busy(|b| b.signing_up = true);
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = run_sign_up(backend, valid).await;
            InternalEvent::SignUpFinished { result }
        });
    }

    pub(super) fn handle_sign_up_finished(&mut self, result: Result<SignUpOutcome, BackendError>) {
        self.set_busy(|b| b.signing_up = false);
        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(%e, "sign up failed");
                self.toast(e.user_message());
                return;
            }
        };
        tracing::info!(
            user_id = %outcome.user_id,
            signed_in = outcome.signed_in,
            profile_ok = outcome.profile_error.is_none(),
            "sign up finished"
        );
        if let Some(e) = outcome.profile_error {
            // The identity exists and stays signed in; only the artist row is missing.
            self.toast(format!(
                "Account created, but your artist profile could not be saved: {}",
                e.user_message()
            ));
        } else if !outcome.signed_in {
            self.toast("Account created. Confirm your email, then sign in.");
        }
        // SIGNED_IN may have been handled before the row existed.
        if self.session.as_ref().map(|s| s.ticket.user_id.as_str()) == Some(outcome.user_id.as_str())
        {
            self.refresh_profile();
        }
    }

    pub(super) fn sign_out(&mut self) {
        // Local state goes first; the revoke runs best-effort.
        self.end_session();
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.sign_out().await;
            InternalEvent::SignOutFinished { result }
        });
    }

    pub(super) fn handle_auth_event(&mut self, event: AuthEvent) {
        tracing::info!(event = event.tag(), "auth state changed");
        match event {
            AuthEvent::SignedIn(session) => self.begin_session(session),
            AuthEvent::SignedOut => self.end_session(),
        }
    }

    fn begin_session(&mut self, session: AuthSession) {
        let same_user = self
            .session
            .as_ref()
            .is_some_and(|s| s.session.user.id == session.user.id);
        if same_user {
            // Token rotation: the identity is unchanged, so in-flight work stays current.
            tracing::debug!(user_id = %session.user.id, "session tokens rotated");
            self.persist_session(&session);
            if let Some(active) = self.session.as_mut() {
                active.session = session;
            }
            let auth = self.logged_in_state();
            if auth != self.state.auth {
                self.state.auth = auth;
                self.emit_state();
            }
            return;
        }

        self.session_epoch = self.session_epoch.wrapping_add(1);
        let ticket = SessionTicket {
            user_id: session.user.id.clone(),
            epoch: self.session_epoch,
        };
        self.persist_session(&session);
        self.session = Some(ActiveSession {
            ticket: ticket.clone(),
            session,
        });
        self.state.auth = self.logged_in_state();
        self.state.profile = None;
        self.state.account = None;
        self.handle_auth_transition(true);
        self.fetch_profile(ticket.clone());
        self.fetch_account(ticket);
    }

    /// Idempotent; a second SIGNED_OUT only bumps the epoch.
    fn end_session(&mut self) {
        self.session_epoch = self.session_epoch.wrapping_add(1);
        if let Err(e) = self.session_store.delete(SESSION_KEY) {
            tracing::warn!(err = format!("{e:#}"), "session store: delete failed");
        }
        let had_session = self.session.take().is_some();
        if had_session || self.state.auth != AuthState::LoggedOut {
            self.state.auth = AuthState::LoggedOut;
            self.handle_auth_transition(false);
        }
    }

    fn persist_session(&self, session: &AuthSession) {
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%e, "session store: encode failed");
                return;
            }
        };
        if let Err(e) = self.session_store.set(SESSION_KEY, &raw) {
            tracing::warn!(err = format!("{e:#}"), "session store: write failed");
        }
    }

    pub(super) fn restore_stored_session(&mut self, user_initiated: bool) {
        if self.is_logged_in() || self.state.busy.restoring_session {
            return;
        }
        let raw = match self.session_store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                if user_initiated {
                    self.toast("No saved session. Please sign in.");
                }
                return;
            }
            Err(e) => {
                tracing::warn!(err = format!("{e:#}"), "session store: read failed");
                return;
            }
        };
        let stored: AuthSession = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%e, "session store: discarding unreadable session");
                if let Err(e) = self.session_store.delete(SESSION_KEY) {
                    tracing::warn!(err = format!("{e:#}"), "session store: delete failed");
                }
                return;
            }
        };

        tracing::info!(user_id = %stored.user.id, "restoring stored session");
        self.set_busy(|b| b.restoring_session = true);
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.restore_session(stored).await.map(|_| ());
            InternalEvent::SessionRestoreFinished {
                user_initiated,
                result,
            }
        });
    }

    /// Foreground check of a live session's access token.
    pub(super) fn refresh_session_if_expired(&mut self) {
        let Some(ticket) = self.current_ticket() else {
            return;
        };
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.refresh_session_if_expired().await;
            InternalEvent::SessionRefreshFinished { ticket, result }
        });
    }

    pub(super) fn handle_session_refresh_finished(
        &mut self,
        ticket: SessionTicket,
        result: Result<bool, BackendError>,
    ) {
        match result {
            Ok(refreshed) => {
                tracing::debug!(refreshed, "session refresh check done");
            }
            Err(e) if e.is_auth_rejection() => {
                // The gateway's SignedOut usually lands first; only a newer session wins.
                if self.session.is_some() && !self.ticket_is_current(&ticket) {
                    return;
                }
                tracing::info!(%e, "session refresh rejected, signing out");
                self.end_session();
                self.toast("Your session expired. Please sign in again.");
            }
            Err(e) => {
                // The next foreground or table call tries again.
                tracing::warn!(%e, "session refresh failed");
            }
        }
    }

    pub(super) fn handle_restore_finished(
        &mut self,
        user_initiated: bool,
        result: Result<(), BackendError>,
    ) {
        self.set_busy(|b| b.restoring_session = false);
        let Err(e) = result else {
            return;
        };
        if e.is_auth_rejection() {
            tracing::info!(%e, "stored session rejected, clearing it");
            if let Err(e) = self.session_store.delete(SESSION_KEY) {
                tracing::warn!(err = format!("{e:#}"), "session store: delete failed");
            }
            if user_initiated {
                self.toast("Your session expired. Please sign in again.");
            }
        } else {
            // Keep the stored session for a later attempt.
            tracing::warn!(%e, "session restore failed");
            if user_initiated {
                self.toast(e.user_message());
            }
        }
    }
}
