mod artists;
mod config;
mod feed;
mod profile;
mod session;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::backend::{Artist, Backend};
use crate::feed::FeedController;
use crate::session_store::SessionStore;
use crate::state::{AuthState, BusyState, Screen};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::SharedPlaybackSink;

pub use config::{load_app_config, AppConfig};
pub use session::SessionTicket;

use session::{ActiveSession, AuthSubscription};

const TOAST_DISMISS_AFTER: Duration = Duration::from_secs(3);

pub struct AppCore {
    pub state: crate::state::AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<crate::state::AppState>>,
    playback_sink: SharedPlaybackSink,

    backend: Arc<dyn Backend>,
    session_store: SessionStore,

    // Declared before `runtime` so the forwarder is aborted while the runtime is alive.
    auth_subscription: Option<AuthSubscription>,
    session: Option<ActiveSession>,
    session_epoch: u64,

    // Unfiltered result of the last listing; `state.search.results` is the filtered view.
    artists: Vec<Artist>,
    artists_request_token: u64,

    feed: FeedController,
    toast_dismiss_token: u64,

    runtime: tokio::runtime::Runtime,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        shared_state: Arc<RwLock<crate::state::AppState>>,
        playback_sink: SharedPlaybackSink,
        config: AppConfig,
        backend: Arc<dyn Backend>,
        session_store: SessionStore,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let feed = FeedController::new(config.gesture_config());

        let mut this = Self {
            state: crate::state::AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            playback_sink,
            backend,
            session_store,
            auth_subscription: None,
            session: None,
            session_epoch: 0,
            artists: vec![],
            artists_request_token: 0,
            feed,
            toast_dismiss_token: 0,
            runtime,
        };

        // Subscribe before restoring so the restore's SIGNED_IN is not missed.
        this.ensure_auth_subscription();
        this.restore_stored_session(false);

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &crate::state::AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(msg = %msg, "toast");
        self.state.toast = Some(msg);
        self.toast_dismiss_token = self.toast_dismiss_token.saturating_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(TOAST_DISMISS_AFTER).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ToastAutoDismiss { token },
            )));
        });
    }

    /// Run `fut` on the runtime and feed its result back into the actor.
    fn spawn_internal<F>(&self, fut: F)
    where
        F: std::future::Future<Output = InternalEvent> + Send + 'static,
    {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let ev = fut.await;
            let _ = tx.send(CoreMsg::Internal(Box::new(ev)));
        });
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn push_screen(&mut self, screen: Screen) {
        if self.state.router.screen_stack.last() != Some(&screen) {
            self.state.router.screen_stack.push(screen);
        }
    }

    fn handle_auth_transition(&mut self, logged_in: bool) {
        if logged_in {
            self.state.router.default_screen = Screen::Feed;
            self.state.router.screen_stack.clear();
        } else {
            self.state.router.default_screen = Screen::Login;
            self.state.router.screen_stack.clear();
            self.state.profile = None;
            self.state.account = None;
            self.state.busy = BusyState::idle();
            let cmds = self.feed.load(vec![]);
            self.apply_feed_commands(cmds);
        }
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain passwords.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::AuthStateChanged(event) => self.handle_auth_event(event),
            InternalEvent::SignInFinished { result } => self.handle_sign_in_finished(result),
            InternalEvent::SignUpFinished { result } => self.handle_sign_up_finished(result),
            InternalEvent::SignOutFinished { result } => {
                if let Err(e) = result {
                    // Local state is already cleared at this point.
                    tracing::warn!(%e, "sign out: token revoke failed");
                }
            }
            InternalEvent::SessionRestoreFinished {
                user_initiated,
                result,
            } => self.handle_restore_finished(user_initiated, result),
            InternalEvent::SessionRefreshFinished { ticket, result } => {
                self.handle_session_refresh_finished(ticket, result)
            }
            InternalEvent::ProfileFetched { ticket, result } => {
                self.handle_profile_fetched(ticket, result)
            }
            InternalEvent::AccountFetched { ticket, result } => {
                self.handle_account_fetched(ticket, result)
            }
            InternalEvent::ProfileSaved { ticket, result } => {
                self.handle_profile_saved(ticket, result)
            }
            InternalEvent::ArtistsFetched { token, result } => {
                self.handle_artists_fetched(token, result)
            }
            InternalEvent::FeedTimerFired { index, token } => {
                let cmds = self.feed.timer_fired(index, token);
                if !cmds.is_empty() {
                    self.apply_feed_commands(cmds);
                    self.emit_state();
                }
            }
            InternalEvent::ToastAutoDismiss { token } => self.handle_toast_auto_dismiss(token),
        }
    }

    fn handle_toast_auto_dismiss(&mut self, token: u64) {
        if token != self.toast_dismiss_token {
            return;
        }
        if self.state.toast.is_some() {
            self.state.toast = None;
            self.emit_state();
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Auth
            AppAction::SignIn { email, password } => self.sign_in(email, password),
            AppAction::SignUp {
                email,
                password,
                confirm_password,
                name,
                phone,
            } => self.sign_up(session::SignUpForm {
                email,
                password,
                confirm_password,
                name,
                phone,
            }),
            AppAction::SignOut => self.sign_out(),
            AppAction::RestoreSession => self.restore_stored_session(true),

            // Profile
            AppAction::RefreshProfile => self.refresh_profile(),
            AppAction::SaveProfile {
                name,
                bio,
                email,
                phone,
            } => self.save_profile(profile::ProfileForm {
                name,
                bio,
                email,
                phone,
            }),

            // Search
            AppAction::LoadArtists { verified_only } => self.load_artists(verified_only),
            AppAction::SetArtistQuery { query } => self.set_artist_query(query),

            // Navigation
            AppAction::PushScreen { screen } => {
                self.push_screen(screen);
                self.emit_state();
            }
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.emit_state();
            }

            // Feed
            AppAction::LoadFeed { items } => {
                let cmds = self.feed.load(items);
                self.apply_feed_commands(cmds);
                self.emit_state();
            }
            AppAction::FeedPressIn { index, at_ms } => {
                let cmds = self.feed.press_in(index as usize, at_ms);
                self.apply_feed_commands(cmds);
                self.emit_state();
            }
            AppAction::FeedPressOut { index, at_ms } => {
                let cmds = self.feed.press_out(index as usize, at_ms);
                self.apply_feed_commands(cmds);
                self.emit_state();
            }
            AppAction::FeedActiveIndexChanged { index } => {
                let cmds = self.feed.set_active_index(index as usize);
                self.apply_feed_commands(cmds);
                self.emit_state();
            }
            AppAction::FeedScreenFocused => {
                let cmds = self.feed.focus();
                self.apply_feed_commands(cmds);
                self.emit_state();
            }
            AppAction::FeedScreenBlurred => {
                let cmds = self.feed.blur();
                self.apply_feed_commands(cmds);
                self.emit_state();
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }

            // Lifecycle
            AppAction::Foregrounded => {
                self.ensure_auth_subscription();
                if self.is_logged_in() {
                    self.refresh_session_if_expired();
                } else if !self.state.busy.restoring_session {
                    self.restore_stored_session(false);
                }
            }
        }
    }

    fn logged_in_state(&self) -> AuthState {
        match &self.session {
            Some(s) => AuthState::LoggedIn {
                user_id: s.session.user.id.clone(),
                email: s.session.user.email.clone(),
            },
            None => AuthState::LoggedOut,
        }
    }
}
