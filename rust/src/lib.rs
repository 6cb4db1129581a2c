mod actions;
pub mod backend;
mod core;
pub mod feed;
mod logging;
pub mod session_store;
mod state;
mod updates;

#[cfg(target_os = "android")]
mod android_keyring;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

use crate::backend::{Backend, SupabaseBackend};
use crate::session_store::SessionStore;

pub use actions::AppAction;
pub use state::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PlaybackSinkError {
    #[error("media unavailable: {reason}")]
    MediaUnavailable { reason: String },
    #[error("playback sink callback failed: {reason}")]
    Callback { reason: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PlaybackSinkError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        PlaybackSinkError::Callback { reason: e.reason }
    }
}

/// The host's video surfaces. Commands are fire-and-forget; errors are only logged.
#[uniffi::export(callback_interface)]
pub trait PlaybackSink: Send + Sync + 'static {
    fn play(&self, item_id: String) -> Result<(), PlaybackSinkError>;
    fn pause(&self, item_id: String) -> Result<(), PlaybackSinkError>;
    fn set_muted(&self, item_id: String, muted: bool) -> Result<(), PlaybackSinkError>;
}

pub(crate) type SharedPlaybackSink = Arc<RwLock<Option<Arc<dyn PlaybackSink>>>>;

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    playback_sink: SharedPlaybackSink,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String, keychain_group: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let config = crate::core::load_app_config(&data_dir);
        let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(
            config.endpoint(),
            config.request_timeout(),
        ));
        let session_store = SessionStore::open(&data_dir, &keychain_group);
        Self::start(config, backend, session_store)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_playback_sink(&self, sink: Box<dyn PlaybackSink>) {
        let sink: Arc<dyn PlaybackSink> = Arc::from(sink);
        match self.playback_sink.write() {
            Ok(mut slot) => {
                *slot = Some(sink);
            }
            Err(poison) => {
                *poison.into_inner() = Some(sink);
            }
        }
    }
}

impl FfiApp {
    /// Same actor with an injected backend; the session store is the data-dir file.
    pub fn new_with_backend_for_tests(data_dir: String, backend: Arc<dyn Backend>) -> Arc<Self> {
        logging::init_logging(&data_dir);
        let config = crate::core::load_app_config(&data_dir);
        let session_store = SessionStore::file_backed(
            std::path::Path::new(&data_dir).join(session_store::FALLBACK_FILE),
        );
        Self::start(config, backend, session_store)
    }

    fn start(
        config: crate::core::AppConfig,
        backend: Arc<dyn Backend>,
        session_store: SessionStore,
    ) -> Arc<Self> {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let playback_sink: SharedPlaybackSink = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let sink_for_core = playback_sink.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                shared_for_core,
                sink_for_core,
                config,
                backend,
                session_store,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            playback_sink,
        })
    }
}
