use crate::backend::{AccountRow, Artist, AuthEvent, BackendError};
use crate::core::SessionTicket;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    /// Primary update stream: always send a full state snapshot.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Outcome of the sign-up flow once the identity exists.
#[derive(Debug)]
pub struct SignUpOutcome {
    pub user_id: String,
    /// False when the project requires email confirmation before the first sign-in.
    pub signed_in: bool,
    /// Artist row creation failed after the identity was created.
    pub profile_error: Option<BackendError>,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Gateway auth notifications (authoritative for session state).
    AuthStateChanged(AuthEvent),

    // Direct call results: busy flags + error reporting only.
    SignInFinished {
        result: Result<(), BackendError>,
    },
    SignUpFinished {
        result: Result<SignUpOutcome, BackendError>,
    },
    SignOutFinished {
        result: Result<(), BackendError>,
    },
    SessionRestoreFinished {
        user_initiated: bool,
        result: Result<(), BackendError>,
    },
    SessionRefreshFinished {
        ticket: SessionTicket,
        result: Result<bool, BackendError>,
    },

    // Ticketed fetches; dropped when the session moved on.
    ProfileFetched {
        ticket: SessionTicket,
        result: Result<Option<Artist>, BackendError>,
    },
    AccountFetched {
        ticket: SessionTicket,
        result: Result<Option<AccountRow>, BackendError>,
    },
    ProfileSaved {
        ticket: SessionTicket,
        result: Result<(), BackendError>,
    },

    ArtistsFetched {
        token: u64,
        result: Result<Vec<Artist>, BackendError>,
    },

    // Timers.
    FeedTimerFired {
        index: usize,
        token: u64,
    },
    ToastAutoDismiss {
        token: u64,
    },
}
