use crate::backend::{AccountRow, Artist};

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub busy: BusyState,
    pub router: Router,
    pub toast: Option<String>,
    pub profile: Option<Profile>,
    pub account: Option<AccountProfile>,
    pub search: SearchState,
    pub feed: FeedState,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            busy: BusyState::idle(),
            router: Router {
                default_screen: Screen::Login,
                screen_stack: vec![],
            },
            toast: None,
            profile: None,
            account: None,
            search: SearchState::default(),
            feed: FeedState::default(),
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn {
        user_id: String,
        email: Option<String>,
    },
}

impl AuthState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::LoggedIn { user_id, .. } => Some(user_id),
            AuthState::LoggedOut => None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub signing_in: bool,
    pub signing_up: bool,
    pub restoring_session: bool,
    pub saving_profile: bool,
    pub loading_artists: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            signing_in: false,
            signing_up: false,
            restoring_session: false,
            saving_profile: false,
            loading_artists: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    Login,
    SignUp,
    Feed,
    Search,
    Profile,
    Artist { artist_id: String },
}

/// The signed-in artist's editable record, keyed by the session user id.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    /// Public handle (`Artist.user_id`).
    pub handle: Option<String>,
    pub name: String,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub is_verified: bool,
}

impl From<&Artist> for Profile {
    fn from(a: &Artist) -> Self {
        Self {
            id: a.id.clone(),
            handle: a.user_id.clone(),
            name: a.name.clone().unwrap_or_default(),
            bio: a.bio.clone(),
            email: a.email.clone(),
            phone: a.phone_num.map(|n| n.to_string()),
            dob: a.dob.clone(),
            is_verified: a.is_verified.unwrap_or(false),
        }
    }
}

/// Row of the auxiliary `profiles` table, when the project provisions one.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<AccountRow> for AccountProfile {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            full_name: r.full_name,
            avatar_url: r.avatar_url,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub is_verified: bool,
}

impl From<&Artist> for ArtistSummary {
    fn from(a: &Artist) -> Self {
        Self {
            id: a.id.clone(),
            name: a.name.clone().unwrap_or_default(),
            bio: a.bio.clone(),
            is_verified: a.is_verified.unwrap_or(false),
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub verified_only: bool,
    /// Loaded artists matching `query`, name ascending.
    pub results: Vec<ArtistSummary>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct CreatorSummary {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    pub media_url: String,
    pub creator: CreatorSummary,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub item_id: String,
    pub muted: bool,
    pub playing: bool,
    pub held_down: bool,
    pub last_tap_timestamp_ms: Option<u64>,
}

#[derive(uniffi::Record, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedState {
    pub items: Vec<FeedItem>,
    pub active_index: Option<u32>,
    pub playback: Vec<PlaybackSnapshot>,
}
