use crate::state::{FeedItem, Screen};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Auth
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        confirm_password: String,
        name: String,
        phone: String,
    },
    SignOut,
    RestoreSession,

    // Profile
    RefreshProfile,
    SaveProfile {
        name: String,
        bio: String,
        email: String,
        phone: String,
    },

    // Search
    LoadArtists {
        verified_only: bool,
    },
    SetArtistQuery {
        query: String,
    },

    // Navigation
    PushScreen {
        screen: Screen,
    },
    UpdateScreenStack {
        stack: Vec<Screen>,
    },

    // Feed
    LoadFeed {
        items: Vec<FeedItem>,
    },
    FeedPressIn {
        index: u32,
        at_ms: u64,
    },
    FeedPressOut {
        index: u32,
        at_ms: u64,
    },
    FeedActiveIndexChanged {
        index: u32,
    },
    FeedScreenFocused,
    FeedScreenBlurred,

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes passwords).
    pub fn tag(&self) -> &'static str {
        match self {
            // Auth
            AppAction::SignIn { .. } => "SignIn",
            AppAction::SignUp { .. } => "SignUp",
            AppAction::SignOut => "SignOut",
            AppAction::RestoreSession => "RestoreSession",

            // Profile
            AppAction::RefreshProfile => "RefreshProfile",
            AppAction::SaveProfile { .. } => "SaveProfile",

            // Search
            AppAction::LoadArtists { .. } => "LoadArtists",
            AppAction::SetArtistQuery { .. } => "SetArtistQuery",

            // Navigation
            AppAction::PushScreen { .. } => "PushScreen",
            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",

            // Feed
            AppAction::LoadFeed { .. } => "LoadFeed",
            AppAction::FeedPressIn { .. } => "FeedPressIn",
            AppAction::FeedPressOut { .. } => "FeedPressOut",
            AppAction::FeedActiveIndexChanged { .. } => "FeedActiveIndexChanged",
            AppAction::FeedScreenFocused => "FeedScreenFocused",
            AppAction::FeedScreenBlurred => "FeedScreenBlurred",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
