// Signed-in artist profile: fetch, save, and the optional `profiles` row.

use super::session::parse_phone;
use super::*;
use crate::backend::{AccountRow, ArtistUpdate, BackendError};
use crate::state::{AccountProfile, Profile};

pub(super) struct ProfileForm {
    pub name: String,
    pub bio: String,
    pub email: String,
    pub phone: String,
}

/// Blank optional fields clear the column.
pub(super) fn validate_profile(form: &ProfileForm) -> Result<ArtistUpdate, String> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    let email = form.email.trim();
    if !email.is_empty() && (!email.contains('@') || email.starts_with('@')) {
        return Err("Enter a valid email address".to_string());
    }
    let phone = form.phone.trim();
    let phone_num = if phone.is_empty() {
        None
    } else {
        Some(parse_phone(phone)?)
    };
    let bio = form.bio.trim();
    Ok(ArtistUpdate {
        name: name.to_string(),
        bio: (!bio.is_empty()).then(|| bio.to_string()),
        email: (!email.is_empty()).then(|| email.to_string()),
        phone_num,
    })
}

impl AppCore {
    /// No-op without a session.
    pub(super) fn refresh_profile(&mut self) {
        let Some(ticket) = self.current_ticket() else {
            tracing::debug!("refresh_profile: no session");
            return;
        };
        self.fetch_profile(ticket.clone());
        self.fetch_account(ticket);
    }

    pub(super) fn fetch_profile(&self, ticket: SessionTicket) {
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.artist(&ticket.user_id).await;
            InternalEvent::ProfileFetched { ticket, result }
        });
    }

    pub(super) fn fetch_account(&self, ticket: SessionTicket) {
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.account(&ticket.user_id).await;
            InternalEvent::AccountFetched { ticket, result }
        });
    }

    pub(super) fn handle_profile_fetched(
        &mut self,
        ticket: SessionTicket,
        result: Result<Option<Artist>, BackendError>,
    ) {
        if !self.ticket_is_current(&ticket) {
            tracing::debug!(user_id = %ticket.user_id, epoch = ticket.epoch, "dropping stale profile fetch");
            return;
        }
        match result {
            Ok(artist) => {
                if artist.is_none() {
                    tracing::info!(user_id = %ticket.user_id, "no artist row for user");
                }
                self.state.profile = artist.as_ref().map(Profile::from);
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%e, "profile fetch failed");
                self.toast(format!("Could not load profile: {}", e.user_message()));
            }
        }
    }

    pub(super) fn handle_account_fetched(
        &mut self,
        ticket: SessionTicket,
        result: Result<Option<AccountRow>, BackendError>,
    ) {
        if !self.ticket_is_current(&ticket) {
            return;
        }
        match result {
            Ok(row) => {
                let next = row.map(AccountProfile::from);
                if next != self.state.account {
                    self.state.account = next;
                    self.emit_state();
                }
            }
            // Not every project provisions `profiles`; treat it as optional.
            Err(e) => tracing::debug!(%e, "account row fetch failed"),
        }
    }

    pub(super) fn save_profile(&mut self, form: ProfileForm) {
        let Some(ticket) = self.current_ticket() else {
            self.toast("Sign in to edit your profile");
            return;
        };
        let update = match validate_profile(&form) {
            Ok(u) => u,
            Err(msg) => {
                self.toast(msg);
                return;
            }
        };
        self.set_busy(|b| b.saving_profile = true);
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend
                .update_artist(&ticket.user_id, update)
                .await
                .map(|_| ());
            InternalEvent::ProfileSaved { ticket, result }
        });
    }

    pub(super) fn handle_profile_saved(
        &mut self,
        ticket: SessionTicket,
        result: Result<(), BackendError>,
    ) {
        self.set_busy(|b| b.saving_profile = false);
        if !self.ticket_is_current(&ticket) {
            return;
        }
        match result {
            Ok(()) => {
                self.toast("Profile updated");
                // Re-read rather than merging the form into local state.
                self.fetch_profile(ticket);
            }
            Err(e) => {
                tracing::warn!(%e, "profile save failed");
                self.toast(format!("Could not save profile: {}", e.user_message()));
            }
        }
    }
}
