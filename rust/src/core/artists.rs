// Artist discovery: listing plus the local name filter.

use super::*;
use crate::backend::{ArtistFilter, BackendError};
use crate::state::ArtistSummary;

/// Case-insensitive substring match on the name; keeps the listing order.
pub(super) fn filter_artists(artists: &[Artist], query: &str) -> Vec<ArtistSummary> {
    let needle = query.trim().to_lowercase();
    artists
        .iter()
        .filter(|a| {
            needle.is_empty()
                || a.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
        })
        .map(ArtistSummary::from)
        .collect()
}

impl AppCore {
    pub(super) fn load_artists(&mut self, verified_only: bool) {
        self.state.search.verified_only = verified_only;
        self.artists_request_token = self.artists_request_token.wrapping_add(1);
        let token = self.artists_request_token;
        if self.state.busy.loading_artists {
            self.emit_state();
        } else {
            self.set_busy(|b| b.loading_artists = true);
        }
        let backend = self.backend.clone();
        self.spawn_internal(async move {
            let result = backend.list_artists(ArtistFilter { verified_only }).await;
            InternalEvent::ArtistsFetched { token, result }
        });
    }

    pub(super) fn handle_artists_fetched(
        &mut self,
        token: u64,
        result: Result<Vec<Artist>, BackendError>,
    ) {
        if token != self.artists_request_token {
            // Superseded by a newer listing request.
            return;
        }
        self.state.busy.loading_artists = false;
        match result {
            Ok(artists) => {
                tracing::info!(count = artists.len(), "artists loaded");
                self.artists = artists;
                self.state.search.results = filter_artists(&self.artists, &self.state.search.query);
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%e, "artist listing failed");
                self.toast(format!("Could not load artists: {}", e.user_message()));
            }
        }
    }

    pub(super) fn set_artist_query(&mut self, query: String) {
        self.state.search.results = filter_artists(&self.artists, &query);
        self.state.search.query = query;
        self.emit_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(id: &str, name: Option<&str>) -> Artist {
        Artist {
            id: id.into(),
            created_at: None,
            name: name.map(Into::into),
            email: None,
            phone_num: None,
            user_id: None,
            dob: None,
            bio: None,
            is_verified: Some(false),
        }
    }

    #[test]
    fn empty_query_keeps_everything_in_order() {
        let list = vec![
            artist("1", Some("Ada")),
            artist("2", None),
            artist("3", Some("Zed")),
        ];
        let ids: Vec<_> = filter_artists(&list, "  ")
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn substring_is_case_insensitive() {
        let list = vec![
            artist("1", Some("Ada Lovelace")),
            artist("2", Some("Grace Hopper")),
            artist("3", None),
        ];
        let hits = filter_artists(&list, "LOVE");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Ada Lovelace");
        assert!(filter_artists(&list, "xyz").is_empty());
    }
}
