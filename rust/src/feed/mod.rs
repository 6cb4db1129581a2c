//! Feed of fixed items, one of which is active at a time.
//!
//! Wraps an [`ItemPlayback`] per item and routes the viewport tracker's
//! active index plus screen focus into per-item transitions. Commands come
//! back tagged with the item index they apply to; sink commands also carry the
//! item id, since a reload replaces the entries before they are applied.

pub mod gesture;

use crate::state::{FeedItem, FeedState, PlaybackSnapshot};

use gesture::{GestureConfig, ItemCommand, ItemPlayback, PlaybackState, TimerTokens};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    Play { index: usize, item_id: String },
    Pause { index: usize, item_id: String },
    SetMuted { index: usize, item_id: String, muted: bool },
    DoubleTap { index: usize },
    StartTimer { index: usize, token: u64, delay_ms: u64 },
}

impl FeedCommand {
    fn from_item(index: usize, item_id: &str, cmd: ItemCommand) -> Self {
        let item_id = item_id.to_string();
        match cmd {
            ItemCommand::Play => FeedCommand::Play { index, item_id },
            ItemCommand::Pause => FeedCommand::Pause { index, item_id },
            ItemCommand::SetMuted(muted) => FeedCommand::SetMuted {
                index,
                item_id,
                muted,
            },
            ItemCommand::DoubleTap => FeedCommand::DoubleTap { index },
            ItemCommand::StartTimer { token, delay_ms } => FeedCommand::StartTimer {
                index,
                token,
                delay_ms,
            },
        }
    }
}

struct Entry {
    item: FeedItem,
    playback: ItemPlayback,
}

pub struct FeedController {
    config: GestureConfig,
    entries: Vec<Entry>,
    active_index: Option<usize>,
    focused: bool,
    tokens: TimerTokens,
}

fn tagged(index: usize, item: &FeedItem, cmds: Vec<ItemCommand>) -> Vec<FeedCommand> {
    cmds.into_iter()
        .map(|c| FeedCommand::from_item(index, &item.id, c))
        .collect()
}

impl FeedController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            active_index: None,
            focused: true,
            tokens: TimerTokens::default(),
        }
    }

    /// Replace the feed. Whatever was playing is paused; the first item becomes active.
    ///
    /// Timer tokens keep counting across loads, so timers started for the old
    /// items can never match a new one.
    pub fn load(&mut self, items: Vec<FeedItem>) -> Vec<FeedCommand> {
        let mut out = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.playback.state().playing {
                out.push(FeedCommand::Pause {
                    index,
                    item_id: entry.item.id.clone(),
                });
            }
        }
        self.entries = items
            .into_iter()
            .map(|item| Entry {
                item,
                playback: ItemPlayback::default(),
            })
            .collect();
        self.active_index = None;
        if !self.entries.is_empty() {
            out.extend(self.set_active_index(0));
        }
        out
    }

    pub fn press_in(&mut self, index: usize, at_ms: u64) -> Vec<FeedCommand> {
        let Some(entry) = self.entries.get_mut(index) else {
            tracing::warn!(index, "feed: press_in for unknown item");
            return vec![];
        };
        let cmds = entry.playback.press_in(at_ms, &self.config, &mut self.tokens);
        tagged(index, &entry.item, cmds)
    }

    pub fn press_out(&mut self, index: usize, at_ms: u64) -> Vec<FeedCommand> {
        let Some(entry) = self.entries.get_mut(index) else {
            tracing::warn!(index, "feed: press_out for unknown item");
            return vec![];
        };
        let cmds = entry
            .playback
            .press_out(at_ms, self.focused, &self.config, &mut self.tokens);
        tagged(index, &entry.item, cmds)
    }

    pub fn timer_fired(&mut self, index: usize, token: u64) -> Vec<FeedCommand> {
        let Some(entry) = self.entries.get_mut(index) else {
            // Feed was replaced while the timer was pending.
            return vec![];
        };
        let cmds = entry.playback.timer_fired(token);
        tagged(index, &entry.item, cmds)
    }

    /// Viewport tracker verdict. Every other item is deactivated before the new one starts.
    pub fn set_active_index(&mut self, index: usize) -> Vec<FeedCommand> {
        if index >= self.entries.len() {
            tracing::warn!(
                index,
                len = self.entries.len(),
                "feed: active index out of range"
            );
            return vec![];
        }
        let mut out = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i != index {
                let cmds = entry.playback.set_active(false, self.focused);
                out.extend(tagged(i, &entry.item, cmds));
            }
        }
        self.active_index = Some(index);
        let focused = self.focused;
        let entry = &mut self.entries[index];
        let cmds = entry.playback.set_active(true, focused);
        out.extend(tagged(index, &entry.item, cmds));
        out
    }

    /// Feed screen went out of view.
    pub fn blur(&mut self) -> Vec<FeedCommand> {
        self.focused = false;
        let mut out = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let cmds = entry.playback.suspend();
            out.extend(tagged(i, &entry.item, cmds));
        }
        out
    }

    pub fn focus(&mut self) -> Vec<FeedCommand> {
        self.focused = true;
        let Some(index) = self.active_index else {
            return vec![];
        };
        let entry = &mut self.entries[index];
        let cmds = entry.playback.set_active(true, true);
        tagged(index, &entry.item, cmds)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&FeedItem> {
        self.entries.get(index).map(|e| &e.item)
    }

    pub fn playback(&self, index: usize) -> Option<PlaybackState> {
        self.entries.get(index).map(|e| e.playback.state())
    }

    pub fn snapshot(&self) -> FeedState {
        FeedState {
            items: self.entries.iter().map(|e| e.item.clone()).collect(),
            active_index: self.active_index.map(|i| i as u32),
            playback: self
                .entries
                .iter()
                .map(|e| {
                    let s = e.playback.state();
                    PlaybackSnapshot {
                        item_id: e.item.id.clone(),
                        muted: s.muted,
                        playing: s.playing,
                        held_down: s.held_down,
                        last_tap_timestamp_ms: s.last_tap_timestamp_ms,
                    }
                })
                .collect(),
        }
    }
}
