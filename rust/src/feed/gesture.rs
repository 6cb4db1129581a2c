//! Touch disambiguation for a single feed item.
//!
//! An item's surface sees press-in/press-out events with monotonic
//! millisecond timestamps. From those it tells apart a single tap (toggle
//! mute), a double tap (creator action) and a long press (pause while held).
//! Nothing here performs I/O: transitions return [`ItemCommand`]s, including
//! timers for the caller to start. A timer is a token; cancelling it just
//! forgets the token so a late firing is ignored.

pub const DEFAULT_DOUBLE_TAP_WINDOW_MS: u64 = 300;
pub const DEFAULT_LONG_PRESS_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub double_tap_window_ms: u64,
    pub long_press_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            double_tap_window_ms: DEFAULT_DOUBLE_TAP_WINDOW_MS,
            long_press_ms: DEFAULT_LONG_PRESS_MS,
        }
    }
}

/// Monotonic source of timer tokens, shared by every item of a feed.
#[derive(Debug, Default)]
pub struct TimerTokens {
    last: u64,
}

impl TimerTokens {
    pub fn next(&mut self) -> u64 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    AwaitingSecondTap,
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCommand {
    Play,
    Pause,
    SetMuted(bool),
    DoubleTap,
    StartTimer { token: u64, delay_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub muted: bool,
    pub playing: bool,
    pub held_down: bool,
    pub last_tap_timestamp_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    down_at_ms: u64,
    long_press_token: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingTap {
    token: u64,
    // Window ran out while a press was down; resolution waits for that press.
    expired: bool,
}

/// Invariants: `held_down` implies `!playing`; `!active` implies `!playing`.
#[derive(Debug, Clone)]
pub struct ItemPlayback {
    muted: bool,
    playing: bool,
    held_down: bool,
    active: bool,
    last_tap_at_ms: Option<u64>,
    pending_tap: Option<PendingTap>,
    press: Option<Press>,
}

impl Default for ItemPlayback {
    fn default() -> Self {
        Self {
            muted: true,
            playing: false,
            held_down: false,
            active: false,
            last_tap_at_ms: None,
            pending_tap: None,
            press: None,
        }
    }
}

impl ItemPlayback {
    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            muted: self.muted,
            playing: self.playing,
            held_down: self.held_down,
            last_tap_timestamp_ms: self.last_tap_at_ms,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        if self.held_down {
            GesturePhase::Held
        } else if self.pending_tap.is_some() {
            GesturePhase::AwaitingSecondTap
        } else {
            GesturePhase::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn press_in(
        &mut self,
        at_ms: u64,
        config: &GestureConfig,
        tokens: &mut TimerTokens,
    ) -> Vec<ItemCommand> {
        if self.held_down {
            // A second contact during a hold does not restart anything.
            return vec![];
        }
        let token = tokens.next();
        self.press = Some(Press {
            down_at_ms: at_ms,
            long_press_token: token,
        });
        vec![ItemCommand::StartTimer {
            token,
            delay_ms: config.long_press_ms,
        }]
    }

    /// `may_resume` is false while the hosting screen is not visible.
    pub fn press_out(
        &mut self,
        at_ms: u64,
        may_resume: bool,
        config: &GestureConfig,
        tokens: &mut TimerTokens,
    ) -> Vec<ItemCommand> {
        let Some(press) = self.press.take() else {
            return vec![];
        };
        if self.held_down {
            return self.release_hold(may_resume);
        }
        if at_ms.saturating_sub(press.down_at_ms) >= config.long_press_ms {
            // Threshold crossed but the timer has not been delivered yet.
            let mut cmds = self.begin_hold();
            cmds.extend(self.release_hold(may_resume));
            return cmds;
        }
        self.complete_tap(at_ms, config, tokens)
    }

    pub fn timer_fired(&mut self, token: u64) -> Vec<ItemCommand> {
        if self.pending_tap.map(|p| p.token) == Some(token) {
            if self.press.is_some() {
                // The ongoing press may still turn into a long press, which cancels the tap.
                if let Some(pending) = self.pending_tap.as_mut() {
                    pending.expired = true;
                }
                return vec![];
            }
            self.pending_tap = None;
            self.last_tap_at_ms = None;
            return self.toggle_mute();
        }
        let is_long_press = self
            .press
            .map(|p| p.long_press_token == token)
            .unwrap_or(false);
        if is_long_press && !self.held_down {
            return self.begin_hold();
        }
        vec![]
    }

    /// Apply the viewport tracker's verdict for this item.
    ///
    /// While held, only the flag is recorded; the release decides whether to
    /// resume based on the latest value.
    pub fn set_active(&mut self, active: bool, may_play: bool) -> Vec<ItemCommand> {
        self.active = active;
        if self.held_down {
            return vec![];
        }
        if active {
            if may_play && !self.playing {
                self.playing = true;
                return vec![ItemCommand::Play];
            }
            return vec![];
        }
        if self.playing {
            self.playing = false;
            return vec![ItemCommand::Pause];
        }
        vec![]
    }

    /// Screen went away: stop playback without touching the active flag.
    pub fn suspend(&mut self) -> Vec<ItemCommand> {
        if self.playing {
            self.playing = false;
            return vec![ItemCommand::Pause];
        }
        vec![]
    }

    fn complete_tap(
        &mut self,
        at_ms: u64,
        config: &GestureConfig,
        tokens: &mut TimerTokens,
    ) -> Vec<ItemCommand> {
        let mut cmds = Vec::new();
        if let Some(pending) = self.pending_tap.take() {
            let first = self.last_tap_at_ms.take().unwrap_or(0);
            if !pending.expired && at_ms.saturating_sub(first) < config.double_tap_window_ms {
                cmds.push(ItemCommand::DoubleTap);
                return cmds;
            }
            // The first tap's window is over: resolve it before starting a new one.
            cmds.extend(self.toggle_mute());
        }
        let token = tokens.next();
        self.last_tap_at_ms = Some(at_ms);
        self.pending_tap = Some(PendingTap {
            token,
            expired: false,
        });
        cmds.push(ItemCommand::StartTimer {
            token,
            delay_ms: config.double_tap_window_ms,
        });
        cmds
    }

    fn begin_hold(&mut self) -> Vec<ItemCommand> {
        // Long press wins over any tap still waiting for resolution.
        self.pending_tap = None;
        self.last_tap_at_ms = None;
        self.held_down = true;
        if self.playing {
            self.playing = false;
            return vec![ItemCommand::Pause];
        }
        vec![]
    }

    fn release_hold(&mut self, may_resume: bool) -> Vec<ItemCommand> {
        self.held_down = false;
        if self.active && may_resume && !self.playing {
            self.playing = true;
            return vec![ItemCommand::Play];
        }
        vec![]
    }

    fn toggle_mute(&mut self) -> Vec<ItemCommand> {
        self.muted = !self.muted;
        vec![ItemCommand::SetMuted(self.muted)]
    }
}
