// Feed glue: forwards controller commands to the playback sink and timers.

use super::*;
use crate::feed::FeedCommand;
use crate::PlaybackSink;

impl AppCore {
    fn playback_sink(&self) -> Option<Arc<dyn PlaybackSink>> {
        match self.playback_sink.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Executes side effects and refreshes `state.feed`. Does not emit.
    pub(super) fn apply_feed_commands(&mut self, cmds: Vec<FeedCommand>) {
        let sink = self.playback_sink();
        for cmd in cmds {
            match cmd {
                FeedCommand::Play { item_id, .. } => {
                    with_item_sink(sink.as_deref(), item_id, "play", |s, id| s.play(id));
                }
                FeedCommand::Pause { item_id, .. } => {
                    with_item_sink(sink.as_deref(), item_id, "pause", |s, id| s.pause(id));
                }
                FeedCommand::SetMuted { item_id, muted, .. } => {
                    with_item_sink(sink.as_deref(), item_id, "set_muted", |s, id| {
                        s.set_muted(id, muted)
                    });
                }
                FeedCommand::StartTimer {
                    index,
                    token,
                    delay_ms,
                } => self.schedule_feed_timer(index, token, delay_ms),
                FeedCommand::DoubleTap { index } => self.open_creator(index),
            }
        }
        self.state.feed = self.feed.snapshot();
    }

    fn schedule_feed_timer(&self, index: usize, token: u64, delay_ms: u64) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::FeedTimerFired {
                index,
                token,
            })));
        });
    }

    fn open_creator(&mut self, index: usize) {
        let Some(item) = self.feed.item(index) else {
            return;
        };
        let screen = Screen::Artist {
            artist_id: item.creator.id.clone(),
        };
        tracing::info!(item_id = %item.id, creator = %item.creator.id, "feed: double tap");
        self.push_screen(screen);
    }
}

/// Sink failures never change playback state.
fn with_item_sink(
    sink: Option<&dyn PlaybackSink>,
    item_id: String,
    op: &'static str,
    f: impl FnOnce(&dyn PlaybackSink, String) -> Result<(), crate::PlaybackSinkError>,
) {
    let Some(sink) = sink else {
        tracing::debug!(op, item_id = %item_id, "no playback sink attached");
        return;
    };
    if let Err(e) = f(sink, item_id.clone()) {
        tracing::warn!(op, item_id = %item_id, %e, "playback sink command failed");
    }
}
