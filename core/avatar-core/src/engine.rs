//! The single owner of the play state.
//!
//! Every control call and every scheduler tick takes the same mutex, applies
//! one transition and, if a new clip started, enqueues exactly one push
//! message per subscriber before releasing it. Enqueueing never blocks, so
//! no caller waits on a viewer's network while holding the lock.

use chrono::Duration;
use sage_avatar_protocol::{PushMessage, VideoChange};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::broadcast::{Broadcaster, SubscriberId, Subscription, DEFAULT_QUEUE_DEPTH};
use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::selector::Selector;
use crate::state::{Outcome, PlayContext, PlayState, PlayStatus};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Extra time granted to a sleep/wake transition clip before the server
    /// stops waiting for the viewer's completion notice.
    pub transition_margin: Duration,
    pub subscriber_queue_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transition_margin: Duration::milliseconds(500),
            subscriber_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

struct EngineInner {
    play: PlayState,
    selector: Selector,
    broadcaster: Broadcaster,
}

pub struct Engine {
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    inner: Mutex<EngineInner>,
}

impl Engine {
    pub fn new(
        catalog: Arc<Catalog>,
        clock: Arc<dyn Clock>,
        mut selector: Selector,
        settings: EngineSettings,
    ) -> Result<Self> {
        let play = PlayState::new(&mut PlayContext {
            catalog: &catalog,
            selector: &mut selector,
            now: clock.now(),
        })?;
        info!(
            video = %play.current().asset.location,
            duration = play.current().asset.duration_seconds,
            "Initialized with idle video"
        );

        let broadcaster = Broadcaster::new(settings.subscriber_queue_depth);
        Ok(Self {
            catalog,
            clock,
            settings,
            inner: Mutex::new(EngineInner {
                play,
                selector,
                broadcaster,
            }),
        })
    }

    /// System clock, entropy-seeded selection and default settings.
    pub fn with_defaults(catalog: Arc<Catalog>) -> Result<Self> {
        Self::new(
            catalog,
            Arc::new(SystemClock),
            Selector::random(),
            EngineSettings::default(),
        )
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn start_task(&self, emotion: &str) -> Result<Outcome> {
        self.apply("start_task", |play, ctx| play.start_task(emotion, ctx))
    }

    pub fn start_task_sequence(&self, emotions: &[String]) -> Result<Outcome> {
        self.apply("start_task_sequence", |play, ctx| {
            play.start_task_sequence(emotions, ctx)
        })
    }

    pub fn add_task_emotion(&self, emotion: &str) -> Result<Outcome> {
        self.apply("add_task_emotion", |play, ctx| {
            play.add_task_emotion(emotion, ctx)
        })
    }

    pub fn complete_task(&self) -> Result<Outcome> {
        self.apply("complete_task", |play, ctx| play.complete_task(ctx))
    }

    pub fn trigger_emotion(&self, emotion: &str) -> Result<Outcome> {
        self.apply("trigger_emotion", |play, ctx| {
            play.trigger_emotion(emotion, ctx)
        })
    }

    pub fn sleep(&self) -> Result<Outcome> {
        self.apply("sleep", |play, ctx| play.sleep(ctx))
    }

    pub fn wake(&self) -> Result<Outcome> {
        self.apply("wake", |play, ctx| play.wake(ctx))
    }

    /// Viewer notice that the sleep/wake transition clip it was shown (at
    /// `generation`) finished playing.
    pub fn transition_complete(&self, generation: u64) -> Result<Outcome> {
        self.apply("transition_complete", |play, ctx| {
            play.complete_transition(generation, ctx)
        })
    }

    /// One scheduler step: applies the current state's timeout transition if
    /// it is due.
    pub fn tick(&self) -> Result<Outcome> {
        let margin = self.settings.transition_margin;
        self.apply("tick", |play, ctx| play.on_tick(margin, ctx))
    }

    pub fn status(&self) -> PlayStatus {
        let inner = self.lock();
        let mut status = inner.play.status(self.clock.now());
        status.subscribers = inner.broadcaster.len();
        status
    }

    /// The current clip, with `elapsed` set to how far into it we are.
    pub fn now_playing(&self) -> VideoChange {
        let inner = self.lock();
        let elapsed = inner.play.current().position_seconds(self.clock.now());
        inner.play.video_change(elapsed)
    }

    /// Registers a subscriber. Its first message is a catch-up for the clip
    /// already playing, enqueued under the same lock as registration so no
    /// transition can slip in between.
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.lock();
        let elapsed = inner.play.current().position_seconds(self.clock.now());
        let catch_up = PushMessage::VideoChange(inner.play.video_change(elapsed));
        inner.broadcaster.subscribe(catch_up)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.lock().broadcaster.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().broadcaster.len()
    }

    fn apply<F>(&self, operation: &'static str, op: F) -> Result<Outcome>
    where
        F: FnOnce(&mut PlayState, &mut PlayContext<'_>) -> Result<Outcome>,
    {
        let mut guard = self.lock();
        let EngineInner {
            play,
            selector,
            broadcaster,
        } = &mut *guard;
        let mut ctx = PlayContext {
            catalog: &self.catalog,
            selector,
            now: self.clock.now(),
        };

        let outcome = op(play, &mut ctx)?;
        match outcome {
            Outcome::Transitioned { generation } => {
                let change = play.video_change(0.0);
                info!(
                    operation,
                    state = play.activity().as_str(),
                    emotion = %change.emotion,
                    kind = change.kind.as_str(),
                    video = %change.video,
                    duration = change.duration,
                    generation,
                    "Video changed"
                );
                let remaining = broadcaster.publish(&PushMessage::VideoChange(change));
                debug!(subscribers = remaining, "Video change broadcast");
            }
            Outcome::Updated { generation } => {
                debug!(
                    operation,
                    queue_length = play.queue_len(),
                    generation,
                    "Play state updated"
                );
            }
            Outcome::NoOp => {
                if operation != "tick" {
                    debug!(operation, state = play.activity().as_str(), "No-op");
                }
            }
        }
        Ok(outcome)
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("Play state lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}
