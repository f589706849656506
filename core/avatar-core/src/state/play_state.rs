use chrono::{DateTime, Duration, Utc};
use sage_avatar_protocol::{VideoChange, VideoKind};
use serde::Serialize;
use std::collections::VecDeque;

use crate::catalog::{Catalog, VideoAsset, IDLE};
use crate::clock::seconds_between;
use crate::error::{AvatarError, Result};
use crate::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepStage {
    Transition,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Task,
    Emotion,
    Sleeping(SleepStage),
    Waking,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Task => "task",
            Activity::Emotion => "emotion",
            Activity::Sleeping(_) => "sleeping",
            Activity::Waking => "waking",
        }
    }

    pub fn video_kind(&self) -> VideoKind {
        match self {
            Activity::Idle => VideoKind::Idle,
            Activity::Task => VideoKind::TaskEmotion,
            Activity::Emotion => VideoKind::Emotion,
            Activity::Sleeping(_) => VideoKind::Sleep,
            Activity::Waking => VideoKind::Wake,
        }
    }

    pub fn sleep_stage(&self) -> Option<SleepStage> {
        match self {
            Activity::Sleeping(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// Result of applying one operation to the play state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// A new clip started; subscribers must be told.
    Transitioned { generation: u64 },
    /// State changed without a new clip (e.g. a queued emotion).
    Updated { generation: u64 },
    NoOp,
}

impl Outcome {
    pub fn is_transition(&self) -> bool {
        matches!(self, Outcome::Transitioned { .. })
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            Outcome::Transitioned { generation } | Outcome::Updated { generation } => {
                Some(*generation)
            }
            Outcome::NoOp => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowShowing {
    pub category: String,
    pub description: String,
    pub asset: VideoAsset,
    pub started_at: DateTime<Utc>,
    pub looping: bool,
}

impl NowShowing {
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.started_at, now)
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_seconds(now) >= self.asset.duration_seconds
    }

    /// Position inside the clip, wrapping for looping assets.
    pub fn position_seconds(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = self.elapsed_seconds(now);
        if self.looping {
            elapsed % self.asset.duration_seconds
        } else {
            elapsed.min(self.asset.duration_seconds)
        }
    }
}

/// Everything a transition needs besides the state itself.
pub struct PlayContext<'a> {
    pub catalog: &'a Catalog,
    pub selector: &'a mut Selector,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlayStatus {
    pub state: String,
    pub category: String,
    pub video: String,
    pub queue_length: usize,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub total_duration: f64,
    pub generation: u64,
    pub looping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_stage: Option<SleepStage>,
    pub subscribers: usize,
}

/// The authoritative record of what is showing and what comes next.
///
/// The head of `task_queue` is the emotion currently playing while in
/// `Activity::Task`; the rest are pending.
#[derive(Debug, Clone)]
pub struct PlayState {
    pub(super) activity: Activity,
    pub(super) current: NowShowing,
    pub(super) task_queue: VecDeque<String>,
    pub(super) generation: u64,
}

impl PlayState {
    /// Starts in `Idle` with an idle clip already picked.
    pub fn new(ctx: &mut PlayContext<'_>) -> Result<Self> {
        let current = pick(ctx, IDLE, false)?;
        Ok(Self {
            activity: Activity::Idle,
            current,
            task_queue: VecDeque::new(),
            generation: 0,
        })
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn current(&self) -> &NowShowing {
        &self.current
    }

    pub fn queue_len(&self) -> usize {
        self.task_queue.len()
    }

    pub fn queue(&self) -> impl Iterator<Item = &str> {
        self.task_queue.iter().map(String::as_str)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start_task(&mut self, emotion: &str, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        ctx.catalog.require(emotion)?;
        self.task_queue.clear();
        self.task_queue.push_back(emotion.to_string());
        self.show(Activity::Task, emotion, false, ctx)
    }

    /// Starts a task with `emotions[0]` and queues the rest. Every name is
    /// checked before anything changes.
    pub fn start_task_sequence(
        &mut self,
        emotions: &[String],
        ctx: &mut PlayContext<'_>,
    ) -> Result<Outcome> {
        let first = match emotions.first() {
            Some(first) => first,
            None => return Ok(Outcome::NoOp),
        };
        for emotion in emotions {
            ctx.catalog.require(emotion)?;
        }
        self.task_queue = emotions.iter().cloned().collect();
        self.show(Activity::Task, first, false, ctx)
    }

    pub fn add_task_emotion(&mut self, emotion: &str, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        ctx.catalog.require(emotion)?;
        if self.activity != Activity::Task {
            return self.start_task(emotion, ctx);
        }

        let had_pending = self.task_queue.len() > 1;
        self.task_queue.push_back(emotion.to_string());
        if !had_pending && self.current.is_finished(ctx.now) {
            return self.advance_task(ctx);
        }
        self.generation += 1;
        Ok(Outcome::Updated {
            generation: self.generation,
        })
    }

    pub fn complete_task(&mut self, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        match self.activity {
            Activity::Task | Activity::Emotion => {
                self.task_queue.clear();
                self.show(Activity::Idle, IDLE, false, ctx)
            }
            Activity::Idle => Ok(Outcome::NoOp),
            Activity::Sleeping(_) | Activity::Waking => {
                if self.task_queue.is_empty() {
                    return Ok(Outcome::NoOp);
                }
                // The generation stays put so a pending transition signal
                // still matches.
                self.task_queue.clear();
                Ok(Outcome::Updated {
                    generation: self.generation,
                })
            }
        }
    }

    pub fn trigger_emotion(&mut self, emotion: &str, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        ctx.catalog.require(emotion)?;
        self.task_queue.clear();
        self.show(Activity::Emotion, emotion, false, ctx)
    }

    /// Applies the timeout transition for the current state, if due.
    pub fn on_tick(
        &mut self,
        transition_margin: Duration,
        ctx: &mut PlayContext<'_>,
    ) -> Result<Outcome> {
        match self.activity {
            Activity::Sleeping(SleepStage::Loop) => Ok(Outcome::NoOp),
            Activity::Sleeping(SleepStage::Transition) | Activity::Waking => {
                if !self.transition_due(ctx.now, transition_margin) {
                    return Ok(Outcome::NoOp);
                }
                let observed = self.generation;
                self.complete_transition(observed, ctx)
            }
            _ if !self.current.is_finished(ctx.now) => Ok(Outcome::NoOp),
            Activity::Idle | Activity::Emotion => self.show(Activity::Idle, IDLE, false, ctx),
            Activity::Task => self.advance_task(ctx),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> PlayStatus {
        let total = self.current.asset.duration_seconds;
        let elapsed = self.current.position_seconds(now);
        PlayStatus {
            state: self.activity.as_str().to_string(),
            category: self.current.category.clone(),
            video: self.current.asset.location.clone(),
            queue_length: self.task_queue.len(),
            elapsed_seconds: elapsed,
            remaining_seconds: (total - elapsed).max(0.0),
            total_duration: total,
            generation: self.generation,
            looping: self.current.looping,
            sleep_stage: self.activity.sleep_stage(),
            subscribers: 0,
        }
    }

    /// Describes the current clip. `elapsed` is zero for a fresh transition.
    pub fn video_change(&self, elapsed: f64) -> VideoChange {
        VideoChange {
            video: self.current.asset.location.clone(),
            duration: self.current.asset.duration_seconds,
            emotion: self.current.category.clone(),
            kind: self.activity.video_kind(),
            description: self.current.description.clone(),
            timestamp: self.current.started_at.timestamp_millis(),
            generation: self.generation,
            looping: self.current.looping,
            elapsed,
        }
    }

    fn advance_task(&mut self, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        self.task_queue.pop_front();
        match self.task_queue.front().cloned() {
            Some(next) => self.show(Activity::Task, &next, false, ctx),
            None => self.show(Activity::Idle, IDLE, false, ctx),
        }
    }

    /// Picks a clip from `category`, makes it current and bumps the
    /// generation. The category lookup happens before any mutation.
    pub(super) fn show(
        &mut self,
        activity: Activity,
        category: &str,
        looping: bool,
        ctx: &mut PlayContext<'_>,
    ) -> Result<Outcome> {
        let current = pick(ctx, category, looping)?;
        self.current = current;
        self.activity = activity;
        self.generation += 1;
        Ok(Outcome::Transitioned {
            generation: self.generation,
        })
    }
}

fn pick(ctx: &mut PlayContext<'_>, category: &str, looping: bool) -> Result<NowShowing> {
    let entry = ctx
        .catalog
        .get(category)
        .ok_or_else(|| AvatarError::CategoryNotFound(category.to_string()))?;
    let asset = ctx.selector.pick(entry).clone();
    Ok(NowShowing {
        category: entry.name().to_string(),
        description: entry.description().to_string(),
        asset,
        started_at: ctx.now,
        looping,
    })
}
