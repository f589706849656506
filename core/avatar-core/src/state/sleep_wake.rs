//! Two-stage sleep and wake playback.
//!
//! Entering `Sleeping` or `Waking` plays a one-shot transition clip. The
//! transition completes on whichever comes first: a viewer's completion
//! notice or the scheduler deadline (`duration + margin`). Both paths go
//! through [`PlayState::complete_transition`], which only fires for the
//! generation that started the transition.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::play_state::{Activity, Outcome, PlayContext, PlayState, SleepStage};
use crate::catalog::{IDLE, SLEEP_LOOP, SLEEP_TRANSITION, WAKE_TRANSITION};
use crate::error::Result;

impl PlayState {
    pub fn sleep(&mut self, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        if matches!(self.activity, Activity::Sleeping(_)) {
            return Ok(Outcome::NoOp);
        }
        let outcome = self.show(
            Activity::Sleeping(SleepStage::Transition),
            SLEEP_TRANSITION,
            false,
            ctx,
        )?;
        self.task_queue.clear();
        Ok(outcome)
    }

    pub fn wake(&mut self, ctx: &mut PlayContext<'_>) -> Result<Outcome> {
        if !matches!(self.activity, Activity::Sleeping(_)) {
            return Ok(Outcome::NoOp);
        }
        self.show(Activity::Waking, WAKE_TRANSITION, false, ctx)
    }

    /// Advances a sleep or wake transition to its steady state.
    ///
    /// `observed_generation` is the generation the caller saw when the
    /// transition clip started. Anything else is stale and ignored, which
    /// makes a second completion signal a no-op.
    pub fn complete_transition(
        &mut self,
        observed_generation: u64,
        ctx: &mut PlayContext<'_>,
    ) -> Result<Outcome> {
        if observed_generation != self.generation {
            debug!(
                observed_generation,
                generation = self.generation,
                "Ignoring stale transition completion"
            );
            return Ok(Outcome::NoOp);
        }

        match self.activity {
            Activity::Sleeping(SleepStage::Transition) => self.show(
                Activity::Sleeping(SleepStage::Loop),
                SLEEP_LOOP,
                true,
                ctx,
            ),
            Activity::Waking => self.show(Activity::Idle, IDLE, false, ctx),
            _ => Ok(Outcome::NoOp),
        }
    }

    /// When the server stops waiting for a completion notice, if the current
    /// state is a transition. `None` also covers a clip so long that its
    /// deadline is past the representable range; only the viewer's notice
    /// can end such a transition.
    pub fn transition_deadline(&self, margin: Duration) -> Option<DateTime<Utc>> {
        match self.activity {
            Activity::Sleeping(SleepStage::Transition) | Activity::Waking => {
                let clip = Duration::try_milliseconds(
                    (self.current.asset.duration_seconds * 1000.0).round() as i64,
                )?;
                self.current
                    .started_at
                    .checked_add_signed(clip)?
                    .checked_add_signed(margin)
            }
            _ => None,
        }
    }

    pub(super) fn transition_due(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.transition_deadline(margin)
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }
}
