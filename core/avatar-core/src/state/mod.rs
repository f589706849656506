//! Play-state machine.
//!
//! `PlayState` is plain data plus transition methods; it does no locking and
//! no IO. The [`Engine`](crate::Engine) owns the single instance, serializes
//! every call under one mutex and broadcasts each `Outcome::Transitioned`.
//!
//! ```text
//! Idle ──StartTask/AddTaskEmotion──▶ Task ──queue exhausted──▶ Idle
//!  │ ▲                                 │
//!  │ └──────elapsed────── Emotion ◀────┘ TriggerEmotion
//!  └──Sleep──▶ Sleeping(Transition) ──done──▶ Sleeping(Loop) ──Wake──▶ Waking ──done──▶ Idle
//! ```

mod play_state;
mod sleep_wake;

pub use play_state::{
    Activity, NowShowing, Outcome, PlayContext, PlayState, PlayStatus, SleepStage,
};
