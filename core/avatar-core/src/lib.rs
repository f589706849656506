//! Sage avatar core: picks, sequences and times the short clips that show the
//! assistant's mood, and keeps every connected viewer on one timeline.
//!
//! Collaborators hand in a category ("emotion") name; classification of which
//! emotion fits a message or file change happens elsewhere.
//!
//! ## Layout
//!
//! - [`catalog`]: validated, immutable table of categories and weighted clips
//! - [`selector`]: weighted-random pick with an injectable draw source
//! - [`state`]: the play-state machine, including two-stage sleep/wake
//! - [`engine`]: the single owner that serializes calls and broadcasts
//! - [`scheduler`]: background loop driving duration timeouts
//! - [`broadcast`]: per-subscriber bounded fan-out with catch-up
//! - [`config`]: `~/.sage/avatar.toml`
//! - [`logging`]: the log filter both binaries share

pub mod broadcast;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod selector;
pub mod state;

pub use broadcast::{Broadcaster, SubscriberId, Subscription};
pub use catalog::{Catalog, EmotionCategory, MissingAsset, VideoAsset};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, AvatarConfig};
pub use engine::{Engine, EngineSettings};
pub use error::{AvatarError, Result};
pub use scheduler::Scheduler;
pub use selector::{DrawSource, RandomDraw, ScriptedDraw, Selector};
pub use state::{Activity, NowShowing, Outcome, PlayStatus, SleepStage};
