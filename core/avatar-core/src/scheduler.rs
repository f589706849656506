//! Periodic loop that advances the play state on timeouts.
//!
//! Runs on its own thread and calls [`Engine::tick`] once per interval. A
//! failing or panicking tick is logged and the loop carries on. Dropping the
//! handle (or calling [`Scheduler::stop`]) ends the loop and joins the thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::{AvatarError, Result};
use crate::state::Outcome;

pub struct Scheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(engine: Arc<Engine>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("avatar-scheduler".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "Scheduler started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => run_tick(&engine),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Scheduler stopped");
            })
            .map_err(AvatarError::SchedulerSpawn)?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Scheduler thread exited abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn run_tick(engine: &Engine) {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.tick())) {
        Ok(Ok(Outcome::Transitioned { generation })) => {
            debug!(generation, "Tick advanced playback");
        }
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            warn!(error = %err, "Scheduler tick failed");
        }
        Err(_) => {
            error!("Scheduler tick panicked; continuing on next interval");
        }
    }
}
