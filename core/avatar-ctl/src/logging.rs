//! File logging for the CLI.
//!
//! Stdout belongs to command output, so traces go to a daily-rotated file
//! under `~/.sage/logs`. If that directory cannot be created the CLI runs
//! without logging.

use tracing_appender::non_blocking::WorkerGuard;

use sage_avatar_core::config::sage_dir;
use sage_avatar_core::logging::env_filter;

const LOG_DIR_NAME: &str = "logs";
const LOG_FILE_PREFIX: &str = "sage-avatar.log";

pub fn init() -> Option<WorkerGuard> {
    let dir = sage_dir().ok()?.join(LOG_DIR_NAME);
    fs_err::create_dir_all(&dir).ok()?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        &dir,
        LOG_FILE_PREFIX,
    ));
    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    if result.is_err() {
        return None;
    }
    Some(guard)
}
