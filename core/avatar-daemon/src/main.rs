//! Sage avatar daemon entrypoint.
//!
//! A single-owner service for avatar playback: a socket listener with strict
//! request validation, one engine that serializes every state change, a
//! scheduler thread for clip timeouts and long-lived subscriber streams that
//! receive each `video_change` as it happens.

use std::io::{self, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use sage_avatar_core::config::config_path_from_env;
use sage_avatar_core::logging::env_filter;
use sage_avatar_core::{load_config, Catalog, Engine, Scheduler, Selector, SystemClock};
use sage_avatar_protocol::{
    read_frame, ErrorInfo, FrameError, Request, Response, MAX_REQUEST_BYTES,
};

mod handlers;
mod stream;

use handlers::Reply;

const READ_TIMEOUT_SECS: u64 = 2;
const MISSING_FILES_LOG_LIMIT: usize = 20;

fn main() {
    init_logging();

    let config = match load_config(config_path_from_env()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load avatar config");
            std::process::exit(1);
        }
    };

    let catalog_path = match config.catalog_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve catalog path");
            std::process::exit(1);
        }
    };

    let catalog = match Catalog::load(&catalog_path) {
        Ok(catalog) => Arc::new(catalog),
        Err(err) => {
            error!(error = %err, path = %catalog_path.display(), "Failed to load catalog");
            std::process::exit(1);
        }
    };
    if let Some(root) = catalog_path.parent() {
        report_missing_files(&catalog, root);
    }

    let socket_path = match config.socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    let engine = match Engine::new(
        Arc::clone(&catalog),
        Arc::new(SystemClock),
        Selector::random(),
        config.engine_settings(),
    ) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!(error = %err, "Failed to start play state");
            std::process::exit(1);
        }
    };

    let _scheduler = match Scheduler::spawn(Arc::clone(&engine), config.tick_interval()) {
        Ok(scheduler) => scheduler,
        Err(err) => {
            error!(error = %err, "Failed to start scheduler");
            std::process::exit(1);
        }
    };

    let listener = match bind_socket(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(
        path = %socket_path.display(),
        tick_interval_ms = config.tick_interval().as_millis() as u64,
        "Sage avatar daemon started"
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || handle_connection(stream, engine));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

fn report_missing_files(catalog: &Catalog, root: &Path) {
    let missing = catalog.missing_files(root);
    if missing.is_empty() {
        return;
    }
    for asset in missing.iter().take(MISSING_FILES_LOG_LIMIT) {
        warn!(
            category = %asset.category,
            location = %asset.location,
            "Catalog clip not found on disk"
        );
    }
    warn!(
        missing = missing.len(),
        root = %root.display(),
        "Catalog references clips that do not exist; viewers may fail to play them"
    );
}

/// Creates the socket's directory, clears a socket left by an earlier run
/// and binds.
fn bind_socket(socket_path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    match fs_err::remove_file(socket_path) {
        Ok(()) => info!(path = %socket_path.display(), "Removed stale socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    UnixListener::bind(socket_path)
}

fn handle_connection(mut stream: UnixStream, engine: Arc<Engine>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    match handlers::handle_request(request, &engine) {
        Reply::Once(response) => {
            let _ = write_response(&mut stream, response);
        }
        Reply::Subscribe { id } => stream::serve_subscription(stream, id, &engine),
    }
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let line = match read_frame(&mut BufReader::new(&*stream), MAX_REQUEST_BYTES) {
        Ok(Some(line)) => line,
        Ok(None) | Err(FrameError::Blank) => {
            return Err(ErrorInfo::new("empty_request", "request body was empty"));
        }
        Err(FrameError::TooLarge) => {
            return Err(ErrorInfo::new(
                "request_too_large",
                "request exceeded maximum size",
            ));
        }
        Err(FrameError::TimedOut) => {
            return Err(ErrorInfo::new("read_timeout", "request timed out"));
        }
        Err(FrameError::Io(err)) => {
            return Err(ErrorInfo::new(
                "read_error",
                format!("failed to read request: {}", err),
            ));
        }
    };

    serde_json::from_slice(&line).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
