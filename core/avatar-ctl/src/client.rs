//! Client helper for talking to the avatar daemon.
//!
//! One request per connection, except `subscribe`, which keeps the
//! connection open and yields push messages line by line.

use chrono::Utc;
use rand::RngCore;
use sage_avatar_core::config::config_path_from_env;
use sage_avatar_core::load_config;
use sage_avatar_protocol::{
    parse_push_message, read_frame, FrameError, Method, PushMessage, Request, Response,
    MAX_REQUEST_BYTES,
};
use serde_json::Value;
use std::env;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

const SOCKET_ENV: &str = "SAGE_AVATAR_SOCKET";
const READ_TIMEOUT_MS: u64 = 2000;
const WRITE_TIMEOUT_MS: u64 = 600;

pub fn socket_path() -> Result<PathBuf, String> {
    if let Some(path) = env::var_os(SOCKET_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config = load_config(config_path_from_env()).map_err(|err| err.to_string())?;
    config.socket_path().map_err(|err| err.to_string())
}

/// Sends one request and returns the `data` of a successful response.
pub fn call(method: Method, params: Option<Value>) -> Result<Value, String> {
    let request = Request::new(method, Some(make_request_id()), params);
    let response = send_request(&request)?;
    into_data(response)
}

fn into_data(response: Response) -> Result<Value, String> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(response
            .error
            .map(|err| format!("{}: {}", err.code, err.message))
            .unwrap_or_else(|| "Unknown daemon error".to_string()))
    }
}

pub struct Watch {
    reader: BufReader<UnixStream>,
}

impl Watch {
    pub fn open() -> Result<Self, String> {
        let request = Request::new(Method::Subscribe, Some(make_request_id()), None);
        let mut stream = connect()?;
        write_request(&mut stream, &request)?;
        // Push lines can arrive in the same read as the ack and must stay
        // buffered for `next_message`.
        let mut reader = BufReader::new(stream);
        into_data(read_response(&mut reader)?)?;
        // Clips can run for minutes between changes.
        let _ = reader.get_ref().set_read_timeout(None);
        Ok(Self { reader })
    }

    /// Blocks for the next message. `Ok(None)` means the daemon closed the
    /// stream.
    pub fn next_message(&mut self) -> Result<Option<PushMessage>, String> {
        let line = match read_frame(&mut self.reader, MAX_REQUEST_BYTES) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(err) => return Err(format!("Failed to read push message: {}", err)),
        };
        let line = String::from_utf8_lossy(&line);
        parse_push_message(line.trim_end())
            .map(Some)
            .map_err(|err| format!("{}: {}", err.code, err.message))
    }
}

fn connect() -> Result<UnixStream, String> {
    let socket = socket_path()?;
    let stream = UnixStream::connect(&socket).map_err(|err| {
        format!(
            "Failed to connect to daemon socket {}: {}",
            socket.display(),
            err
        )
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
    Ok(stream)
}

fn write_request(stream: &mut UnixStream, request: &Request) -> Result<(), String> {
    serde_json::to_writer(&mut *stream, request)
        .map_err(|err| format!("Failed to write request: {}", err))?;
    stream
        .write_all(b"\n")
        .map_err(|err| format!("Failed to flush request: {}", err))?;
    stream.flush().ok();
    Ok(())
}

fn send_request(request: &Request) -> Result<Response, String> {
    let mut stream = connect()?;
    tracing::debug!(method = ?request.method, id = ?request.id, "Sending daemon request");
    write_request(&mut stream, request)?;
    read_response(&mut BufReader::new(stream))
}

fn read_response<R: BufRead>(reader: &mut R) -> Result<Response, String> {
    let line = match read_frame(reader, MAX_REQUEST_BYTES) {
        Ok(Some(line)) => line,
        Ok(None) | Err(FrameError::Blank) => {
            return Err("Daemon response was empty".to_string());
        }
        Err(FrameError::TooLarge) => return Err("Response exceeded maximum size".to_string()),
        Err(FrameError::TimedOut) => {
            return Err("Timed out waiting for daemon response".to_string());
        }
        Err(FrameError::Io(err)) => return Err(format!("Failed to read response: {}", err)),
    };

    serde_json::from_slice(&line)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

fn make_request_id() -> String {
    let rand = rand::thread_rng().next_u64();
    format!(
        "ctl-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        rand
    )
}
