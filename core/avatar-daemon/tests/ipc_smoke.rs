use sage_avatar_protocol::{
    parse_push_message, Method, PushMessage, Request, Response, VideoKind,
    ERROR_CATEGORY_NOT_FOUND,
};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_fixture_home(home: &Path) {
    let sage_dir = home.join(".sage");
    std::fs::create_dir_all(&sage_dir).expect("create ~/.sage");
    std::fs::write(
        sage_dir.join("avatar.toml"),
        "[scheduler]\ntick_interval_ms = 50\ntransition_margin_ms = 200\n",
    )
    .expect("write config");

    let catalog = json!({
        "categories": {
            "idle": {
                "videos": [{"location": "idle.mp4", "duration": 30.0}],
                "description": "Waiting for interaction"
            },
            "thinking": {
                "videos": [{"location": "thinking.mp4", "duration": 0.4}],
                "description": "Working through a problem"
            },
            "sleep-transition": {
                "videos": [{"location": "sleeps.mp4", "duration": 0.3}],
                "description": "Drifting off"
            },
            "sleep-loop": {
                "videos": [{"location": "asleep.mp4", "duration": 8.0}],
                "description": "Asleep"
            },
            "wake-transition": {
                "videos": [{"location": "wakes.mp4", "duration": 0.3}],
                "description": "Waking up"
            }
        }
    });
    std::fs::write(
        sage_dir.join("expressions-video.json"),
        serde_json::to_string_pretty(&catalog).expect("catalog json"),
    )
    .expect("write catalog");
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_sage-avatar-daemon"))
        .env("HOME", home)
        .env_remove("SAGE_AVATAR_CONFIG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn sage-avatar-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".sage").join("avatar.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn start(home: &TempDir) -> (DaemonGuard, PathBuf) {
    write_fixture_home(home.path());
    let socket = socket_path(home.path());
    let guard = DaemonGuard {
        child: spawn_daemon(home.path()),
    };
    wait_for_socket(&socket, Duration::from_secs(2));
    (guard, socket)
}

fn request(method: Method, params: Option<Value>) -> Request {
    Request::new(method, Some(format!("{:?}", method)), params)
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn status_field(socket: &Path, field: &str) -> Value {
    let response = send_request(socket, request(Method::GetStatus, None));
    assert!(response.ok, "status response was not ok");
    response
        .data
        .and_then(|data| data.get(field).cloned())
        .unwrap_or(Value::Null)
}

fn next_change(reader: &mut BufReader<UnixStream>) -> sage_avatar_protocol::VideoChange {
    let mut line = String::new();
    reader.read_line(&mut line).expect("Failed to read push line");
    match parse_push_message(line.trim_end()).expect("Failed to parse push message") {
        PushMessage::VideoChange(change) => change,
    }
}

#[test]
fn daemon_ipc_health_and_control_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (_guard, socket) = start(&home);

    let health = send_request(&socket, request(Method::GetHealth, None));
    assert!(health.ok, "health response was not ok");
    let status = health
        .data
        .as_ref()
        .and_then(|data| data.get("status"))
        .and_then(|value| value.as_str())
        .unwrap_or("missing");
    assert_eq!(status, "ok");
    assert_eq!(health.id.as_deref(), Some("GetHealth"));

    assert_eq!(status_field(&socket, "state"), "idle");

    let started = send_request(
        &socket,
        request(Method::StartTask, Some(json!({"emotion": "thinking"}))),
    );
    assert!(started.ok, "start_task was not ok");
    assert_eq!(status_field(&socket, "state"), "task");

    let unknown = send_request(
        &socket,
        request(Method::TriggerEmotion, Some(json!({"emotion": "ecstatic"}))),
    );
    assert!(!unknown.ok);
    assert_eq!(
        unknown.error.expect("error info").code,
        ERROR_CATEGORY_NOT_FOUND
    );
    assert_eq!(status_field(&socket, "category"), "thinking");

    let completed = send_request(&socket, request(Method::CompleteTask, None));
    assert!(completed.ok);
    assert_eq!(status_field(&socket, "state"), "idle");
    assert_eq!(status_field(&socket, "queue_length"), 0);
}

#[test]
fn daemon_rejects_malformed_requests() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (_guard, socket) = start(&home);

    let mut stream = UnixStream::connect(&socket).expect("connect");
    stream.write_all(b"{not json}\n").expect("write");
    let response = read_response(&mut stream);
    assert!(!response.ok);
    assert_eq!(response.error.expect("error").code, "invalid_json");

    let missing = send_request(&socket, request(Method::StartTask, None));
    assert!(!missing.ok);
    assert_eq!(missing.error.expect("error").code, "invalid_params");
}

#[test]
fn subscriber_gets_catch_up_then_live_changes() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (_guard, socket) = start(&home);

    let mut stream = UnixStream::connect(&socket).expect("connect");
    serde_json::to_writer(&mut stream, &request(Method::Subscribe, None)).expect("serialize");
    stream.write_all(b"\n").expect("write");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");

    let mut reader = BufReader::new(stream);
    let mut ack = String::new();
    reader.read_line(&mut ack).expect("ack line");
    let ack: Response = serde_json::from_str(ack.trim_end()).expect("ack json");
    assert!(ack.ok, "subscribe was not acknowledged");

    let catch_up = next_change(&mut reader);
    assert_eq!(catch_up.kind, VideoKind::Idle);
    assert_eq!(catch_up.video, "idle.mp4");

    let started = send_request(
        &socket,
        request(Method::StartTask, Some(json!({"emotion": "thinking"}))),
    );
    assert!(started.ok);

    let live = next_change(&mut reader);
    assert_eq!(live.kind, VideoKind::TaskEmotion);
    assert_eq!(live.emotion, "thinking");
    assert_eq!(live.elapsed, 0.0);
    assert!(live.generation > catch_up.generation);

    // The scheduler returns to idle once the short clip runs out.
    let back = next_change(&mut reader);
    assert_eq!(back.kind, VideoKind::Idle);
    assert!(back.generation > live.generation);
}

#[test]
fn sleep_is_idempotent_over_ipc() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (_guard, socket) = start(&home);

    let first = send_request(&socket, request(Method::Sleep, None));
    assert!(first.ok);
    assert_eq!(first.data.as_ref().expect("data")["applied"], true);

    let second = send_request(&socket, request(Method::Sleep, None));
    assert!(second.ok);
    assert_eq!(second.data.as_ref().expect("data")["applied"], false);
    assert_eq!(status_field(&socket, "state"), "sleeping");

    // Transition timeout (0.3s + 0.2s margin) lands on the loop.
    let deadline = Instant::now() + Duration::from_secs(3);
    while status_field(&socket, "sleep_stage") != "loop" {
        assert!(Instant::now() < deadline, "sleep never reached the loop");
        sleep(Duration::from_millis(50));
    }

    let woke = send_request(&socket, request(Method::Wake, None));
    assert!(woke.ok);
    assert_eq!(status_field(&socket, "state"), "waking");
}

#[test]
fn stalled_subscriber_is_evicted_and_disconnected() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (_guard, socket) = start(&home);

    let mut stalled = UnixStream::connect(&socket).expect("connect");
    serde_json::to_writer(&mut stalled, &request(Method::Subscribe, None)).expect("serialize");
    stalled.write_all(b"\n").expect("write");

    // Never read while the daemon keeps publishing, until the socket
    // buffer and the subscriber queue are both full.
    let subscribers = |socket: &Path| {
        send_request(socket, request(Method::GetHealth, None))
            .data
            .and_then(|data| data.get("subscribers").and_then(Value::as_u64))
            .unwrap_or(u64::MAX)
    };
    let deadline = Instant::now() + Duration::from_secs(30);
    while subscribers(&socket) != 0 {
        assert!(Instant::now() < deadline, "stalled subscriber was never evicted");
        for _ in 0..100 {
            let response = send_request(
                &socket,
                request(Method::TriggerEmotion, Some(json!({"emotion": "thinking"}))),
            );
            assert!(response.ok);
        }
    }

    // The blocked write gives up, so the daemon closes its end and the
    // viewer reaches EOF once it drains what was buffered.
    sleep(Duration::from_secs(3));
    stalled
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let mut sink = Vec::new();
    stalled
        .read_to_end(&mut sink)
        .expect("daemon should close the stalled stream");
    assert!(!sink.is_empty());
}
