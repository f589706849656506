//! Long-lived subscriber connections.
//!
//! After the `subscribe` acknowledgement the connection carries one push
//! message per line, starting with a catch-up for the clip already playing.
//! A watcher thread notices the peer hanging up and unregisters the
//! subscriber, which also ends the writer loop even when no clip change is
//! pending. A viewer that stops reading is cut off once a write stalls past
//! the write timeout.

use serde_json::json;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use sage_avatar_core::{Engine, SubscriberId};
use sage_avatar_protocol::{PushMessage, Response};

use crate::write_response;

const WRITE_TIMEOUT_MS: u64 = 2000;

pub fn serve_subscription(mut stream: UnixStream, request_id: Option<String>, engine: &Arc<Engine>) {
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
    let subscription = engine.subscribe();
    let subscriber = subscription.id();

    let ack = Response::ok(
        request_id,
        json!({ "subscribed": true, "subscriber_id": subscriber.to_string() }),
    );
    if let Err(err) = write_response(&mut stream, ack) {
        debug!(error = %err, %subscriber, "Subscriber left before acknowledgement");
        engine.unsubscribe(subscriber);
        return;
    }
    debug!(%subscriber, "Subscriber stream open");

    match stream.try_clone() {
        Ok(reader) => spawn_hangup_watcher(reader, subscriber, Arc::clone(engine)),
        Err(err) => warn!(error = %err, %subscriber, "Failed to watch subscriber for hangup"),
    }

    while let Some(message) = subscription.recv() {
        if let Err(err) = write_message(&mut stream, &message) {
            debug!(error = %err, %subscriber, "Subscriber write failed");
            break;
        }
    }

    engine.unsubscribe(subscriber);
    // Also wakes the hang-up watcher blocked on its clone of this socket.
    let _ = stream.shutdown(Shutdown::Both);
    debug!(%subscriber, "Subscriber stream closed");
}

fn write_message(stream: &mut UnixStream, message: &PushMessage) -> io::Result<()> {
    let line = match message.encode() {
        Ok(line) => line,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Dropping invalid push message");
            return Ok(());
        }
    };
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

/// Viewers send nothing after subscribing; reaching EOF (or an error) means
/// they are gone.
fn spawn_hangup_watcher(mut reader: UnixStream, subscriber: SubscriberId, engine: Arc<Engine>) {
    let _ = reader.set_read_timeout(None);
    thread::spawn(move || {
        let mut chunk = [0u8; 512];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        if engine.unsubscribe(subscriber) {
            debug!(%subscriber, "Subscriber hung up");
        }
    });
}
