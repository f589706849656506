//! Newline-delimited framing shared by the daemon and its clients.

use std::fmt;
use std::io::{self, BufRead, Read};

#[derive(Debug)]
pub enum FrameError {
    /// More than the limit arrived without a newline.
    TooLarge,
    /// The line held nothing but whitespace.
    Blank,
    TimedOut,
    Io(io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge => write!(f, "line exceeded maximum size"),
            FrameError::Blank => write!(f, "line was empty"),
            FrameError::TimedOut => write!(f, "timed out waiting for a line"),
            FrameError::Io(err) => write!(f, "read failed: {}", err),
        }
    }
}

impl std::error::Error for FrameError {}

/// Reads one line of at most `limit` bytes, newline excluded.
///
/// `Ok(None)` means the peer closed before sending anything. A final line
/// without a trailing newline is accepted. Bytes buffered past the newline
/// stay in `reader` for the next call.
pub fn read_frame<R: BufRead>(reader: &mut R, limit: usize) -> Result<Option<Vec<u8>>, FrameError> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut line)
        .map_err(|err| match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FrameError::TimedOut,
            _ => FrameError::Io(err),
        })?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    } else if line.len() > limit {
        return Err(FrameError::TooLarge);
    }
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(FrameError::Blank);
    }
    Ok(Some(line))
}
