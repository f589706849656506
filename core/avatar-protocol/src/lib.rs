//! IPC protocol types and validation for sage-avatar-daemon.
//!
//! Shared by the daemon and its collaborators so request and push schemas
//! cannot drift. The daemon stays the authority on validation; clients reuse
//! the same types to build requests and to check what they receive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod framing;

pub use framing::{read_frame, FrameError};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024; // 64KB

pub const ERROR_CATEGORY_NOT_FOUND: &str = "category_not_found";
pub const ERROR_INVALID_PARAMS: &str = "invalid_params";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetStatus,
    GetEmotions,
    StartTask,
    AddTaskEmotion,
    CompleteTask,
    Sleep,
    Wake,
    TriggerEmotion,
    TransitionComplete,
    Subscribe,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, id: Option<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Params for `start_task`, `add_task_emotion` and `trigger_emotion`.
///
/// `start_task` additionally accepts `then`, the emotions queued after the
/// first one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EmotionParams {
    pub emotion: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransitionCompleteParams {
    pub generation: u64,
}

pub fn parse_emotion_params(params: Option<Value>) -> Result<EmotionParams, ErrorInfo> {
    let params =
        params.ok_or_else(|| ErrorInfo::new(ERROR_INVALID_PARAMS, "emotion is required"))?;
    let parsed: EmotionParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            format!("emotion params are invalid: {}", err),
        )
    })?;
    require_name(&parsed.emotion, "emotion")?;
    for name in &parsed.then {
        require_name(name, "then")?;
    }
    Ok(parsed)
}

pub fn parse_transition_complete(
    params: Option<Value>,
) -> Result<TransitionCompleteParams, ErrorInfo> {
    let params =
        params.ok_or_else(|| ErrorInfo::new(ERROR_INVALID_PARAMS, "generation is required"))?;
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            format!("transition_complete params are invalid: {}", err),
        )
    })
}

fn require_name(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    if value.len() > 128 {
        return Err(ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            format!("{} must be 128 characters or fewer", field),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Push messages
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of playback a `video_change` announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    Idle,
    TaskEmotion,
    Emotion,
    Sleep,
    Wake,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Idle => "idle",
            VideoKind::TaskEmotion => "task_emotion",
            VideoKind::Emotion => "emotion",
            VideoKind::Sleep => "sleep",
            VideoKind::Wake => "wake",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoChange {
    pub video: String,
    pub duration: f64,
    pub emotion: String,
    pub kind: VideoKind,
    pub description: String,
    /// Epoch milliseconds at which this clip started.
    pub timestamp: i64,
    pub generation: u64,
    #[serde(default)]
    pub looping: bool,
    /// Seconds already played when the message was produced. Zero for live
    /// transitions; positive for catch-up sent to late subscribers.
    #[serde(default)]
    pub elapsed: f64,
}

impl VideoChange {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.video.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_message", "video is required"));
        }
        if self.emotion.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_message", "emotion is required"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ErrorInfo::new(
                "invalid_message",
                "duration must be a positive number",
            ));
        }
        if !self.elapsed.is_finite() || self.elapsed < 0.0 {
            return Err(ErrorInfo::new(
                "invalid_message",
                "elapsed must be zero or positive",
            ));
        }
        if self.timestamp <= 0 {
            return Err(ErrorInfo::new(
                "invalid_message",
                "timestamp must be epoch milliseconds",
            ));
        }
        Ok(())
    }
}

/// Every message the daemon pushes to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    VideoChange(VideoChange),
}

impl PushMessage {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            PushMessage::VideoChange(change) => change.validate(),
        }
    }

    /// Validates and serializes to a single JSON line (without newline).
    pub fn encode(&self) -> Result<String, ErrorInfo> {
        self.validate()?;
        serde_json::to_string(self).map_err(|err| {
            ErrorInfo::new(
                "serialization_error",
                format!("failed to serialize push message: {}", err),
            )
        })
    }
}

pub fn parse_push_message(line: &str) -> Result<PushMessage, ErrorInfo> {
    let message: PushMessage = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new(
            "invalid_message",
            format!("push message is invalid JSON: {}", err),
        )
    })?;
    message.validate()?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_change() -> VideoChange {
        VideoChange {
            video: "./personality/video/sage-thinking.mp4".to_string(),
            duration: 5.0,
            emotion: "thinking".to_string(),
            kind: VideoKind::TaskEmotion,
            description: "Working through a problem".to_string(),
            timestamp: 1_760_000_000_000,
            generation: 3,
            looping: false,
            elapsed: 0.0,
        }
    }

    #[test]
    fn push_message_is_tagged_video_change() {
        let line = PushMessage::VideoChange(sample_change())
            .encode()
            .expect("encode");
        let value: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["type"], "video_change");
        assert_eq!(value["kind"], "task_emotion");
        assert_eq!(value["emotion"], "thinking");
        assert_eq!(value["duration"], 5.0);
    }

    #[test]
    fn encode_rejects_non_positive_duration() {
        let mut change = sample_change();
        change.duration = 0.0;
        let err = PushMessage::VideoChange(change).encode().unwrap_err();
        assert_eq!(err.code, "invalid_message");
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let line = r#"{"type":"video_change","video":"a.mp4","duration":1.0,"emotion":"x","kind":"party","description":"","timestamp":1,"generation":1}"#;
        assert!(parse_push_message(line).is_err());
    }

    #[test]
    fn parse_rejects_unknown_message_type() {
        let line = r#"{"type":"message","video":"a.mp4"}"#;
        assert!(parse_push_message(line).is_err());
    }

    #[test]
    fn emotion_params_require_name() {
        assert!(parse_emotion_params(None).is_err());
        assert!(parse_emotion_params(Some(json!({"emotion": "  "}))).is_err());
        let parsed =
            parse_emotion_params(Some(json!({"emotion": "thinking", "then": ["joyful"]})))
                .expect("params");
        assert_eq!(parsed.emotion, "thinking");
        assert_eq!(parsed.then, vec!["joyful".to_string()]);
    }

    #[test]
    fn emotion_params_reject_unknown_fields() {
        let err = parse_emotion_params(Some(json!({"emotion": "joyful", "mood": 3}))).unwrap_err();
        assert_eq!(err.code, ERROR_INVALID_PARAMS);
    }

    #[test]
    fn transition_complete_requires_generation() {
        assert!(parse_transition_complete(Some(json!({}))).is_err());
        let parsed = parse_transition_complete(Some(json!({"generation": 7}))).expect("params");
        assert_eq!(parsed.generation, 7);
    }

    #[test]
    fn request_rejects_unknown_method() {
        let raw = r#"{"protocol_version":1,"method":"dance"}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }
}
