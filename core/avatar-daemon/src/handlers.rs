//! Request dispatch: maps each protocol method onto one engine call.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use sage_avatar_core::{AvatarError, Engine, Outcome};
use sage_avatar_protocol::{
    parse_emotion_params, parse_transition_complete, ErrorInfo, Method, Request, Response,
    PROTOCOL_VERSION,
};

pub enum Reply {
    Once(Response),
    /// Hand the connection over to a subscriber stream.
    Subscribe { id: Option<String> },
}

#[derive(Debug, Serialize)]
struct EmotionSummary<'a> {
    name: &'a str,
    description: &'a str,
    use_cases: &'a BTreeSet<String>,
    videos: usize,
    total_weight: u32,
}

pub fn handle_request(request: Request, engine: &Engine) -> Reply {
    if request.protocol_version != PROTOCOL_VERSION {
        return Reply::Once(Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        ));
    }

    let id = request.id;
    let response = match request.method {
        Method::GetHealth => Response::ok(
            id,
            json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "subscribers": engine.subscriber_count(),
            }),
        ),
        Method::GetStatus => match serde_json::to_value(engine.status()) {
            Ok(value) => Response::ok(id, value),
            Err(err) => Response::error(
                id,
                "serialization_error",
                format!("Failed to serialize status: {}", err),
            ),
        },
        Method::GetEmotions => get_emotions(id, engine),
        Method::StartTask => match parse_emotion_params(request.params) {
            Ok(params) if params.then.is_empty() => {
                control(id, engine, engine.start_task(&params.emotion))
            }
            Ok(params) => {
                let mut sequence = Vec::with_capacity(params.then.len() + 1);
                sequence.push(params.emotion);
                sequence.extend(params.then);
                control(id, engine, engine.start_task_sequence(&sequence))
            }
            Err(err) => Response::error_with_info(id, err),
        },
        Method::AddTaskEmotion => match parse_single_emotion(request.params) {
            Ok(emotion) => control(id, engine, engine.add_task_emotion(&emotion)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::TriggerEmotion => match parse_single_emotion(request.params) {
            Ok(emotion) => control(id, engine, engine.trigger_emotion(&emotion)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::CompleteTask => control(id, engine, engine.complete_task()),
        Method::Sleep => control(id, engine, engine.sleep()),
        Method::Wake => control(id, engine, engine.wake()),
        Method::TransitionComplete => match parse_transition_complete(request.params) {
            Ok(params) => control(id, engine, engine.transition_complete(params.generation)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::Subscribe => return Reply::Subscribe { id },
    };
    Reply::Once(response)
}

/// `then` is only meaningful for `start_task`.
fn parse_single_emotion(params: Option<Value>) -> Result<String, ErrorInfo> {
    let parsed = parse_emotion_params(params)?;
    if !parsed.then.is_empty() {
        return Err(ErrorInfo::new(
            sage_avatar_protocol::ERROR_INVALID_PARAMS,
            "then is only accepted by start_task",
        ));
    }
    Ok(parsed.emotion)
}

fn control(
    id: Option<String>,
    engine: &Engine,
    result: Result<Outcome, AvatarError>,
) -> Response {
    match result {
        Ok(outcome) => {
            let status = serde_json::to_value(engine.status()).unwrap_or(Value::Null);
            Response::ok(
                id,
                json!({
                    "applied": outcome != Outcome::NoOp,
                    "transitioned": outcome.is_transition(),
                    "generation": outcome.generation(),
                    "status": status,
                }),
            )
        }
        Err(err) => {
            warn_rejected(&err);
            Response::error_with_info(id, ErrorInfo::from(&err))
        }
    }
}

fn warn_rejected(err: &AvatarError) {
    match err {
        AvatarError::CategoryNotFound(name) => {
            tracing::warn!(category = %name, "Rejected request for unknown category");
        }
        other => tracing::warn!(error = %other, "Control request failed"),
    }
}

fn get_emotions(id: Option<String>, engine: &Engine) -> Response {
    let catalog = engine.catalog();
    let emotions: Vec<EmotionSummary<'_>> = catalog
        .categories()
        .map(|category| EmotionSummary {
            name: category.name(),
            description: category.description(),
            use_cases: category.use_cases(),
            videos: category.assets().len(),
            total_weight: category.total_weight(),
        })
        .collect();
    tracing::debug!(emotions = emotions.len(), "Emotion listing");
    Response::ok(
        id,
        json!({
            "emotions": emotions,
            "default_emotion": catalog.default_emotion(),
        }),
    )
}
