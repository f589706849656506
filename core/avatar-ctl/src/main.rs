//! sage-avatar: command-line client for the Sage avatar daemon.
//!
//! Sends control requests to the running daemon and prints the JSON it
//! returns. `watch` subscribes and prints each clip change as a JSON line.
//!
//! ## Subcommands
//!
//! - `status`, `health`, `emotions`: read-only queries
//! - `start-task`, `add-emotion`, `complete-task`, `trigger`: task flow
//! - `sleep`, `wake`, `ended`: two-stage sleep handling
//! - `watch`: follow the push stream

mod client;
mod logging;

use clap::{Parser, Subcommand};
use sage_avatar_protocol::{Method, PushMessage, VideoKind};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sage-avatar")]
#[command(about = "Control the Sage avatar daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what is playing and what is queued
    Status,

    /// Check that the daemon is up
    Health,

    /// List the catalog's categories
    Emotions,

    /// Start a task with one or more emotions played in order
    StartTask {
        #[arg(value_name = "EMOTION", required = true)]
        emotions: Vec<String>,
    },

    /// Queue an emotion behind the current task (starts one if idle)
    AddEmotion {
        #[arg(value_name = "EMOTION")]
        emotion: String,
    },

    /// Finish the current task and return to idle
    CompleteTask,

    /// Play a one-off emotion, dropping any queued task emotions
    Trigger {
        #[arg(value_name = "EMOTION")]
        emotion: String,
    },

    /// Begin the sleep transition
    Sleep,

    /// Begin the wake transition
    Wake,

    /// Report that the transition clip shown at GENERATION finished playing
    Ended {
        #[arg(value_name = "GENERATION")]
        generation: u64,
    },

    /// Print every video change as a JSON line
    Watch {
        /// Act as a viewer: report the end of each sleep/wake transition clip
        #[arg(long)]
        ack_transitions: bool,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Status => print_call(Method::GetStatus, None),
        Commands::Health => print_call(Method::GetHealth, None),
        Commands::Emotions => print_call(Method::GetEmotions, None),
        Commands::StartTask { emotions } => {
            let mut emotions = emotions.into_iter();
            let first = emotions.next().unwrap_or_default();
            let then: Vec<String> = emotions.collect();
            print_call(
                Method::StartTask,
                Some(json!({ "emotion": first, "then": then })),
            )
        }
        Commands::AddEmotion { emotion } => print_call(
            Method::AddTaskEmotion,
            Some(json!({ "emotion": emotion })),
        ),
        Commands::CompleteTask => print_call(Method::CompleteTask, None),
        Commands::Trigger { emotion } => print_call(
            Method::TriggerEmotion,
            Some(json!({ "emotion": emotion })),
        ),
        Commands::Sleep => print_call(Method::Sleep, None),
        Commands::Wake => print_call(Method::Wake, None),
        Commands::Ended { generation } => print_call(
            Method::TransitionComplete,
            Some(json!({ "generation": generation })),
        ),
        Commands::Watch { ack_transitions } => watch(ack_transitions),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "sage-avatar command failed");
        eprintln!("sage-avatar: {}", err);
        std::process::exit(1);
    }
}

fn print_call(method: Method, params: Option<Value>) -> Result<(), String> {
    let data = client::call(method, params)?;
    let rendered = serde_json::to_string_pretty(&data)
        .map_err(|err| format!("Failed to render response: {}", err))?;
    println!("{}", rendered);
    Ok(())
}

fn watch(ack_transitions: bool) -> Result<(), String> {
    let mut stream = client::Watch::open()?;
    while let Some(message) = stream.next_message()? {
        let line = serde_json::to_string(&message)
            .map_err(|err| format!("Failed to render push message: {}", err))?;
        println!("{}", line);

        if ack_transitions {
            let PushMessage::VideoChange(change) = &message;
            if matches!(change.kind, VideoKind::Sleep | VideoKind::Wake) && !change.looping {
                let remaining = (change.duration - change.elapsed).max(0.0);
                schedule_ack(change.generation, Duration::from_secs_f64(remaining));
            }
        }
    }
    tracing::info!("Daemon closed the push stream");
    Ok(())
}

fn schedule_ack(generation: u64, after: Duration) {
    thread::spawn(move || {
        thread::sleep(after);
        if let Err(err) = client::call(
            Method::TransitionComplete,
            Some(json!({ "generation": generation })),
        ) {
            tracing::warn!(error = %err, generation, "Failed to report transition end");
        }
    });
}
