//! The interactive execution engine: one script at a time, with output
//! captured into a transcript, input brokered to a human, and supersession
//! when a new run is requested.

mod broker;
mod controller;
mod error;
mod runtime;
mod sandbox;
mod session;
mod transcript;

use std::time::Duration;

use crate::config::Config;
use crate::script::InterpreterOptions;

pub use broker::{Acquire, InputBroker, InputReply, InputRequest, Submitted};
pub use controller::ExecutionController;
pub use error::{Location, ScriptError};
pub use runtime::{engine_runtime, engine_thread, run_on_engine_thread, ENGINE_STACK_SIZE};
pub use session::{ExecutionSession, SessionId, SessionState, TimerSet};
pub use transcript::{classify, CursorRead, LineKind, OutputLine, Transcript, TranscriptCursor};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest delay `setTimeout`/`setInterval` accept.
    pub timer_ceiling: Duration,
    /// Pause between superseding a run and evaluating the next one.
    pub grace_delay: Duration,
    pub interpreter: InterpreterOptions,
    /// Mirror every transcript line to the `promptrun::transcript` log target.
    pub mirror_transcript: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timer_ceiling: Duration::from_millis(30_000),
            grace_delay: Duration::from_millis(100),
            interpreter: InterpreterOptions::default(),
            mirror_transcript: false,
        }
    }
}

impl EngineConfig {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| cfg.get_u64(key).map(Duration::from_millis).unwrap_or(fallback);
        Self {
            timer_ceiling: millis("TIMER_CEILING_MS", defaults.timer_ceiling),
            grace_delay: millis("GRACE_DELAY_MS", defaults.grace_delay),
            interpreter: InterpreterOptions {
                yield_interval: cfg.get_u64("YIELD_INTERVAL").unwrap_or(defaults.interpreter.yield_interval),
                max_call_depth: cfg
                    .get_u64("MAX_CALL_DEPTH")
                    .map(|n| n as usize)
                    .unwrap_or(defaults.interpreter.max_call_depth),
            },
            mirror_transcript: cfg.get_bool("MIRROR_TRANSCRIPT"),
        }
    }
}

/// Snapshot published to front-ends whenever the engine changes state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub session: Option<SessionId>,
    pub state: SessionState,
    /// Prompt text while a request is pending.
    pub prompt: Option<String>,
}

impl EngineStatus {
    pub fn awaiting_input(&self) -> bool {
        self.state == SessionState::AwaitingInput
    }
}
