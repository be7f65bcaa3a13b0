use std::fmt;

use thiserror::Error;

/// Where an uncaught failure escaped, rendered as ` (line N)` when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location(pub Option<usize>);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(line) => write!(f, " (line {line})"),
            None => Ok(()),
        }
    }
}

/// Every way a run can end other than completing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (line {line}, column {column})")]
    Syntax { message: String, line: usize, column: usize },

    #[error("{message}{location}")]
    Uncaught { message: String, location: Location },

    #[error("InputError: prompt() must be awaited; write `await prompt(...)` inside an async function or at the top level")]
    InputNotAwaited,

    /// The run was superseded. Never shown to the user.
    #[error("execution cancelled")]
    Cancelled,
}

impl ScriptError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled)
    }
}
