//! Custom event types for TUI application.

use crossterm::event::KeyEvent;

/// Terminal events forwarded from the input thread
#[derive(Debug)]
pub enum TuiEvent {
    /// User keyboard input
    Key(KeyEvent),
    /// Bracketed paste content
    Paste(String),
    /// Terminal was resized
    Resize,
}

/// What a key press asks the engine to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Reload the script and start a new run
    Run,
    /// Supersede the active run
    Stop,
    /// Reset the transcript
    Clear,
    /// Reply to the pending prompt, or queue a reply
    Submit(String),
    Quit,
}
