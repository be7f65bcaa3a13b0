//! TUI application state management.

use std::time::{Duration, Instant};

use crate::engine::{EngineStatus, ExecutionController, OutputLine, TranscriptCursor};
use crate::utils::unicode::char_to_byte_index;
use crate::utils::ScriptSource;

/// Maximum transcript lines kept for display
const MAX_DISPLAY_LINES: usize = 5000;

/// Application state for the TUI
#[derive(Debug)]
pub struct App {
    /// Script shown in the source pane and started by Run
    pub source: ScriptSource,
    /// Transcript lines mirrored from the engine
    pub lines: Vec<OutputLine>,
    cursor: TranscriptCursor,
    /// Latest engine status
    pub status: EngineStatus,
    /// Input buffer
    pub input: String,
    /// Cursor position in input (character index)
    pub input_cursor: usize,
    /// Input history (submitted replies)
    pub input_history: Vec<String>,
    /// Current history index when navigating (None = new line)
    pub history_index: Option<usize>,
    /// Whether to show help
    pub show_help: bool,
    /// Scroll offset for the transcript, in lines from the bottom
    pub scroll_offset: usize,
    /// One-off message for the status bar
    pub notice: Option<String>,
    /// Timestamp of last Ctrl+C press for double Ctrl+C detection
    pub last_ctrl_c_time: Option<Instant>,
}

impl App {
    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            lines: Vec::new(),
            cursor: TranscriptCursor::new(),
            status: EngineStatus::default(),
            input: String::new(),
            input_cursor: 0,
            input_history: Vec::new(),
            history_index: None,
            show_help: false,
            scroll_offset: 0,
            notice: None,
            last_ctrl_c_time: None,
        }
    }

    /// Pull new transcript lines and the latest status from the engine.
    pub fn sync(&mut self, controller: &ExecutionController) {
        let (reset, fresh) = controller.read_transcript(&mut self.cursor);
        if reset {
            self.lines.clear();
            self.scroll_offset = 0;
        }
        if !fresh.is_empty() {
            // Keep the same lines in view while scrolled back
            if self.scroll_offset > 0 {
                self.scroll_offset += fresh.len();
            }
            self.lines.extend(fresh);
            if self.lines.len() > MAX_DISPLAY_LINES {
                self.lines.drain(0..self.lines.len() - MAX_DISPLAY_LINES);
            }
        }
        self.status = controller.status();
    }

    /// Toggle help display
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Reset scroll to bottom
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    // ----- Input editing helpers -----
    fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    pub fn move_cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.input_cursor < self.input_len() {
            self.input_cursor += 1;
        }
    }

    pub fn move_cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.input_cursor = self.input_len();
    }

    pub fn insert_char(&mut self, c: char) {
        let at = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(at, c);
        self.input_cursor += 1;
    }

    /// Paste keeps only the first line; a reply is a single line.
    pub fn insert_str(&mut self, text: &str) {
        let line = text.lines().next().unwrap_or_default();
        for c in line.chars() {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let at = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(at);
        }
    }

    pub fn delete(&mut self) {
        if self.input_cursor < self.input_len() {
            let at = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(at);
        }
    }

    /// Clear input buffers
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.input_cursor = 0;
        self.history_index = None;
    }

    /// Take the input line, recording it in history.
    pub fn take_input(&mut self) -> String {
        let line = std::mem::take(&mut self.input);
        self.push_history(line.clone());
        self.clear_input();
        line
    }

    pub fn push_history(&mut self, line: String) {
        if !line.trim().is_empty() && self.input_history.last().map(|s| s.as_str()) != Some(line.as_str()) {
            self.input_history.push(line);
        }
        self.history_index = None;
    }

    pub fn history_prev(&mut self) {
        if self.input_history.is_empty() {
            return;
        }
        let i = match self.history_index {
            None => self.input_history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.history_index = Some(i);
        self.input = self.input_history[i].clone();
        self.move_cursor_end();
    }

    pub fn history_next(&mut self) {
        match self.history_index {
            None => {}
            Some(i) if i + 1 < self.input_history.len() => {
                self.history_index = Some(i + 1);
                self.input = self.input_history[i + 1].clone();
                self.move_cursor_end();
            }
            Some(_) => self.clear_input(),
        }
    }

    /// Handle Ctrl+C press and detect double press for quit
    /// Returns true if should quit (double Ctrl+C), false otherwise
    pub fn handle_ctrl_c(&mut self) -> bool {
        const DOUBLE_CTRL_C_TIMEOUT: Duration = Duration::from_millis(500);

        let now = Instant::now();

        if let Some(last_time) = self.last_ctrl_c_time {
            if now.duration_since(last_time) <= DOUBLE_CTRL_C_TIMEOUT {
                // Double Ctrl+C detected - quit
                self.last_ctrl_c_time = None;
                return true;
            }
        }

        // Single Ctrl+C - clear input and record timestamp
        self.clear_input();
        self.notice = Some("Press Ctrl+C again to quit".into());
        self.last_ctrl_c_time = Some(now);

        false
    }

    /// Text for the status bar
    pub fn status_text(&self) -> String {
        let run = match self.status.session {
            Some(id) => format!("run {id}: {}", self.status.state),
            None => self.status.state.to_string(),
        };
        match &self.notice {
            Some(notice) => format!(" {run} | {notice}"),
            None => format!(" {run} | F5 run  Ctrl+X stop  Ctrl+L clear  F1 help"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(ScriptSource::inline("console.log(1)"))
    }

    #[test]
    fn editing_handles_multibyte_characters() {
        let mut app = app();
        for c in "héllo".chars() {
            app.insert_char(c);
        }
        app.move_cursor_left();
        app.move_cursor_left();
        app.backspace();
        assert_eq!(app.input, "hélo");
        app.move_cursor_home();
        app.delete();
        assert_eq!(app.input, "élo");
        assert_eq!(app.input_cursor, 0);
    }

    #[test]
    fn history_walks_back_and_forward() {
        let mut app = app();
        app.insert_str("first");
        assert_eq!(app.take_input(), "first");
        app.insert_str("second\nignored");
        assert_eq!(app.take_input(), "second");

        app.history_prev();
        assert_eq!(app.input, "second");
        app.history_prev();
        assert_eq!(app.input, "first");
        app.history_next();
        assert_eq!(app.input, "second");
        app.history_next();
        assert!(app.input.is_empty());
    }

    #[test]
    fn double_ctrl_c_quits() {
        let mut app = app();
        assert!(!app.handle_ctrl_c());
        assert!(app.handle_ctrl_c());
    }
}
