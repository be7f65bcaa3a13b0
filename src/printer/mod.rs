//! Plain front-end: streams the transcript to stdout and answers prompts
//! from stdin.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::{ExecutionController, LineKind, OutputLine, SessionState, TranscriptCursor};

pub struct TextPrinter {
    pub color: bool,
    /// Print echo-input lines. Off when the terminal already echoed the reply.
    pub echo_input: bool,
}

impl TextPrinter {
    pub fn format(&self, line: &OutputLine) -> Option<String> {
        let kind = line.effective_kind();
        if kind == LineKind::EchoInput && !self.echo_input {
            return None;
        }
        let text = line.text.as_str();
        if !self.color {
            return Some(match kind {
                LineKind::EchoInput => format!("> {text}"),
                _ => text.to_string(),
            });
        }
        Some(match kind {
            LineKind::System => format!("{}", text.cyan()),
            LineKind::EchoInput => format!("{} {}", ">".green(), text.green()),
            LineKind::ProgramOutput => text.to_string(),
            LineKind::Error => format!("{}", text.red()),
            LineKind::Success => format!("{}", text.green()),
            LineKind::Debug => format!("{}", text.dimmed()),
        })
    }

    pub fn print(&self, line: &OutputLine) {
        if let Some(text) = self.format(line) {
            println!("{}", text);
        }
    }
}

/// Feed stdin lines into a channel from a blocking reader thread.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break; // Channel closed
            }
        }
    });
    rx
}

fn flush(controller: &ExecutionController, cursor: &mut TranscriptCursor, printer: &TextPrinter) {
    let (_, lines) = controller.read_transcript(cursor);
    for line in &lines {
        printer.print(line);
    }
    let _ = io::stdout().flush();
}

/// Run `source` to the end. `answer_from_stdin` is false when stdin carried
/// the script itself; a prompt then halts the run.
///
/// Must be called inside a [`tokio::task::LocalSet`].
pub async fn run_plain(
    controller: &ExecutionController,
    source: String,
    printer: &TextPrinter,
    answer_from_stdin: bool,
) -> Result<SessionState> {
    let mut replies = if answer_from_stdin { Some(spawn_stdin_reader()) } else { None };
    let mut stdin_closed = false;
    let mut status = controller.subscribe();
    let mut cursor = TranscriptCursor::new();
    let id = controller.start(source);

    let final_state = loop {
        flush(controller, &mut cursor, printer);
        let current = controller.status();
        if current.session != Some(id) || current.state.is_terminal() {
            break current.state;
        }

        if current.awaiting_input() && (replies.is_none() || stdin_closed) {
            warn!("script asked for input but stdin is not available");
            eprintln!("{}", "promptrun: the script asked for input but stdin is not available".red());
            controller.supersede();
            continue;
        }

        tokio::select! {
            reply = async { replies.as_mut()?.recv().await }, if current.awaiting_input() => match reply {
                Some(reply) => controller.submit_input(reply),
                None => stdin_closed = true,
            },
            _ = status.changed() => {}
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    };

    flush(controller, &mut cursor, printer);
    Ok(final_state)
}
