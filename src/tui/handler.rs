//! Event loop for the terminal UI.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use is_terminal::IsTerminal;
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    app::App,
    events::{Action, TuiEvent},
    ui::render_ui,
};
use crate::engine::ExecutionController;
use crate::utils::ScriptSource;

const PAGE: usize = 10;

/// Run `source` under the terminal UI until the user quits.
///
/// Must be called inside a [`tokio::task::LocalSet`].
pub async fn run_tui(controller: &ExecutionController, source: ScriptSource, tick: Duration) -> Result<()> {
    // Check if we're in a proper terminal environment
    if !io::stdout().is_terminal() {
        return Err(anyhow::anyhow!("the terminal UI requires a terminal; use --plain"));
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(source);
    let result = run_app(&mut terminal, &mut app, controller, tick).await;

    // Restore terminal
    disable_raw_mode()?;
    terminal.backend_mut().execute(DisableBracketedPaste)?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    controller: &ExecutionController,
    tick: Duration,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TuiEvent>();
    let stop = Arc::new(AtomicBool::new(false));

    // Spawn input handler
    let input_stop = stop.clone();
    tokio::task::spawn_blocking(move || {
        while !input_stop.load(Ordering::Relaxed) {
            if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let forwarded = match event::read() {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => TuiEvent::Key(key),
                Ok(Event::Paste(text)) => TuiEvent::Paste(text),
                Ok(Event::Resize(_, _)) => TuiEvent::Resize,
                _ => continue,
            };
            if event_tx.send(forwarded).is_err() {
                break; // Channel closed
            }
        }
    });

    let first = controller.start(app.source.text.clone());
    debug!(session = %first, "started first run");

    let result = loop {
        app.sync(controller);
        if let Err(e) = terminal.draw(|frame| render_ui(frame, app)) {
            break Err(e.into());
        }

        let mut quit = false;
        while let Ok(tui_event) = event_rx.try_recv() {
            let action = match tui_event {
                TuiEvent::Key(key) => handle_key_event(app, key),
                TuiEvent::Paste(text) => {
                    app.insert_str(&text);
                    Action::None
                }
                TuiEvent::Resize => Action::None,
            };
            if apply_action(app, controller, action) {
                quit = true;
                break;
            }
        }
        if quit {
            break Ok(());
        }

        // Small delay to prevent busy waiting
        tokio::time::sleep(tick).await;
    };

    stop.store(true, Ordering::Relaxed);
    controller.supersede();
    result
}

/// Carry out an action against the engine. Returns true to quit.
fn apply_action(app: &mut App, controller: &ExecutionController, action: Action) -> bool {
    match action {
        Action::None => {}
        Action::Run => {
            match app.source.reload() {
                Ok(true) => app.notice = Some("script reloaded".into()),
                Ok(false) => app.notice = None,
                Err(e) => {
                    warn!("reload failed: {e:#}");
                    app.notice = Some(format!("reload failed: {e}"));
                }
            }
            controller.start(app.source.text.clone());
            app.scroll_to_bottom();
        }
        Action::Stop => {
            if controller.supersede() {
                app.notice = Some("run stopped".into());
            }
        }
        Action::Clear => {
            controller.reset();
            app.notice = None;
        }
        Action::Submit(value) => {
            controller.submit_input(value);
            app.scroll_to_bottom();
        }
        Action::Quit => return true,
    }
    false
}

/// Map a key press to an edit of `app` and an engine action.
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> Action {
    // If help is shown, any key closes it
    if app.show_help {
        app.toggle_help();
        return Action::None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if !matches!(key.code, KeyCode::Char('c')) || !ctrl {
        app.last_ctrl_c_time = None;
    }

    match key.code {
        KeyCode::Char('c') if ctrl => {
            if app.handle_ctrl_c() {
                return Action::Quit;
            }
        }
        KeyCode::Char('r') if ctrl => return Action::Run,
        KeyCode::F(5) => return Action::Run,
        KeyCode::Char('x') if ctrl => return Action::Stop,
        KeyCode::Char('l') if ctrl => return Action::Clear,
        KeyCode::F(1) => app.toggle_help(),
        KeyCode::Enter => {
            if app.input.is_empty() && !app.status.awaiting_input() {
                return Action::None;
            }
            return Action::Submit(app.take_input());
        }
        KeyCode::Up => app.history_prev(),
        KeyCode::Down => app.history_next(),
        KeyCode::PageUp => app.scroll_up(PAGE),
        KeyCode::PageDown => app.scroll_down(PAGE),
        KeyCode::End if ctrl => app.scroll_to_bottom(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_home(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Esc => app.clear_input(),
        KeyCode::Char(c) if !ctrl => app.insert_char(c),
        _ => {}
    }
    Action::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineStatus, SessionId, SessionState};

    fn app() -> App {
        App::new(ScriptSource::inline("prompt('x')"))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            assert_eq!(handle_key_event(app, key(KeyCode::Char(c))), Action::None);
        }
    }

    #[test]
    fn enter_submits_typed_text() {
        let mut app = app();
        type_text(&mut app, "Ada");
        assert_eq!(handle_key_event(&mut app, key(KeyCode::Enter)), Action::Submit("Ada".into()));
        assert!(app.input.is_empty());
    }

    #[test]
    fn empty_enter_only_answers_a_waiting_prompt() {
        let mut app = app();
        assert_eq!(handle_key_event(&mut app, key(KeyCode::Enter)), Action::None);

        app.status = EngineStatus {
            session: Some(SessionId(1)),
            state: SessionState::AwaitingInput,
            prompt: Some("name?".into()),
        };
        assert_eq!(handle_key_event(&mut app, key(KeyCode::Enter)), Action::Submit(String::new()));
    }

    #[test]
    fn control_keys_map_to_engine_actions() {
        let mut app = app();
        assert_eq!(handle_key_event(&mut app, key(KeyCode::F(5))), Action::Run);
        assert_eq!(handle_key_event(&mut app, ctrl('r')), Action::Run);
        assert_eq!(handle_key_event(&mut app, ctrl('x')), Action::Stop);
        assert_eq!(handle_key_event(&mut app, ctrl('l')), Action::Clear);
        assert!(app.input.is_empty());
    }

    #[test]
    fn help_swallows_the_next_key() {
        let mut app = app();
        handle_key_event(&mut app, key(KeyCode::F(1)));
        assert!(app.show_help);
        assert_eq!(handle_key_event(&mut app, key(KeyCode::F(5))), Action::None);
        assert!(!app.show_help);
    }

    #[test]
    fn ctrl_c_twice_quits() {
        let mut app = app();
        assert_eq!(handle_key_event(&mut app, ctrl('c')), Action::None);
        assert_eq!(handle_key_event(&mut app, ctrl('c')), Action::Quit);
    }
}
