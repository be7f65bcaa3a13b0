//! UI layout and rendering logic for the TUI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::app::App;
use crate::engine::{LineKind, SessionState};
use crate::utils::unicode::display_width_to;

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Source and transcript
            Constraint::Length(3), // Input area
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(main_layout[0]);

    render_source_pane(frame, app, panes[0]);
    render_transcript(frame, app, panes[1]);
    render_input_area(frame, app, main_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    if app.show_help {
        render_help_overlay(frame);
    }
}

fn kind_style(kind: LineKind) -> Style {
    match kind {
        LineKind::System => Style::default().fg(Color::Cyan),
        LineKind::EchoInput => Style::default().fg(Color::Green),
        LineKind::ProgramOutput => Style::default(),
        LineKind::Error => Style::default().fg(Color::Red),
        LineKind::Success => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        LineKind::Debug => Style::default().fg(Color::DarkGray),
    }
}

/// Script text with line numbers
fn render_source_pane(frame: &mut Frame, app: &App, area: Rect) {
    let total = app.source.text.lines().count().max(1);
    let gutter = total.to_string().len();
    let number_style = Style::default().fg(Color::DarkGray);

    let lines: Vec<Line> = app
        .source
        .text
        .lines()
        .enumerate()
        .map(|(i, text)| {
            Line::from(vec![
                Span::styled(format!("{:>gutter$} ", i + 1), number_style),
                Span::raw(text.to_string()),
            ])
        })
        .collect();

    let paragraph = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(format!("Script - {}", app.source.label)));
    frame.render_widget(paragraph, area);
}

/// Render the output transcript
fn render_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let mut content_lines = Vec::new();
    for line in &app.lines {
        let style = kind_style(line.effective_kind());
        let prefix = if line.effective_kind() == LineKind::EchoInput { "> " } else { "" };
        // Multi-line console output keeps its own line breaks
        for part in line.text.split('\n') {
            content_lines.push(Line::from(vec![Span::styled(format!("{prefix}{part}"), style)]));
        }
    }

    let title = match app.status.session {
        Some(id) => format!("Output - run {id}"),
        None => "Output".to_string(),
    };

    // Calculate scrolling
    let available_height = area.height.saturating_sub(2) as usize; // Account for borders
    let total_lines = content_lines.len();

    let mut paragraph = Paragraph::new(Text::from(content_lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });

    if total_lines > available_height {
        // scroll_offset 0 follows the newest line
        let max_scroll = total_lines.saturating_sub(available_height);
        let actual_offset = app.scroll_offset.min(max_scroll);
        let scroll_y = max_scroll.saturating_sub(actual_offset) as u16;
        paragraph = paragraph.scroll((scroll_y, 0));
    }

    frame.render_widget(paragraph, area);
}

/// Render the input area
fn render_input_area(frame: &mut Frame, app: &App, area: Rect) {
    let (title, border) = match (&app.status.state, &app.status.prompt) {
        (SessionState::AwaitingInput, Some(prompt)) if !prompt.is_empty() => {
            (format!("Input - {prompt}"), Style::default().fg(Color::Yellow))
        }
        (SessionState::AwaitingInput, _) => ("Input".to_string(), Style::default().fg(Color::Yellow)),
        _ => ("Input (queued for the next prompt)".to_string(), Style::default()),
    };

    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(Block::default().borders(Borders::ALL).border_style(border).title(title));
    frame.render_widget(input_paragraph, area);

    if !app.show_help {
        let x = area.x + 1 + display_width_to(&app.input, app.input_cursor) as u16;
        let max_x = area.x + area.width.saturating_sub(2);
        frame.set_cursor_position((x.min(max_x), area.y + 1));
    }
}

/// Render the status bar
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let style = match app.status.state {
        SessionState::Failed => Style::default().bg(Color::Red).fg(Color::White),
        SessionState::AwaitingInput => Style::default().bg(Color::Yellow).fg(Color::Black),
        _ => Style::default().bg(Color::DarkGray).fg(Color::White),
    };
    frame.render_widget(Paragraph::new(app.status_text()).style(style), area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame) {
    let popup_area = centered_rect(70, 60, frame.area());

    // Clear the background
    frame.render_widget(Clear, popup_area);

    let help_lines = vec![
        Line::from("Keys"),
        Line::from(""),
        Line::from("Run:"),
        Line::from("  F5 / Ctrl+R   - Reload the script and run it"),
        Line::from("  Ctrl+X        - Stop the current run"),
        Line::from("  Ctrl+L        - Clear the output"),
        Line::from(""),
        Line::from("Input:"),
        Line::from("  Enter         - Answer the prompt (or queue an answer)"),
        Line::from("  ↑/↓           - Previous answers"),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  PgUp/PgDn     - Scroll output"),
        Line::from("  F1            - Toggle this help"),
        Line::from("  Ctrl+C twice  - Quit"),
    ];

    let help_paragraph = Paragraph::new(Text::from(help_lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .title_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(help_paragraph, popup_area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    use crate::utils::ScriptSource;

    #[test]
    fn renders_source_with_line_numbers() {
        let app = App::new(ScriptSource::inline("let a = 1;\nconsole.log(a);"));
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        terminal.draw(|frame| render_ui(frame, &app)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(screen.contains("1 let a = 1;"));
        assert!(screen.contains("2 console.log(a);"));
        assert!(screen.contains("queued for the next prompt"));
    }

    #[test]
    fn centered_rect_stays_inside() {
        let outer = Rect::new(0, 0, 100, 50);
        let inner = centered_rect(70, 60, outer);
        assert!(inner.x >= outer.x && inner.right() <= outer.right());
        assert!(inner.y >= outer.y && inner.bottom() <= outer.bottom());
    }
}
