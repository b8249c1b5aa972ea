//! Ratatui front-end: chat transcript, quick-reply bar, input line, status.
//!
//! The drawing loop polls worker jobs between frames; all state mutation
//! stays on this thread.

use crate::app::{App, SendState};
use crate::conversation::{Mode, Role};
use crate::terminal_restore::TerminalRestoreGuard;
use crate::text::{ellipsize, wrap_columns};
use crate::voice::RecognitionState;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Paragraph},
    Terminal,
};
use std::io;
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

/// Configure the terminal, run the drawing loop, and tear everything down.
pub fn run_app(app: &mut App) -> Result<()> {
    let terminal_guard = TerminalRestoreGuard::new();
    terminal_guard.enable_raw_mode()?;
    let mut stdout = io::stdout();
    terminal_guard.enter_alt_screen(&mut stdout)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app_loop(&mut terminal, app);

    app.shutdown();
    drop(terminal);
    terminal_guard.restore();

    result
}

/// Core event/render loop.
fn app_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    terminal.draw(|frame| draw(frame, app))?;

    loop {
        app.poll_chat_job();
        app.poll_voice_job();
        app.poll_locate_job();
        app.poll_speaker();

        let has_active_job = app.has_active_jobs();
        let poll_duration = if has_active_job {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(100)
        };

        // Always draw while a job runs so streaming text and the metronome
        // counter stay live.
        let mut should_draw = app.take_redraw_request() || has_active_job;
        let mut should_quit = false;

        if event::poll(poll_duration)? {
            match event::read()? {
                Event::Key(key) => {
                    should_quit = handle_key_event(app, key);
                    should_draw = true;
                }
                Event::Resize(_, _) => {
                    should_draw = true;
                }
                _ => {}
            }
        }

        if should_draw {
            terminal.draw(|frame| draw(frame, app))?;
        }

        if should_quit {
            break;
        }
    }
    Ok(())
}

/// Map a quick-reply chord (Alt+1..Alt+9) to an option index.
fn quick_reply_index(key: &KeyEvent) -> Option<usize> {
    if !key.modifiers.contains(KeyModifiers::ALT) {
        return None;
    }
    match key.code {
        KeyCode::Char(c @ '1'..='9') => Some(c as usize - '1' as usize),
        _ => None,
    }
}

/// Interpret keystrokes into modifications to the shared `App` state.
/// Returns true when the app should exit.
fn handle_key_event(app: &mut App, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if let Some(index) = quick_reply_index(&key) {
        app.select_quick_reply(index);
        return false;
    }

    match key.code {
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_listening();
        }
        KeyCode::Char('v') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_voice_output();
        }
        KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.trigger_emergency();
        }
        KeyCode::Char('g') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.end_emergency();
        }
        KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_metronome();
        }
        KeyCode::Enter => app.submit_input(),
        KeyCode::Backspace => app.backspace_input(),
        KeyCode::Esc => app.clear_input(),
        KeyCode::Char(c) => {
            if !key.modifiers.contains(KeyModifiers::CONTROL) {
                app.push_input_char(c);
            }
        }
        KeyCode::Delete => app.clear_input(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::PageUp => {
            for _ in 0..10 {
                app.scroll_up();
            }
        }
        KeyCode::PageDown => {
            for _ in 0..10 {
                app.scroll_down();
            }
        }
        KeyCode::Home => app.scroll_to_top(),
        KeyCode::End => app.scroll_to_bottom(),
        _ => {}
    }

    false
}

struct Palette {
    border: Color,
    title: Color,
    dim: Color,
    body: Color,
    input: Color,
    user: Color,
}

fn palette(mode: Mode) -> Palette {
    match mode {
        Mode::Emergency => Palette {
            border: Color::Rgb(255, 90, 90),
            title: Color::Rgb(255, 110, 110),
            dim: Color::Rgb(130, 70, 70),
            body: Color::Rgb(235, 215, 210),
            input: Color::Rgb(255, 220, 100),
            user: Color::Rgb(255, 170, 140),
        },
        Mode::General => Palette {
            border: Color::Rgb(90, 140, 255),
            title: Color::Rgb(120, 160, 255),
            dim: Color::Rgb(70, 90, 130),
            body: Color::Rgb(205, 210, 220),
            input: Color::Rgb(255, 220, 100),
            user: Color::Rgb(140, 190, 255),
        },
    }
}

/// Render transcript, quick replies, prompt, and status bars.
pub fn draw(frame: &mut ratatui::Frame<'_>, app: &App) {
    let has_replies = !app.quick_replies().is_empty();
    let mut constraints = vec![Constraint::Min(5)];
    if has_replies {
        constraints.push(Constraint::Length(1));
    }
    constraints.push(Constraint::Length(3));
    constraints.push(Constraint::Length(2));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.size());
    let transcript_area = chunks[0];
    let replies_area = has_replies.then(|| chunks[1]);
    let input_area = chunks[chunks.len() - 2];
    let status_area = chunks[chunks.len() - 1];

    let colors = palette(app.mode());
    let wrap_width = usize::from(transcript_area.width.saturating_sub(2)).max(8);

    let mut lines: Vec<Line> = Vec::new();
    for message in app.conversation().messages() {
        let (label, label_color) = match message.role {
            Role::User => ("You".to_string(), colors.user),
            Role::Assistant => (
                message
                    .model
                    .clone()
                    .unwrap_or_else(|| "Assistant".to_string()),
                colors.title,
            ),
            Role::System => ("System".to_string(), colors.dim),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default()
                .fg(label_color)
                .add_modifier(Modifier::BOLD),
        )));
        for wrapped in wrap_columns(&message.content, wrap_width) {
            lines.push(Line::from(Span::styled(
                wrapped,
                Style::default().fg(colors.body),
            )));
        }
        lines.push(Line::from(""));
    }
    if matches!(app.send_state(), SendState::Sending) {
        lines.push(Line::from(Span::styled(
            "Thinking...",
            Style::default().fg(colors.dim),
        )));
    }

    let max_offset = lines.len().saturating_sub(1).min(u16::MAX as usize) as u16;
    let scroll = app.scroll_offset().min(max_offset);

    let title = match app.mode() {
        Mode::Emergency => " EMERGENCY GUIDANCE ",
        Mode::General => " Medical Assistant ",
    };
    let transcript = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(colors.border))
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(colors.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
        .scroll((scroll, 0));
    frame.render_widget(transcript, transcript_area);

    if let Some(area) = replies_area {
        let mut spans = Vec::new();
        for (i, option) in app.quick_replies().iter().enumerate().take(9) {
            spans.push(Span::styled(
                format!(" Alt+{} ", i + 1),
                Style::default()
                    .fg(colors.input)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!("{} ", ellipsize(option, 24)),
                Style::default().fg(colors.body),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    let input_title = if matches!(app.recognition_state(), RecognitionState::Listening) {
        " Listening... "
    } else {
        " Message "
    };
    let input = Paragraph::new(app.input_text())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(colors.border))
                .title(Span::styled(
                    input_title,
                    Style::default()
                        .fg(colors.title)
                        .add_modifier(Modifier::BOLD),
                ))
                .title_bottom(Line::from(vec![
                    Span::styled(" Ctrl+R ", Style::default().fg(colors.input)),
                    Span::styled("voice  ", Style::default().fg(colors.dim)),
                    Span::styled("Ctrl+E ", Style::default().fg(colors.input)),
                    Span::styled("emergency  ", Style::default().fg(colors.dim)),
                    Span::styled("Ctrl+P ", Style::default().fg(colors.input)),
                    Span::styled("metronome ", Style::default().fg(colors.dim)),
                ])),
        )
        .style(Style::default().fg(colors.input));
    frame.render_widget(input, input_area);

    let status = Paragraph::new(ellipsize(
        &status_line(app),
        usize::from(status_area.width.saturating_sub(2)),
    ))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(colors.dim)),
    )
    .style(Style::default().fg(colors.dim));
    frame.render_widget(status, status_area);

    let inner_width = input_area.width.saturating_sub(2);
    let input_width =
        UnicodeWidthStr::width(app.input_text()).min(u16::MAX as usize) as u16;
    let cursor_x = input_area.x.saturating_add(1) + input_width.min(inner_width);
    frame.set_cursor(cursor_x, input_area.y + 1);
}

fn status_line(app: &App) -> String {
    let mut badges = Vec::new();
    match app.recognition_state() {
        RecognitionState::Listening => badges.push("listening".to_string()),
        RecognitionState::Stopping => badges.push("finishing capture".to_string()),
        RecognitionState::Idle => {}
    }
    if app.voice_output_enabled() {
        badges.push("voice out".to_string());
    }
    if app.metronome_running() {
        badges.push(format!("metronome {}", app.metronome_compressions()));
    }
    if let Some(user) = app.signed_in_user() {
        badges.push(format!("user {user}"));
    }
    if badges.is_empty() {
        app.status_text().to_string()
    } else {
        format!("{}  [{}]", app.status_text(), badges.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use clap::Parser;

    fn test_app() -> App {
        let session_file = std::env::temp_dir().join(format!(
            "aidterm_ui_test_{}_{:?}.yaml",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut config = AppConfig::parse_from([
            "test-app",
            "--base-url",
            "http://127.0.0.1:1",
            "--session-file",
            session_file.to_str().expect("utf-8 temp path"),
        ]);
        config.validate().expect("config validates");
        App::new(config).expect("app builds")
    }

    #[test]
    fn handle_key_event_appends_and_backspaces() {
        let mut app = test_app();
        handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('a'), KeyModifiers::empty()),
        );
        assert_eq!(app.input_text(), "a");

        handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Backspace, KeyModifiers::empty()),
        );
        assert_eq!(app.input_text(), "");
    }

    #[test]
    fn ctrl_c_requests_quit() {
        let mut app = test_app();
        let quit = handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );
        assert!(quit);
    }

    #[test]
    fn alt_digits_map_to_quick_reply_indices() {
        let alt_one = KeyEvent::new(KeyCode::Char('1'), KeyModifiers::ALT);
        assert_eq!(quick_reply_index(&alt_one), Some(0));

        let alt_nine = KeyEvent::new(KeyCode::Char('9'), KeyModifiers::ALT);
        assert_eq!(quick_reply_index(&alt_nine), Some(8));

        let plain_one = KeyEvent::new(KeyCode::Char('1'), KeyModifiers::empty());
        assert_eq!(quick_reply_index(&plain_one), None);
    }

    #[test]
    fn plain_digits_type_into_the_input() {
        let mut app = test_app();
        handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('1'), KeyModifiers::empty()),
        );
        assert_eq!(app.input_text(), "1");
    }
}
