mod member_list;
mod popup;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_search(frame, app, chunks[1]);
    member_list::render(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    let state = app.state();
    if state.show_retry_button {
        let message = state.error.as_deref().unwrap_or("Something went wrong");
        popup::render_retry(frame, message);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        format!("roster - {}", app.controller.selector()),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::styled(
        format!("  [{}]", app.controller.fetcher_name()),
        Style::default().fg(Color::Gray),
    ));
    if !app.selected.is_empty() {
        spans.push(Span::styled(
            format!("  {} selected", app.selected.len()),
            Style::default().fg(Color::Green),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_search(frame: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled("/ ", Style::default().fg(Color::DarkGray)),
        Span::raw(app.input.as_str()),
        Span::styled("█", Style::default().fg(Color::Gray)),
    ]);
    let search = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Search"));
    frame.render_widget(search, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let status = if let Some(error) = &state.error {
        Line::from(vec![Span::styled(
            format!("Error: {} (Ctrl-t: retry | Ctrl-e: dismiss)", error),
            Style::default().fg(Color::Red),
        )])
    } else if state.is_searching {
        Line::from(vec![Span::styled(
            "Searching...",
            Style::default().fg(Color::Yellow),
        )])
    } else if state.is_loading_recent {
        Line::from(vec![Span::styled(
            "Loading...",
            Style::default().fg(Color::Yellow),
        )])
    } else {
        Line::from(vec![Span::styled(
            "type: search | ↑/↓ PgUp/PgDn: nav | Enter: select | Tab: collection | Ctrl-r: refresh | Esc: done",
            Style::default().fg(Color::Gray),
        )])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}
