use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::app::App;
use crate::controller::Track;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let track = app.controller.active_track();
    let members = app.visible();

    let title = match track {
        Track::Recent => format!("Members ({})", members.len()),
        Track::Search => format!(
            "Results for \"{}\" ({})",
            state.current_search_query.trim(),
            members.len()
        ),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if members.is_empty() {
        let text = if state.is_loading_recent || state.is_searching {
            "Loading..."
        } else if track == Track::Search {
            "No members match"
        } else {
            "No members found"
        };
        let empty = Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let w = area.width.saturating_sub(2) as usize;
    let fixed = 18; // marker(2) + phone(14) + spaces(2)
    let flex = w.saturating_sub(fixed).max(10);

    let mut items: Vec<ListItem> = members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let style = if i == app.index {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let marker = if app.is_selected(member) { "● " } else { "  " };

            let line = Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::styled(format!("{:<flex$}", truncate(&member.name, flex)), style),
                Span::raw("  "),
                Span::styled(
                    format!("{:>14}", truncate(&member.phone_number, 14)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            ListItem::new(line)
        })
        .collect();

    if state.is_loading_more {
        items.push(ListItem::new(Line::from(Span::styled(
            "  Loading more...",
            Style::default().fg(Color::Yellow),
        ))));
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut list_state = ListState::default();
    list_state.select(Some(app.index));

    frame.render_stateful_widget(list, area, &mut list_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("Asha", 10), "Asha");
        assert_eq!(truncate("Kavita Sharma", 8), "Kavit...");
        assert_eq!(truncate("ललिता शर्मा", 5), "लल...");
    }
}
