use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

/// Centered popup offering to retry a failed load.
pub fn render_retry(frame: &mut Frame, message: &str) {
    let area = centered_rect(60, 8, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(message, Style::default().fg(Color::Red))),
        Line::from(""),
        Line::from(vec![
            Span::styled("[Ctrl-t]", Style::default().fg(Color::Green)),
            Span::raw(" retry  "),
            Span::styled("[Ctrl-e]", Style::default().fg(Color::DarkGray)),
            Span::raw(" dismiss"),
        ]),
    ];

    let popup = Paragraph::new(lines)
        .block(
            Block::default().borders(Borders::ALL).title(Span::styled(
                " Loading failed ",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
        )
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    frame.render_widget(popup, area);
}

/// A `width` x `height` rect centered in `outer`, shrunk to fit.
fn centered_rect(width: u16, height: u16, outer: Rect) -> Rect {
    let width = width.min(outer.width);
    let height = height.min(outer.height);
    let [_, row, _] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(outer.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .areas(outer);
    let [_, area, _] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(outer.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .areas(row);
    area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_is_centered() {
        let area = centered_rect(20, 4, Rect::new(0, 0, 100, 40));
        assert_eq!(area, Rect::new(40, 18, 20, 4));
    }

    #[test]
    fn centered_rect_shrinks_to_fit() {
        let area = centered_rect(60, 8, Rect::new(0, 0, 30, 5));
        assert_eq!(area, Rect::new(0, 0, 30, 5));
    }
}
