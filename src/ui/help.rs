//! Help overlay listing the key bindings of both views.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Row, Table},
    Frame,
};

const SECTIONS: [(&str, &[(&str, &str)]); 3] = [
    (
        "Feed",
        &[
            ("j / Down", "Next video"),
            ("k / Up", "Previous video"),
            ("PgDn / Space", "Page down"),
            ("PgUp", "Page up"),
            ("g / G", "First / last loaded video"),
            ("Enter", "Watch selected video"),
            ("r", "Retry loading more videos"),
            ("R", "Reload feed from the start"),
        ],
    ),
    (
        "Watch",
        &[
            ("Esc / b", "Back to feed"),
            ("Space / p", "Play / pause"),
            ("r", "Retry video or stream"),
            ("j / k", "Scroll comments"),
        ],
    ),
    (
        "General",
        &[("?", "Toggle this help"), ("q / Ctrl+c", "Quit")],
    ),
];

/// Render the help overlay on top of the current view.
pub fn render(f: &mut Frame) {
    let overlay = centered_rect(60, 80, f.area());
    if overlay.width < 20 || overlay.height < 6 {
        return;
    }
    f.render_widget(Clear, overlay);

    let mut rows: Vec<Row> = Vec::new();
    for (label, bindings) in SECTIONS {
        if !rows.is_empty() {
            rows.push(Row::new(vec![String::new(), String::new()]));
        }
        rows.push(Row::new(vec![
            Line::from(Span::styled(
                format!("-- {} --", label),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ]));
        for (key, description) in bindings {
            rows.push(Row::new(vec![format!("  {}", key), description.to_string()]));
        }
    }

    let table = Table::new(rows, [Constraint::Length(16), Constraint::Min(20)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Help (? to close) "),
    );
    f.render_widget(table, overlay);
}

/// Create a centered rectangle with the given percentage of the parent area.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let width = area.width * percent_x / 100;
    let height = area.height * percent_y / 100;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
