use crate::api::VideoDescriptor;
use crate::app::{App, FEED_SENTINEL};
use crate::util::{display_width, strip_control_chars, truncate_to_width};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

use super::helpers::spinner;

const SKELETON: &str = "░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░";

/// Render the feed list and report the sentinel row's visibility.
///
/// The sentinel row sits after the last loaded item while more pages exist.
/// Reporting it here is what drives infinite scroll: the observer fires the
/// feed trigger when the row enters the viewport.
pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    // EDGE-001: Guard against zero-width/height areas
    if area.width < 3 || area.height < 3 {
        return;
    }

    let viewport_rows = area.height.saturating_sub(2) as usize;
    let sentinel_ratio = app.scroll_feed_into_view(viewport_rows);
    let width = area.width.saturating_sub(2) as usize;

    let items = app.feed.items();
    let has_more = app.feed.has_more();
    let in_flight = app.feed.in_flight();

    let rows: Vec<ListItem> = if items.is_empty() && in_flight {
        // First page still loading
        let dim = Style::default().fg(Color::DarkGray);
        (0..app.skeleton_rows.min(viewport_rows))
            .map(|_| {
                ListItem::new(Span::styled(
                    truncate_to_width(SKELETON, width).into_owned(),
                    dim,
                ))
            })
            .collect()
    } else if items.is_empty() && !has_more {
        vec![ListItem::new("No videos")]
    } else {
        let mut rows: Vec<ListItem> = items
            .iter()
            .enumerate()
            .skip(app.feed_scroll)
            .take(viewport_rows)
            .map(|(i, video)| video_row(video, i == app.selected, width))
            .collect();
        if has_more && rows.len() < viewport_rows {
            rows.push(sentinel_row(app, width));
        }
        rows
    };

    let count = if has_more {
        format!("{}+", items.len())
    } else {
        items.len().to_string()
    };
    let list = List::new(rows).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!("Videos ({})", count)),
    );
    f.render_widget(list, area);

    app.observer.report(FEED_SENTINEL, sentinel_ratio);
}

fn video_row(video: &VideoDescriptor, selected: bool, width: usize) -> ListItem<'static> {
    let title = strip_control_chars(&video.title);
    let channel = strip_control_chars(&video.channel_name);

    // Channel gets at most a third of the row
    let channel_width = (width / 3).max(8);
    let channel = truncate_to_width(&channel, channel_width).into_owned();
    let title_width = width.saturating_sub(display_width(&channel) + 3);
    let title = truncate_to_width(&title, title_width).into_owned();

    let title_style = if selected {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };

    ListItem::new(Line::from(vec![
        Span::styled(title, title_style),
        Span::styled(format!(" · {}", channel), Style::default().fg(Color::Gray)),
    ]))
}

fn sentinel_row(app: &App, width: usize) -> ListItem<'static> {
    let (text, style) = if app.feed.in_flight() {
        (
            format!("{} Loading more videos...", spinner(app.spinner_frame)),
            Style::default().fg(Color::DarkGray),
        )
    } else if app.feed.last_error().is_some() {
        (
            "Failed to load more videos (r to retry)".to_string(),
            Style::default().fg(Color::Red),
        )
    } else {
        ("···".to_string(), Style::default().fg(Color::DarkGray))
    };
    ListItem::new(Span::styled(truncate_to_width(&text, width).into_owned(), style))
}
