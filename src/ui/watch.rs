use crate::api::{Comment, VideoDetail};
use crate::app::{App, WatchState};
use crate::playback::{PlaybackStatus, SurfaceSnapshot};
use crate::util::{format_count, strip_control_chars};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use super::helpers::spinner;

/// Format a timestamp relative to now ("5m", "3h", "2d", "Mar 04").
pub fn format_relative_time(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return String::new();
    };
    let diff = (Utc::now() - at).num_seconds();

    if diff < 0 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    at.format("%b %d").to_string()
}

/// Render the watch view: video header, player panel and comments.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    // EDGE-001: Guard against zero-width/height areas
    if area.width < 3 || area.height < 3 {
        return;
    }

    let detail = match &app.watch {
        Some(WatchState::Loaded(detail)) => detail,
        Some(WatchState::Loading { video_id }) => {
            let text = format!("{} Loading video {}...", spinner(app.spinner_frame), video_id);
            render_message(f, area, &text, Style::default().fg(Color::DarkGray));
            return;
        }
        Some(WatchState::NotFound { video_id }) => {
            let text = format!("Video not found: {}\n\nPress Esc to go back", video_id);
            render_message(f, area, &text, Style::default().fg(Color::Yellow));
            return;
        }
        Some(WatchState::Failed { error, .. }) => {
            let text = format!(
                "Failed to load video: {}\n\nPress r to retry, Esc to go back",
                error
            );
            render_message(f, area, &text, Style::default().fg(Color::Red));
            return;
        }
        None => {
            render_message(f, area, "No video selected", Style::default());
            return;
        }
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(area);

    render_header(f, detail, chunks[0]);
    render_player(f, app, chunks[1]);
    render_comments(f, app, &detail.comments, chunks[2]);
}

fn render_message(f: &mut Frame, area: Rect, text: &str, style: Style) {
    let paragraph = Paragraph::new(text.to_string())
        .style(style)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Watch"));
    f.render_widget(paragraph, area);
}

fn render_header(f: &mut Frame, detail: &VideoDetail, area: Rect) {
    let mut stats = vec![strip_control_chars(&detail.channel.name).into_owned()];
    if let Some(views) = detail.views_count {
        stats.push(format!("{} views", format_count(views)));
    }
    if let Some(likes) = detail.likes_count {
        stats.push(format!("{} likes", format_count(likes)));
    }
    if !detail.resolutions.is_empty() {
        stats.push(detail.resolutions.join("/"));
    }

    let mut lines = vec![
        Line::from(Span::styled(
            strip_control_chars(&detail.title).into_owned(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(stats.join(" • "), Style::default().fg(Color::DarkGray))),
    ];
    if let Some(description) = &detail.description {
        lines.push(Line::from(strip_control_chars(description).into_owned()));
    }

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(paragraph, area);
}

fn render_player(f: &mut Frame, app: &App, area: Rect) {
    let status = app.player.status();
    let (symbol, style) = match status {
        PlaybackStatus::Playing => ('▶', Style::default().fg(Color::Green)),
        PlaybackStatus::Ready => ('⏸', Style::default().fg(Color::Yellow)),
        PlaybackStatus::Attaching => (spinner(app.spinner_frame), Style::default().fg(Color::Cyan)),
        PlaybackStatus::Failed => ('✖', Style::default().fg(Color::Red)),
        PlaybackStatus::Idle | PlaybackStatus::Detached => {
            ('■', Style::default().fg(Color::DarkGray))
        }
    };

    let mut lines = vec![Line::from(Span::styled(
        format!("{} {}", symbol, status.label()),
        style.add_modifier(Modifier::BOLD),
    ))];

    if let Some(source) = app.player.source() {
        lines.push(Line::from(Span::styled(
            source.to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if let Some(manifest) = app.player.manifest() {
        lines.push(Line::from(describe_manifest(manifest)));
    }
    if status == PlaybackStatus::Failed {
        if let Some(e) = app.player.last_error() {
            lines.push(Line::from(Span::styled(
                format!("{} (r to retry)", e),
                Style::default().fg(Color::Red),
            )));
        }
    }
    lines.push(Line::from(Span::styled(
        describe_surface(&app.surface.snapshot()),
        Style::default().fg(Color::DarkGray),
    )));

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Player"));
    f.render_widget(paragraph, area);
}

fn describe_manifest(manifest: &crate::playback::ManifestSummary) -> String {
    if !manifest.is_master() {
        return format!("Single rendition, {} segments", manifest.segments);
    }
    let renditions: Vec<&str> = manifest
        .variants
        .iter()
        .map(|v| v.resolution.as_deref().unwrap_or("?"))
        .collect();
    format!("{} renditions: {}", renditions.len(), renditions.join(", "))
}

fn describe_surface(snapshot: &SurfaceSnapshot) -> &'static str {
    match (snapshot.engine_source.is_some(), snapshot.native_source.is_some()) {
        (true, _) => "Surface: streaming engine",
        (_, true) => "Surface: native",
        _ => "Surface: unbound",
    }
}

fn render_comments(f: &mut Frame, app: &App, comments: &[Comment], area: Rect) {
    let items: Vec<ListItem> = if comments.is_empty() {
        vec![ListItem::new(Span::styled(
            "No comments",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        comments
            .iter()
            .skip(app.comment_scroll)
            .map(|comment| {
                let when = format_relative_time(comment.created_at);
                let mut header = vec![Span::styled(
                    strip_control_chars(&comment.author).into_owned(),
                    Style::default().fg(Color::Cyan),
                )];
                if !when.is_empty() {
                    header.push(Span::styled(
                        format!("  {}", when),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                ListItem::new(vec![
                    Line::from(header),
                    Line::from(strip_control_chars(&comment.text).into_owned()),
                ])
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Comments ({})", comments.len())),
    );
    f.render_widget(list, area);
}
