//! Input handling for the TUI.
//!
//! Dispatches key presses to the feed or watch view handler.

use crate::app::{App, AppEvent, View};
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::helpers::{open_selected_video, retry_watch};
use super::Action;

/// Main input dispatch function.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Action {
    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    // Help overlay captures all keys while visible
    if app.show_help {
        if matches!(code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.show_help = false;
        }
        return Action::Continue;
    }

    match app.view {
        View::Feed => handle_feed_input(app, code, event_tx),
        View::Watch => handle_watch_input(app, code, event_tx),
    }
}

fn handle_feed_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Char('j') | KeyCode::Down => app.nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.nav_up(),
        KeyCode::PageDown | KeyCode::Char(' ') => app.page_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::Char('g') | KeyCode::Home => app.jump_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.jump_to_bottom(),
        KeyCode::Enter => {
            open_selected_video(app, event_tx);
        }
        KeyCode::Char('r') => {
            // Manual retry after a failed page; the paginator ignores it
            // while a request is in flight or the feed is exhausted.
            if app.load_more(event_tx) {
                app.set_status("Loading more videos...");
            } else if !app.feed.has_more() {
                app.set_status("End of feed");
            }
        }
        KeyCode::Char('R') => app.refresh_feed(event_tx),
        _ => {}
    }
    Action::Continue
}

fn handle_watch_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Esc | KeyCode::Char('b') | KeyCode::Backspace => app.exit_watch(),
        KeyCode::Char(' ') | KeyCode::Char('p') => app.toggle_playback(),
        KeyCode::Char('r') => retry_watch(app, event_tx),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_comments_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_comments_up(),
        _ => {}
    }
    Action::Continue
}
