//! Application event handling.
//!
//! Applies background task completions (feed pages, video details, manifest
//! loads) and sentinel visibility to the application state.

use crate::app::{App, AppEvent, View};
use tokio::sync::mpsc;

/// Handle one event from a background task or observer.
pub(super) fn handle_app_event(
    app: &mut App,
    event: AppEvent,
    event_tx: &mpsc::Sender<AppEvent>,
) {
    match event {
        AppEvent::PageSettled(settled) => {
            app.apply_page(settled, event_tx);
        }
        AppEvent::SentinelVisible => {
            // Visibility fires while the feed is on screen; a sentinel
            // report that races a switch to the watch view is dropped.
            if app.view == View::Feed {
                app.load_more(event_tx);
            }
        }
        AppEvent::VideoLoaded {
            video_id,
            generation,
            result,
        } => {
            app.apply_video(video_id, generation, result, event_tx);
        }
        AppEvent::ManifestSettled(settled) => {
            app.apply_manifest(settled);
        }
    }
}
