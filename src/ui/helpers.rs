//! Helper functions for UI operations.
//!
//! Spawning of the single-video load and the transition into the watch view.

use crate::api::{ApiClient, ApiError};
use crate::app::{App, AppEvent, WatchState};
use crate::util::catch_task_panic;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Open the selected feed item in the watch view.
///
/// A cached detail starts playback immediately; otherwise the detail is
/// fetched in the background and applied on `AppEvent::VideoLoaded`.
pub(super) fn open_selected_video(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) -> bool {
    let Some(video) = app.selected_video() else {
        return false;
    };
    let video_id = video.id.to_string();
    open_video(app, video_id, event_tx);
    true
}

/// Open `video_id` in the watch view.
pub(super) fn open_video(app: &mut App, video_id: String, event_tx: &mpsc::Sender<AppEvent>) {
    let (generation, cached) = app.enter_watch(&video_id);

    if cached.is_some() {
        tracing::debug!(video_id = %video_id, "Video detail served from cache");
        app.attach_player(event_tx);
        return;
    }

    tracing::debug!(video_id = %video_id, generation, "Starting video load");
    app.video_load_handle = Some(spawn_video_load(
        app.api.clone(),
        video_id,
        generation,
        event_tx.clone(),
    ));
}

/// Retry whatever failed on the watch view: the detail fetch, or the
/// playback session when the detail is already loaded.
pub(super) fn retry_watch(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) {
    let failed_id = match &app.watch {
        Some(WatchState::Loaded(_)) => None,
        Some(WatchState::Failed { video_id, .. }) => Some(video_id.clone()),
        _ => return,
    };
    match failed_id {
        Some(video_id) => open_video(app, video_id, event_tx),
        None => app.attach_player(event_tx),
    }
}

fn spawn_video_load(
    api: ApiClient,
    video_id: String,
    generation: u64,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = catch_task_panic(api.fetch_video(&video_id))
            .await
            .unwrap_or_else(|panic_msg| {
                tracing::error!(
                    video_id = %video_id,
                    error = %panic_msg,
                    "Video load task panicked"
                );
                Err(ApiError::Aborted(panic_msg))
            });

        let event = AppEvent::VideoLoaded {
            video_id,
            generation,
            result,
        };
        if tx.send(event).await.is_err() {
            tracing::debug!(generation, "Video loaded after receiver dropped");
        }
    })
}

/// Braille spinner frame for `frame` (see `SPINNER_FRAMES`).
pub(super) fn spinner(frame: usize) -> char {
    const FRAMES: [char; super::loop_runner::SPINNER_FRAMES] =
        ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    FRAMES[frame % FRAMES.len()]
}
