use crate::api::{ApiClient, ApiError, VideoDescriptor, VideoDetail};
use crate::config::Config;
use crate::feed::{FeedPaginator, PageSettled, PageSource, Settlement};
use crate::playback::{
    EngineFactory, HlsEngineFactory, ManifestSettled, PlaybackController, PlaybackStatus,
    TerminalSurface,
};
use crate::util::resolve_manifest_url;
use crate::visibility::{IntersectionObserver, SentinelId, TriggerOptions, VisibilityTrigger};
use lru::LruCache;
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Sentinel row at the end of the feed list.
pub const FEED_SENTINEL: SentinelId = SentinelId("feed-end");

/// Video details kept for instant re-open.
const VIDEO_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(n) => n,
    None => panic!("cache size must be non-zero"),
};

// ============================================================================
// View and Event Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Feed,
    Watch,
}

/// Single-video load state for the watch view.
#[derive(Debug, Clone)]
pub enum WatchState {
    Loading { video_id: String },
    Loaded(Arc<VideoDetail>),
    NotFound { video_id: String },
    Failed { video_id: String, error: String },
}

impl WatchState {
    pub fn video_id(&self) -> &str {
        match self {
            WatchState::Loading { video_id }
            | WatchState::NotFound { video_id }
            | WatchState::Failed { video_id, .. } => video_id,
            WatchState::Loaded(detail) => &detail.id,
        }
    }
}

/// Events from background tasks and observers.
pub enum AppEvent {
    /// A feed page request finished.
    PageSettled(PageSettled),
    /// A playback session finished loading its manifest.
    ManifestSettled(ManifestSettled),
    /// Single-video fetch finished.
    ///
    /// Fields:
    /// - `video_id`: The video requested
    /// - `generation`: `App::video_generation` when the load was spawned
    /// - `result`: The detail payload or error
    VideoLoaded {
        video_id: String,
        generation: u64,
        result: Result<VideoDetail, ApiError>,
    },
    /// The feed sentinel scrolled into view.
    SentinelVisible,
}

impl From<PageSettled> for AppEvent {
    fn from(settled: PageSettled) -> Self {
        AppEvent::PageSettled(settled)
    }
}

impl From<ManifestSettled> for AppEvent {
    fn from(settled: ManifestSettled) -> Self {
        AppEvent::ManifestSettled(settled)
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Central application state
pub struct App {
    pub api: ApiClient,
    pub view: View,

    // Feed
    pub feed: FeedPaginator,
    pub selected: usize,
    /// First visible row of the feed list.
    pub feed_scroll: usize,
    /// Feed rows that fit on screen, updated by each render.
    pub feed_viewport_rows: usize,
    pub observer: Arc<IntersectionObserver>,
    pub sentinel: Option<VisibilityTrigger>,
    pub skeleton_rows: usize,
    sentinel_threshold: f32,

    // Watch
    pub watch: Option<WatchState>,
    /// Incremented on every video open; stale `VideoLoaded` events are dropped.
    pub video_generation: u64,
    pub video_load_handle: Option<JoinHandle<()>>,
    pub video_cache: LruCache<String, Arc<VideoDetail>>,
    pub player: PlaybackController,
    pub surface: Arc<TerminalSurface>,
    /// Scroll offset of the comment list.
    pub comment_scroll: usize,

    pub show_help: bool,
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    /// Frame of the loading spinner, advanced by the tick while loading.
    pub spinner_frame: usize,
    /// Set by anything that changes what is on screen.
    pub needs_redraw: bool,
}

impl App {
    pub fn new(config: &Config, api: ApiClient) -> Self {
        let source: Arc<dyn PageSource> = Arc::new(api.clone());
        let engines: Arc<dyn EngineFactory> = Arc::new(HlsEngineFactory::new(
            api.http().clone(),
            config.request_timeout(),
        ));
        Self::with_backends(config, api, source, engines, Arc::new(TerminalSurface::new()))
    }

    /// Build an app with explicit page source, engine factory and surface.
    pub fn with_backends(
        config: &Config,
        api: ApiClient,
        source: Arc<dyn PageSource>,
        engines: Arc<dyn EngineFactory>,
        surface: Arc<TerminalSurface>,
    ) -> Self {
        Self {
            api,
            view: View::Feed,
            feed: FeedPaginator::new(source, config.page_size),
            selected: 0,
            feed_scroll: 0,
            feed_viewport_rows: 0,
            observer: IntersectionObserver::new(),
            sentinel: None,
            skeleton_rows: config.skeleton_rows,
            sentinel_threshold: config.sentinel_threshold,
            watch: None,
            video_generation: 0,
            video_load_handle: None,
            video_cache: LruCache::new(VIDEO_CACHE_SIZE),
            player: PlaybackController::new(engines, config.autoplay),
            surface,
            comment_scroll: 0,
            show_help: false,
            status_message: None,
            spinner_frame: 0,
            needs_redraw: true,
        }
    }

    // ------------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------------

    pub fn selected_video(&self) -> Option<&VideoDescriptor> {
        self.feed.items().get(self.selected)
    }

    /// Observe the feed sentinel while more pages exist, and stop once the
    /// feed is exhausted.
    pub fn sync_sentinel(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let has_more = self.feed.has_more();
        match (self.sentinel.is_some(), has_more) {
            (true, false) => {
                self.sentinel = None;
            }
            (false, true) => {
                let tx = event_tx.clone();
                self.sentinel = Some(VisibilityTrigger::start(
                    &self.observer,
                    FEED_SENTINEL,
                    move || match tx.try_send(AppEvent::SentinelVisible) {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, "Sentinel event not delivered, will retry");
                            false
                        }
                    },
                    TriggerOptions {
                        has_more,
                        threshold: self.sentinel_threshold,
                    },
                ));
            }
            _ => {}
        }
    }

    /// Ask the paginator for the next page. No-op while a page is in flight
    /// or once the feed is exhausted.
    pub fn load_more(&mut self, event_tx: &mpsc::Sender<AppEvent>) -> bool {
        let dispatched = self.feed.load_next(event_tx);
        if dispatched {
            self.needs_redraw = true;
        }
        dispatched
    }

    /// Apply a settled page and re-arm the sentinel so a sentinel that is
    /// still on screen requests the following page.
    pub fn apply_page(&mut self, settled: PageSettled, event_tx: &mpsc::Sender<AppEvent>) {
        match self.feed.settle(settled) {
            Settlement::Merged(report) => {
                tracing::debug!(
                    added = report.added,
                    total = self.feed.items().len(),
                    "Feed updated"
                );
                if let Some(sentinel) = &self.sentinel {
                    sentinel.rearm();
                }
                self.sync_sentinel(event_tx);
                self.clamp_selection();
                self.needs_redraw = true;
            }
            Settlement::Failed => {
                let msg = match self.feed.last_error() {
                    Some(e) => format!("{} (press r to retry)", e),
                    None => "Failed to load videos (press r to retry)".to_string(),
                };
                self.set_status(msg);
                self.needs_redraw = true;
            }
            Settlement::Ignored => {}
        }
    }

    /// Drop all loaded pages and start again from the first.
    pub fn refresh_feed(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        self.feed.reset();
        self.selected = 0;
        self.feed_scroll = 0;
        self.sentinel = None;
        self.sync_sentinel(event_tx);
        self.load_more(event_tx);
        self.set_status("Refreshing feed...");
    }

    pub fn nav_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn nav_down(&mut self) {
        let len = self.feed.items().len();
        if len > 0 {
            self.selected = self.selected.saturating_add(1).min(len - 1);
        }
    }

    pub fn page_up(&mut self) {
        let step = self.feed_viewport_rows.max(1);
        self.selected = self.selected.saturating_sub(step);
    }

    pub fn page_down(&mut self) {
        let len = self.feed.items().len();
        if len > 0 {
            let step = self.feed_viewport_rows.max(1);
            self.selected = self.selected.saturating_add(step).min(len - 1);
        }
    }

    pub fn jump_to_top(&mut self) {
        self.selected = 0;
    }

    pub fn jump_to_bottom(&mut self) {
        self.selected = self.feed.items().len().saturating_sub(1);
    }

    pub fn clamp_selection(&mut self) {
        let len = self.feed.items().len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    /// Scroll the feed so the selection is on screen. Returns the sentinel's
    /// visible ratio for the resulting window.
    ///
    /// The sentinel is the row after the last loaded item; it only exists
    /// while more pages remain. Selecting the last item brings it into view.
    pub fn scroll_feed_into_view(&mut self, viewport_rows: usize) -> f32 {
        self.feed_viewport_rows = viewport_rows;
        if viewport_rows == 0 {
            return 0.0;
        }

        let has_more = self.feed.has_more();
        let sentinel_row = self.feed.items().len();
        let bottom = if has_more && self.selected + 1 >= sentinel_row {
            sentinel_row
        } else {
            self.selected
        };

        if self.selected < self.feed_scroll {
            self.feed_scroll = self.selected;
        } else if bottom >= self.feed_scroll + viewport_rows {
            self.feed_scroll = bottom + 1 - viewport_rows;
        }

        if !has_more {
            return 0.0;
        }
        if (self.feed_scroll..self.feed_scroll + viewport_rows).contains(&sentinel_row) {
            1.0
        } else {
            0.0
        }
    }

    // ------------------------------------------------------------------------
    // Watch
    // ------------------------------------------------------------------------

    /// Switch to the watch view for `video_id` and return the generation the
    /// load must report back with. A cached detail is shown immediately.
    pub fn enter_watch(&mut self, video_id: &str) -> (u64, Option<Arc<VideoDetail>>) {
        if let Some(handle) = self.video_load_handle.take() {
            handle.abort();
        }
        self.video_generation = self.video_generation.wrapping_add(1);
        self.view = View::Watch;
        self.comment_scroll = 0;
        self.needs_redraw = true;

        let cached = self.video_cache.get(video_id).cloned();
        self.watch = Some(match &cached {
            Some(detail) => WatchState::Loaded(Arc::clone(detail)),
            None => WatchState::Loading {
                video_id: video_id.to_string(),
            },
        });
        (self.video_generation, cached)
    }

    /// Leave the watch view, ending any playback session.
    pub fn exit_watch(&mut self) {
        if let Some(handle) = self.video_load_handle.take() {
            handle.abort();
        }
        self.player.detach();
        self.video_generation = self.video_generation.wrapping_add(1);
        self.watch = None;
        self.view = View::Feed;
        self.needs_redraw = true;
    }

    /// Apply a finished single-video fetch and start playback on success.
    pub fn apply_video(
        &mut self,
        video_id: String,
        generation: u64,
        result: Result<VideoDetail, ApiError>,
        event_tx: &mpsc::Sender<AppEvent>,
    ) {
        if generation != self.video_generation || self.view != View::Watch {
            tracing::debug!(
                video_id = %video_id,
                generation,
                current = self.video_generation,
                "Ignoring stale video load"
            );
            return;
        }
        self.video_load_handle = None;
        self.needs_redraw = true;

        match result {
            Ok(detail) => {
                let detail = Arc::new(detail);
                self.video_cache.put(video_id, Arc::clone(&detail));
                self.watch = Some(WatchState::Loaded(detail));
                self.attach_player(event_tx);
            }
            Err(ApiError::VideoNotFound(_)) => {
                self.watch = Some(WatchState::NotFound { video_id });
            }
            Err(e) => {
                tracing::warn!(video_id = %video_id, error = %e, "Failed to load video");
                self.watch = Some(WatchState::Failed {
                    video_id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Start (or restart) playback of the loaded video.
    pub fn attach_player(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let Some(WatchState::Loaded(detail)) = &self.watch else {
            return;
        };
        match resolve_manifest_url(self.api.base_url(), &detail.src) {
            Ok(url) => {
                let surface = Arc::clone(&self.surface);
                self.player.attach(url, surface, event_tx);
            }
            Err(e) => {
                tracing::warn!(src = %detail.src, error = %e, "Unusable manifest URL");
                self.player.detach();
                self.set_status(format!("Cannot play this video: {}", e));
            }
        }
        self.needs_redraw = true;
    }

    pub fn apply_manifest(&mut self, settled: ManifestSettled) {
        if !self.player.settle(settled) {
            return;
        }
        if self.player.status() == PlaybackStatus::Failed {
            if let Some(e) = self.player.last_error() {
                self.set_status(format!("{} (press r to retry)", e));
            }
        }
        self.needs_redraw = true;
    }

    pub fn toggle_playback(&mut self) {
        match self.player.status() {
            PlaybackStatus::Playing => self.player.pause(),
            PlaybackStatus::Ready => {
                if let Err(e) = self.player.play() {
                    self.set_status(e.to_string());
                }
            }
            _ => {}
        }
        self.needs_redraw = true;
    }

    /// True while something on screen is waiting on the network.
    pub fn is_loading(&self) -> bool {
        match self.view {
            View::Feed => self.feed.in_flight(),
            View::Watch => {
                matches!(self.watch, Some(WatchState::Loading { .. }))
                    || self.player.status() == PlaybackStatus::Attaching
            }
        }
    }

    pub fn comment_count(&self) -> usize {
        match &self.watch {
            Some(WatchState::Loaded(detail)) => detail.comments.len(),
            _ => 0,
        }
    }

    pub fn scroll_comments_down(&mut self) {
        let max = self.comment_count().saturating_sub(1);
        self.comment_scroll = self.comment_scroll.saturating_add(1).min(max);
    }

    pub fn scroll_comments_up(&mut self) {
        self.comment_scroll = self.comment_scroll.saturating_sub(1);
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Clear status message if expired (older than 3 seconds).
    /// Returns true if a message was actually cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= 3 {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(handle) = self.video_load_handle.take() {
            handle.abort();
            tracing::debug!("Aborted video load task on App drop");
        }
        self.player.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{build_http_client, Channel, Cursor, FeedPage};
    use crate::playback::SurfaceSnapshot;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::time;

    /// Serves `total` numbered videos, `limit` at a time.
    struct NumberedSource {
        total: u64,
    }

    impl PageSource for NumberedSource {
        fn fetch_page(
            &self,
            cursor: Cursor,
            limit: usize,
        ) -> BoxFuture<'static, Result<FeedPage, ApiError>> {
            let start = match cursor {
                Cursor::Offset(n) => n,
                Cursor::Token(_) => 0,
            };
            let end = (start + limit as u64).min(self.total);
            let items = (start..end)
                .map(|i| VideoDescriptor {
                    id: Arc::from(format!("video-{}", i + 1).as_str()),
                    title: Arc::from(format!("Mock Video {}", i + 1).as_str()),
                    thumbnail_url: Arc::from(""),
                    channel_avatar_url: Arc::from(""),
                    channel_name: Arc::from("Channel"),
                })
                .collect();
            let page = FeedPage {
                items,
                cursor: Some(Cursor::Offset(end)),
                has_more: end < self.total,
            };
            async move { Ok(page) }.boxed()
        }
    }

    fn test_app(total: u64) -> App {
        let config = Config::default();
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let api = ApiClient::new(
            http.clone(),
            "http://localhost:8000/api",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        App::with_backends(
            &config,
            api,
            Arc::new(NumberedSource { total }),
            Arc::new(HlsEngineFactory::new(http, Duration::from_secs(5))),
            Arc::new(TerminalSurface::new()),
        )
    }

    fn detail(id: &str, src: &str) -> VideoDetail {
        VideoDetail {
            id: id.to_string(),
            title: format!("Video {}", id),
            thumbnail: String::new(),
            src: src.to_string(),
            channel: Channel {
                avatar: String::new(),
                name: "Main".to_string(),
            },
            comments: Vec::new(),
            description: None,
            likes_count: None,
            views_count: None,
            resolutions: Vec::new(),
        }
    }

    async fn load_page(
        app: &mut App,
        tx: &mpsc::Sender<AppEvent>,
        rx: &mut mpsc::Receiver<AppEvent>,
    ) {
        assert!(app.load_more(tx));
        match rx.recv().await {
            Some(AppEvent::PageSettled(settled)) => app.apply_page(settled, tx),
            _ => panic!("expected a page event"),
        }
    }

    #[tokio::test]
    async fn test_sentinel_follows_has_more() {
        let mut app = test_app(25);
        let (tx, mut rx) = mpsc::channel(16);

        app.sync_sentinel(&tx);
        assert!(app.sentinel.as_ref().unwrap().is_active());

        load_page(&mut app, &tx, &mut rx).await;
        assert!(app.sentinel.is_some());

        load_page(&mut app, &tx, &mut rx).await;
        assert!(!app.feed.has_more());
        assert!(app.sentinel.is_none());
        assert_eq!(app.observer.observed_count(), 0);
    }

    #[tokio::test]
    async fn test_visible_sentinel_requests_once() {
        let mut app = test_app(100);
        let (tx, mut rx) = mpsc::channel(16);
        app.sync_sentinel(&tx);

        // Several render passes report the sentinel before any page lands.
        let ratio = app.scroll_feed_into_view(30);
        app.observer.report(FEED_SENTINEL, ratio);
        app.observer.report(FEED_SENTINEL, ratio);

        assert!(matches!(rx.recv().await, Some(AppEvent::SentinelVisible)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sentinel_retries_after_full_channel() {
        let mut app = test_app(100);
        let (tx, mut rx) = mpsc::channel(1);
        app.sync_sentinel(&tx);
        let ratio = app.scroll_feed_into_view(30);

        // Occupy the only slot so the first delivery fails.
        tx.try_send(AppEvent::SentinelVisible).unwrap();
        assert_eq!(app.observer.report(FEED_SENTINEL, ratio), 1);
        assert!(matches!(rx.try_recv(), Ok(AppEvent::SentinelVisible)));
        assert!(rx.try_recv().is_err());

        // The sentinel never left the view, yet the next pass delivers.
        app.observer.report(FEED_SENTINEL, ratio);
        assert!(matches!(rx.try_recv(), Ok(AppEvent::SentinelVisible)));
    }

    #[tokio::test]
    async fn test_sentinel_window_math() {
        let mut app = test_app(100);
        let (tx, mut rx) = mpsc::channel(16);
        load_page(&mut app, &tx, &mut rx).await;

        // 20 items + sentinel row 20; a 10-row window at the top hides it.
        assert_eq!(app.scroll_feed_into_view(10), 0.0);

        app.jump_to_bottom();
        assert_eq!(app.scroll_feed_into_view(10), 1.0);
        assert_eq!(app.feed_scroll, 11);
    }

    #[tokio::test]
    async fn test_navigation_clamps() {
        let mut app = test_app(100);
        let (tx, mut rx) = mpsc::channel(16);

        app.nav_down();
        assert_eq!(app.selected, 0);

        load_page(&mut app, &tx, &mut rx).await;
        app.feed_viewport_rows = 8;
        app.page_down();
        assert_eq!(app.selected, 8);
        app.jump_to_bottom();
        app.nav_down();
        assert_eq!(app.selected, 19);
        app.page_up();
        assert_eq!(app.selected, 11);
        app.jump_to_top();
        app.nav_up();
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn test_refresh_starts_from_first_page() {
        let mut app = test_app(100);
        let (tx, mut rx) = mpsc::channel(16);
        load_page(&mut app, &tx, &mut rx).await;
        app.selected = 12;

        app.refresh_feed(&tx);
        assert!(app.feed.items().is_empty());
        assert!(app.feed.in_flight());
        assert_eq!(app.selected, 0);

        match rx.recv().await {
            Some(AppEvent::PageSettled(settled)) => app.apply_page(settled, &tx),
            _ => panic!("expected a page event"),
        }
        assert_eq!(app.feed.items().len(), 20);
        assert_eq!(&*app.feed.items()[0].id, "video-1");
    }

    #[tokio::test]
    async fn test_stale_video_load_ignored() {
        let mut app = test_app(0);
        let (tx, _rx) = mpsc::channel(16);

        let (first, _) = app.enter_watch("a");
        let (second, _) = app.enter_watch("b");
        assert_ne!(first, second);

        app.apply_video("a".into(), first, Ok(detail("a", "https://cdn.example.com/a.m3u8")), &tx);
        assert!(matches!(app.watch, Some(WatchState::Loading { ref video_id }) if video_id == "b"));
    }

    #[tokio::test]
    async fn test_video_not_found_state() {
        let mut app = test_app(0);
        let (tx, _rx) = mpsc::channel(16);

        let (generation, _) = app.enter_watch("missing");
        app.apply_video(
            "missing".into(),
            generation,
            Err(ApiError::VideoNotFound("missing".into())),
            &tx,
        );

        assert!(matches!(app.watch, Some(WatchState::NotFound { .. })));
        assert_eq!(app.player.status(), PlaybackStatus::Idle);
    }

    #[tokio::test]
    async fn test_loaded_video_attaches_and_exit_detaches() {
        let mut app = test_app(0);
        let (tx, _rx) = mpsc::channel(16);

        let (generation, _) = app.enter_watch("1");
        app.apply_video(
            "1".into(),
            generation,
            Ok(detail("1", "/videos/1/playlist.m3u8")),
            &tx,
        );

        assert_eq!(app.player.status(), PlaybackStatus::Attaching);
        assert_eq!(
            app.player.source().map(|u| u.as_str()),
            Some("http://localhost:8000/videos/1/playlist.m3u8")
        );
        assert!(app.surface.snapshot().is_bound());

        app.exit_watch();
        assert_eq!(app.view, View::Feed);
        assert_eq!(app.player.status(), PlaybackStatus::Detached);
        assert_eq!(app.surface.snapshot(), SurfaceSnapshot::default());

        // Re-opening serves the cached detail without a fetch.
        let (_, cached) = app.enter_watch("1");
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_status_expires_after_3_seconds() {
        let mut app = test_app(0);
        time::pause();
        app.set_status("Test message");

        time::advance(Duration::from_secs(2)).await;
        app.clear_expired_status();
        assert!(app.status_message.is_some());

        time::advance(Duration::from_secs(2)).await;
        app.clear_expired_status();
        assert!(app.status_message.is_none());
    }
}
