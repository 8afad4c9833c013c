//! Integration tests for playback sessions driven by the HTTP-backed HLS
//! engine: manifest outcomes, surface release, and switching sources.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;
use vodview::api::{build_http_client, ApiError};
use vodview::playback::{
    HlsEngineFactory, ManifestSettled, PlaybackController, PlaybackError, PlaybackStatus,
    PlaybackSurface, TerminalSurface,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
720p/playlist.m3u8
";

const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
segment0.ts
#EXTINF:4.0,
segment1.ts
#EXT-X-ENDLIST
";

fn controller(autoplay: bool) -> PlaybackController {
    let http = build_http_client(Duration::from_secs(5)).unwrap();
    let factory = HlsEngineFactory::new(http, Duration::from_secs(5));
    PlaybackController::new(Arc::new(factory), autoplay)
}

async fn serve(server: &MockServer, at: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn url(server: &MockServer, at: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), at)).unwrap()
}

/// Attach, wait for the manifest result, and apply it.
async fn attach_and_settle(
    controller: &mut PlaybackController,
    surface: &Arc<TerminalSurface>,
    source: Url,
) -> bool {
    let (tx, mut rx) = mpsc::channel::<ManifestSettled>(4);
    controller.attach(source, surface.clone(), &tx);
    let settled = rx.recv().await.unwrap();
    controller.settle(settled)
}

// ============================================================================
// Manifest Outcomes
// ============================================================================

#[tokio::test]
async fn test_master_playlist_autoplays() {
    let server = MockServer::start().await;
    serve(&server, "/videos/1/playlist.m3u8", 200, MASTER).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());
    let source = url(&server, "/videos/1/playlist.m3u8");

    assert!(attach_and_settle(&mut controller, &surface, source.clone()).await);

    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert_eq!(controller.source(), Some(&source));
    let manifest = controller.manifest().unwrap();
    assert_eq!(manifest.variants.len(), 2);
    assert_eq!(
        manifest.best_variant().unwrap().resolution.as_deref(),
        Some("1280x720")
    );

    assert_eq!(controller.surface(), Some(surface.handle()));
    let snapshot = surface.snapshot();
    assert_eq!(snapshot.engine_source, Some(source));
    assert!(snapshot.playing);
}

#[tokio::test]
async fn test_media_playlist_ready_without_autoplay() {
    let server = MockServer::start().await;
    serve(&server, "/videos/2/playlist.m3u8", 200, MEDIA).await;

    let mut controller = controller(false);
    let surface = Arc::new(TerminalSurface::new());

    attach_and_settle(&mut controller, &surface, url(&server, "/videos/2/playlist.m3u8")).await;

    assert_eq!(controller.status(), PlaybackStatus::Ready);
    assert_eq!(controller.manifest().unwrap().segments, 2);
    assert!(!surface.snapshot().playing);

    controller.play().unwrap();
    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert!(surface.snapshot().playing);
}

#[tokio::test]
async fn test_missing_manifest_fails_and_unbinds_surface() {
    let server = MockServer::start().await;
    serve(&server, "/videos/3/playlist.m3u8", 404, "").await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());

    attach_and_settle(&mut controller, &surface, url(&server, "/videos/3/playlist.m3u8")).await;

    assert_eq!(controller.status(), PlaybackStatus::Failed);
    assert!(matches!(
        controller.last_error(),
        Some(PlaybackError::ManifestLoadFailed(ApiError::HttpStatus(404)))
    ));
    assert!(!surface.snapshot().is_bound());
}

#[tokio::test]
async fn test_non_playlist_body_is_invalid_manifest() {
    let server = MockServer::start().await;
    serve(&server, "/videos/4/playlist.m3u8", 200, "<html>not a playlist</html>").await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());

    attach_and_settle(&mut controller, &surface, url(&server, "/videos/4/playlist.m3u8")).await;

    assert_eq!(controller.status(), PlaybackStatus::Failed);
    assert!(matches!(
        controller.last_error(),
        Some(PlaybackError::InvalidManifest(_))
    ));
    assert!(!controller.last_error().unwrap().is_retryable());
    assert!(!surface.snapshot().is_bound());
}

#[tokio::test]
async fn test_server_error_is_retryable_and_reattach_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/5/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/videos/5/playlist.m3u8", 200, MASTER).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());
    let source = url(&server, "/videos/5/playlist.m3u8");

    attach_and_settle(&mut controller, &surface, source.clone()).await;
    assert_eq!(controller.status(), PlaybackStatus::Failed);
    assert!(controller.last_error().unwrap().is_retryable());

    attach_and_settle(&mut controller, &surface, source).await;
    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert!(controller.last_error().is_none());
}

// ============================================================================
// Detach and Source Switching
// ============================================================================

#[tokio::test]
async fn test_detach_releases_surface_and_repeats_safely() {
    let server = MockServer::start().await;
    serve(&server, "/videos/6/playlist.m3u8", 200, MASTER).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());

    attach_and_settle(&mut controller, &surface, url(&server, "/videos/6/playlist.m3u8")).await;
    assert!(surface.snapshot().is_bound());

    controller.detach();
    controller.detach();

    assert_eq!(controller.status(), PlaybackStatus::Detached);
    assert_eq!(controller.session_id(), None);
    assert_eq!(controller.surface(), None);
    assert!(!surface.snapshot().is_bound());
    assert!(!surface.snapshot().playing);
}

#[tokio::test]
async fn test_switching_source_ignores_previous_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/a/playlist.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(MASTER)
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    serve(&server, "/videos/b/playlist.m3u8", 200, MEDIA).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());
    let (tx, mut rx) = mpsc::channel::<ManifestSettled>(4);

    let first = controller.attach(url(&server, "/videos/a/playlist.m3u8"), surface.clone(), &tx);
    let second = controller.attach(url(&server, "/videos/b/playlist.m3u8"), surface.clone(), &tx);
    assert_ne!(first, second);

    let settled = rx.recv().await.unwrap();
    assert_eq!(settled.session, second);
    assert!(controller.settle(settled));

    // A late result addressed to the first session changes nothing.
    let late = ManifestSettled {
        session: first,
        result: Err(PlaybackError::InvalidManifest("late".into())),
    };
    assert!(!controller.settle(late));

    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert_eq!(controller.session_id(), Some(second));
    assert_eq!(
        surface.snapshot().engine_source,
        Some(url(&server, "/videos/b/playlist.m3u8"))
    );
}

// ============================================================================
// Cancellation
// ============================================================================

async fn serve_slowly(server: &MockServer, at: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(MASTER)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_replaced_session_never_reports() {
    let server = MockServer::start().await;
    serve_slowly(&server, "/videos/slow/playlist.m3u8", Duration::from_millis(300)).await;
    serve(&server, "/videos/fast/playlist.m3u8", 200, MEDIA).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());
    let (tx, mut rx) = mpsc::channel::<ManifestSettled>(4);

    controller.attach(url(&server, "/videos/slow/playlist.m3u8"), surface.clone(), &tx);
    let fast = url(&server, "/videos/fast/playlist.m3u8");
    let second = controller.attach(fast, surface.clone(), &tx);

    let settled = rx.recv().await.unwrap();
    assert_eq!(settled.session, second);
    assert!(controller.settle(settled));
    assert_eq!(controller.status(), PlaybackStatus::Playing);

    // Well past the slow manifest's delay, nothing else arrives.
    let late = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
    assert!(late.is_err(), "replaced session delivered a result");
    assert_eq!(controller.session_id(), Some(second));
}

#[tokio::test]
async fn test_detach_mid_load_never_reports() {
    let server = MockServer::start().await;
    serve_slowly(&server, "/videos/slow/playlist.m3u8", Duration::from_millis(300)).await;

    let mut controller = controller(true);
    let surface = Arc::new(TerminalSurface::new());
    let (tx, mut rx) = mpsc::channel::<ManifestSettled>(4);

    controller.attach(url(&server, "/videos/slow/playlist.m3u8"), surface.clone(), &tx);
    assert_eq!(controller.status(), PlaybackStatus::Attaching);
    controller.detach();
    assert!(!surface.snapshot().is_bound());

    let late = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
    assert!(late.is_err(), "detached session delivered a result");
    assert_eq!(controller.status(), PlaybackStatus::Detached);
}
