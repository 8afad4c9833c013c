use super::engine::{EngineFactory, ManifestSummary, StreamingEngine};
use super::surface::{PlaybackSurface, SurfaceHandle, HLS_MIME};
use super::PlaybackError;
use crate::util::catch_task_panic;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of one attach. Completions carry it so a late result from a
/// detached session can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the controller's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Attaching,
    Ready,
    Playing,
    Failed,
    Detached,
}

impl PlaybackStatus {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "Idle",
            PlaybackStatus::Attaching => "Loading stream",
            PlaybackStatus::Ready => "Ready",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Failed => "Failed",
            PlaybackStatus::Detached => "Stopped",
        }
    }
}

/// Manifest load completion for one session.
#[derive(Debug)]
pub struct ManifestSettled {
    pub session: SessionId,
    pub result: Result<ManifestSummary, PlaybackError>,
}

// ============================================================================
// Bindings
// ============================================================================

/// Engine bound to a surface. Dropping it destroys the engine and unbinds
/// the surface, so every exit path releases both.
struct EngineBinding {
    engine: Box<dyn StreamingEngine>,
    surface: Arc<dyn PlaybackSurface>,
}

impl Drop for EngineBinding {
    fn drop(&mut self) {
        self.engine.destroy();
        self.surface.pause();
        self.surface.unbind_engine();
    }
}

/// Native source set on a surface; cleared on drop.
struct NativeBinding {
    surface: Arc<dyn PlaybackSurface>,
}

impl Drop for NativeBinding {
    fn drop(&mut self) {
        self.surface.pause();
        self.surface.clear_source();
    }
}

enum Binding {
    Engine(EngineBinding),
    Native(NativeBinding),
}

impl Binding {
    fn surface(&self) -> &Arc<dyn PlaybackSurface> {
        match self {
            Binding::Engine(b) => &b.surface,
            Binding::Native(b) => &b.surface,
        }
    }
}

struct Session {
    id: SessionId,
    source: Url,
    manifest: Option<ManifestSummary>,
    task: Option<JoinHandle<()>>,
    binding: Binding,
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Binds one streaming source at a time to a playback surface.
///
/// `attach` always tears down the previous session first, so at most one
/// engine exists and a surface never has two owners. Manifest loading runs
/// on a spawned task; its [`ManifestSettled`] must be fed back through
/// [`settle`](Self::settle).
pub struct PlaybackController {
    factory: Arc<dyn EngineFactory>,
    autoplay: bool,
    status: PlaybackStatus,
    session: Option<Session>,
    last_error: Option<PlaybackError>,
}

impl PlaybackController {
    pub fn new(factory: Arc<dyn EngineFactory>, autoplay: bool) -> Self {
        Self {
            factory,
            autoplay,
            status: PlaybackStatus::Idle,
            session: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn source(&self) -> Option<&Url> {
        self.session.as_ref().map(|s| &s.source)
    }

    pub fn manifest(&self) -> Option<&ManifestSummary> {
        self.session.as_ref().and_then(|s| s.manifest.as_ref())
    }

    /// Surface the current session is bound to.
    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.session.as_ref().map(|s| s.binding.surface().handle())
    }

    /// Start a session for `source` on `surface`.
    ///
    /// Prefers the streaming engine, falls back to native HLS on the
    /// surface, and fails with [`PlaybackError::Unsupported`] when neither is
    /// available.
    pub fn attach<E>(
        &mut self,
        source: Url,
        surface: Arc<dyn PlaybackSurface>,
        tx: &mpsc::Sender<E>,
    ) -> SessionId
    where
        E: From<ManifestSettled> + Send + 'static,
    {
        if self.session.is_some() {
            self.detach();
        }

        let id = SessionId::next();
        self.last_error = None;
        self.status = PlaybackStatus::Attaching;
        tracing::debug!(
            session = %id,
            surface = ?surface.handle(),
            source = %source,
            "Attaching playback session"
        );

        if self.factory.is_supported() {
            self.attach_engine(id, source, surface, tx);
        } else if surface.can_play_type(HLS_MIME) {
            self.attach_native(id, source, surface);
        } else {
            tracing::warn!(session = %id, "No streaming engine and no native HLS support");
            self.fail(PlaybackError::Unsupported);
        }
        id
    }

    fn attach_engine<E>(
        &mut self,
        id: SessionId,
        source: Url,
        surface: Arc<dyn PlaybackSurface>,
        tx: &mpsc::Sender<E>,
    ) where
        E: From<ManifestSettled> + Send + 'static,
    {
        let mut engine = self.factory.create();
        let load = engine.load_source(&source);

        // The surface is only ours once attach_media succeeds; until then a
        // failure must not unbind whatever already owns it.
        if let Err(e) = engine.attach_media(Arc::clone(&surface)) {
            engine.destroy();
            self.fail(e);
            return;
        }
        let binding = EngineBinding { engine, surface };

        let tx = tx.clone();
        let task = tokio::spawn(async move {
            let result = catch_task_panic(load)
                .await
                .unwrap_or_else(|panic| Err(PlaybackError::EngineCrashed(panic)));
            if tx
                .send(E::from(ManifestSettled {
                    session: id,
                    result,
                }))
                .await
                .is_err()
            {
                tracing::debug!(session = %id, "Manifest settled after receiver dropped");
            }
        });

        self.session = Some(Session {
            id,
            source,
            manifest: None,
            task: Some(task),
            binding: Binding::Engine(binding),
        });
    }

    fn attach_native(&mut self, id: SessionId, source: Url, surface: Arc<dyn PlaybackSurface>) {
        if let Err(e) = surface.set_source(&source) {
            self.fail(e);
            return;
        }
        tracing::debug!(session = %id, "Using native HLS playback");
        self.session = Some(Session {
            id,
            source,
            manifest: None,
            task: None,
            binding: Binding::Native(NativeBinding { surface }),
        });
        self.become_ready();
    }

    /// Apply a manifest load result. Returns false when the result belongs
    /// to a session that is no longer current.
    pub fn settle(&mut self, settled: ManifestSettled) -> bool {
        let ManifestSettled { session, result } = settled;

        let current = match self.session.as_mut() {
            Some(s) if s.id == session && self.status == PlaybackStatus::Attaching => s,
            _ => {
                tracing::debug!(session = %session, "Ignoring manifest result for stale session");
                return false;
            }
        };
        current.task = None;

        match result {
            Ok(summary) => {
                tracing::debug!(
                    session = %session,
                    variants = summary.variants.len(),
                    "Manifest parsed"
                );
                current.manifest = Some(summary);
                self.become_ready();
            }
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Manifest load failed");
                self.session = None;
                self.fail(e);
            }
        }
        true
    }

    /// End the current session. Safe to call in any state, any number of
    /// times.
    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = %session.id, "Detaching playback session");
        }
        self.status = PlaybackStatus::Detached;
    }

    /// Start playback of a `Ready` session.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.status != PlaybackStatus::Ready {
            return Ok(());
        }
        let Some(session) = &self.session else {
            return Ok(());
        };
        session.binding.surface().play()?;
        self.status = PlaybackStatus::Playing;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        if let Some(session) = &self.session {
            session.binding.surface().pause();
        }
        self.status = PlaybackStatus::Ready;
    }

    fn become_ready(&mut self) {
        self.status = PlaybackStatus::Ready;
        if !self.autoplay {
            return;
        }
        // A refused autoplay leaves the session Ready for a manual play.
        if let Err(e) = self.play() {
            tracing::info!(error = %e, "Autoplay refused, waiting for user");
        }
    }

    fn fail(&mut self, error: PlaybackError) {
        self.status = PlaybackStatus::Failed;
        self.last_error = Some(error);
    }
}
