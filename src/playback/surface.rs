use super::PlaybackError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// MIME type checked for native HLS support.
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

/// Identity of a playback surface. Two sessions must never hold the same
/// handle at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn next() -> Self {
        Self(NEXT_SURFACE.fetch_add(1, Ordering::Relaxed))
    }
}

/// The output a video is rendered into.
///
/// A surface is fed either by a streaming engine (`bind_engine`) or by its
/// own native HLS support (`set_source`), never both.
pub trait PlaybackSurface: Send + Sync {
    fn handle(&self) -> SurfaceHandle;

    /// Whether the surface can play `mime` without a streaming engine.
    fn can_play_type(&self, mime: &str) -> bool;

    /// Point native playback at `source`.
    fn set_source(&self, source: &Url) -> Result<(), PlaybackError>;

    /// Clear any native source. No-op when none is set.
    fn clear_source(&self);

    /// Route an engine's output for `source` into this surface.
    fn bind_engine(&self, source: &Url) -> Result<(), PlaybackError>;

    /// Detach engine output. No-op when nothing is bound.
    fn unbind_engine(&self);

    /// Start playback. May be refused (autoplay policy, nothing bound).
    fn play(&self) -> Result<(), PlaybackError>;

    fn pause(&self);
}

/// What a [`TerminalSurface`] is currently showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub native_source: Option<Url>,
    pub engine_source: Option<Url>,
    pub playing: bool,
}

impl SurfaceSnapshot {
    pub fn is_bound(&self) -> bool {
        self.native_source.is_some() || self.engine_source.is_some()
    }
}

/// Surface backing the watch view in the terminal.
///
/// It tracks which stream is bound and whether it is playing; the watch
/// view renders that state. Native HLS is off unless enabled, so sessions
/// normally go through the streaming engine.
#[derive(Debug)]
pub struct TerminalSurface {
    handle: SurfaceHandle,
    native_hls: bool,
    autoplay_allowed: bool,
    state: Mutex<SurfaceSnapshot>,
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            handle: SurfaceHandle::next(),
            native_hls: false,
            autoplay_allowed: true,
            state: Mutex::new(SurfaceSnapshot::default()),
        }
    }

    /// Report native HLS support from `can_play_type`.
    pub fn with_native_hls(mut self, enabled: bool) -> Self {
        self.native_hls = enabled;
        self
    }

    /// Refuse `play()` calls, as a browser does under a strict autoplay
    /// policy.
    pub fn with_autoplay_allowed(mut self, allowed: bool) -> Self {
        self.autoplay_allowed = allowed;
        self
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaybackSurface for TerminalSurface {
    fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    fn can_play_type(&self, mime: &str) -> bool {
        self.native_hls && mime.eq_ignore_ascii_case(HLS_MIME)
    }

    fn set_source(&self, source: &Url) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        if state.is_bound() {
            return Err(PlaybackError::SurfaceBusy);
        }
        state.native_source = Some(source.clone());
        Ok(())
    }

    fn clear_source(&self) {
        let mut state = self.lock();
        if state.native_source.take().is_some() {
            state.playing = false;
        }
    }

    fn bind_engine(&self, source: &Url) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        if state.is_bound() {
            return Err(PlaybackError::SurfaceBusy);
        }
        state.engine_source = Some(source.clone());
        Ok(())
    }

    fn unbind_engine(&self) {
        let mut state = self.lock();
        if state.engine_source.take().is_some() {
            state.playing = false;
        }
    }

    fn play(&self) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        if !state.is_bound() {
            return Err(PlaybackError::AutoplayBlocked(
                "nothing is bound to the surface".into(),
            ));
        }
        if !self.autoplay_allowed {
            return Err(PlaybackError::AutoplayBlocked(
                "surface refused to start playback".into(),
            ));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.lock().playing = false;
    }
}
