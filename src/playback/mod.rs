//! Playback session management for the watch view.
//!
//! A [`PlaybackController`] owns at most one session, binding a manifest URL
//! to a [`PlaybackSurface`] through a [`StreamingEngine`] or, when no engine
//! is available, the surface's own native HLS support.
//!
//! Session lifecycle:
//!
//! ```text
//! Idle ──attach──▶ Attaching ──manifest ok──▶ Ready ──play──▶ Playing
//!                      │                                         │
//!                      └──load error──▶ Failed     any ──detach──▶ Detached
//! ```

mod controller;
mod engine;
mod surface;

pub use controller::{ManifestSettled, PlaybackController, PlaybackStatus, SessionId};
pub use engine::{
    parse_manifest, EngineFactory, HlsEngine, HlsEngineFactory, ManifestSummary,
    StreamingEngine, Variant,
};
pub use surface::{PlaybackSurface, SurfaceHandle, SurfaceSnapshot, TerminalSurface, HLS_MIME};

use crate::api::ApiError;
use thiserror::Error;

/// Errors that end or block a playback session.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No streaming engine and no native HLS on the surface
    #[error("Playback is not supported on this surface")]
    Unsupported,

    /// Manifest could not be fetched
    #[error("Failed to load stream: {0}")]
    ManifestLoadFailed(#[source] ApiError),

    /// Manifest was fetched but is not a usable playlist
    #[error("Invalid stream manifest: {0}")]
    InvalidManifest(String),

    /// Surface already has a source bound
    #[error("Playback surface is already in use")]
    SurfaceBusy,

    /// Surface refused to start playback; the session stays usable
    #[error("Playback was not started: {0}")]
    AutoplayBlocked(String),

    /// The engine task panicked while loading
    #[error("Streaming engine crashed: {0}")]
    EngineCrashed(String),
}

impl PlaybackError {
    /// True when attaching again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlaybackError::ManifestLoadFailed(e) => e.is_transient(),
            PlaybackError::EngineCrashed(_) | PlaybackError::SurfaceBusy => true,
            PlaybackError::Unsupported
            | PlaybackError::InvalidManifest(_)
            | PlaybackError::AutoplayBlocked(_) => false,
        }
    }
}
