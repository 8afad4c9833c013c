//! vodview: a terminal client for a video-on-demand backend.
//!
//! The library holds the two engines the client is built around, plus the
//! ratatui front end that drives them:
//!
//! - [`feed`]: incremental, de-duplicated loading of the paginated video feed
//! - [`playback`]: one adaptive-streaming session at a time, bound to a surface
//! - [`visibility`]: sentinel observation that turns scrolling into page loads
//!
//! [`api`] and [`config`] are the backend client and settings both share.

pub mod api;
pub mod app;
pub mod config;
pub mod feed;
pub mod playback;
pub mod ui;
pub mod util;
pub mod visibility;
