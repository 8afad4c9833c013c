//! Terminal User Interface module.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling
//! - `events` - Background task event processing
//! - `render` - View rendering dispatch
//! - `helpers` - Video loading and shared widgets
//! - `feed_list` - Infinite-scroll feed list
//! - `watch` - Watch view (details, player, comments)
//! - `status` - Status bar widget
//! - `help` - Key binding overlay

mod events;
mod feed_list;
mod help;
mod helpers;
mod input;
mod loop_runner;
mod render;
mod status;
mod watch;

pub use loop_runner::{run, Action};
