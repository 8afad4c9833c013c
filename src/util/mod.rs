//! Utility functions shared by the API client and the TUI.
//!
//! - **URL validation**: backend base URL policy and manifest resolution
//! - **Text processing**: terminal-safe sanitizing, width-aware truncation
//! - **Tasks**: panic capture for spawned work that must always settle
//!
//! # Examples
//!
//! ```
//! use vodview::util::{truncate_to_width, validate_api_base};
//!
//! let base = validate_api_base("https://vod.example.com/api").unwrap();
//! assert_eq!(base.as_str(), "https://vod.example.com/api/");
//!
//! let title = truncate_to_width("A very long video title", 12);
//! assert_eq!(title, "A very lo...");
//! ```

mod task;
mod text;
mod url_validator;

pub use task::catch_task_panic;
pub use text::{display_width, format_count, strip_control_chars, truncate_to_width};
pub use url_validator::{
    is_loopback_host, resolve_manifest_url, validate_api_base, UrlValidationError,
};
