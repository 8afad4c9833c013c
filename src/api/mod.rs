//! Backend API: typed payloads and the HTTP client.
//!
//! Only the two endpoints the core consumes are modelled:
//!
//! - `GET /videos?cursor=&limit=` → [`FeedPage`]
//! - `GET /videos/<id>` → [`VideoDetail`]

mod client;
mod types;

pub use client::{build_http_client, ApiClient, ApiError};
pub(crate) use client::read_limited_bytes;
pub use types::{Channel, Comment, Cursor, FeedPage, VideoDescriptor, VideoDetail};
