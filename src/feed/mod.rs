//! Incremental loading of the video feed.
//!
//! [`FeedPaginator`] owns the ordered, de-duplicated list of videos shown by
//! the feed view, the cursor for the next page, and the latch that keeps at
//! most one page request outstanding. Requests run on spawned tasks and
//! report back as [`PageSettled`] events, which the owner applies with
//! [`FeedPaginator::settle`].
//!
//! # Example
//!
//! ```ignore
//! let mut feed = FeedPaginator::new(Arc::new(api_client), 20);
//! feed.load_next(&event_tx);
//! // ... later, in the event loop:
//! if let AppEvent::PageSettled(settled) = event {
//!     feed.settle(settled);
//! }
//! ```

mod dump;
mod paginator;

pub use dump::{dump_feed, DumpSummary};
pub use paginator::{FeedError, FeedPaginator, MergeReport, PageSettled, PageSource, Settlement};
