use super::{FeedPaginator, PageSettled, Settlement};
use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use tokio::sync::mpsc;

/// Totals for a finished dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    pub videos: usize,
    pub pages: usize,
    pub has_more: bool,
}

impl fmt::Display for DumpSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} videos in {} pages", self.videos, self.pages)?;
        if self.has_more {
            write!(f, " (more available)")?;
        }
        Ok(())
    }
}

/// Page through `feed`, writing one `id\tchannel\ttitle` line per video.
///
/// Stops when the feed is exhausted or `max_pages` pages are loaded. A page
/// failure ends the dump with that error; lines already written stay written.
pub async fn dump_feed<W: Write>(
    feed: &mut FeedPaginator,
    max_pages: Option<usize>,
    out: &mut W,
) -> Result<DumpSummary> {
    let (tx, mut rx) = mpsc::channel::<PageSettled>(1);
    let mut written = feed.items().len();

    while max_pages.map_or(true, |max| feed.pages_loaded() < max) && feed.load_next(&tx) {
        let settled = rx
            .recv()
            .await
            .context("Page request task ended without settling")?;

        match feed.settle(settled) {
            Settlement::Merged(report) => {
                for video in &feed.items()[written..] {
                    writeln!(out, "{}\t{}\t{}", video.id, video.channel_name, video.title)
                        .context("Failed to write feed line")?;
                }
                written = feed.items().len();
                tracing::debug!(
                    added = report.added,
                    duplicates = report.duplicates,
                    "Page dumped"
                );
            }
            Settlement::Failed => {
                let err = feed
                    .last_error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                anyhow::bail!("{}", err);
            }
            Settlement::Ignored => {}
        }
    }
    out.flush().context("Failed to flush feed dump")?;

    Ok(DumpSummary {
        videos: written,
        pages: feed.pages_loaded(),
        has_more: feed.has_more(),
    })
}
