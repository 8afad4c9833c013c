use crate::api::{ApiClient, ApiError, Cursor, FeedPage, VideoDescriptor};
use crate::util::catch_task_panic;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Epochs are process-unique so a completion addressed to a destroyed
/// paginator can never match a newer one.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Anything that can produce a page of the feed for a cursor.
///
/// The returned future must be `'static` so it can run on its own task;
/// aborting that task cancels the request.
pub trait PageSource: Send + Sync {
    fn fetch_page(
        &self,
        cursor: Cursor,
        limit: usize,
    ) -> BoxFuture<'static, Result<FeedPage, ApiError>>;
}

impl PageSource for ApiClient {
    fn fetch_page(
        &self,
        cursor: Cursor,
        limit: usize,
    ) -> BoxFuture<'static, Result<FeedPage, ApiError>> {
        let client = self.clone();
        async move { ApiClient::fetch_page(&client, &cursor, limit).await }.boxed()
    }
}

/// Page load failure. Recoverable: the paginator keeps its cursor so the
/// next `load_next()` retries the same page.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to load videos at cursor {cursor}: {source}")]
    PageFetchFailed {
        cursor: Cursor,
        #[source]
        source: ApiError,
    },
}

/// Completion of one dispatched page request, delivered over the host's
/// event channel.
#[derive(Debug)]
pub struct PageSettled {
    pub epoch: u64,
    pub cursor: Cursor,
    pub result: Result<FeedPage, ApiError>,
}

/// What a merge did to the loaded items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub duplicates: usize,
    pub has_more: bool,
}

/// Outcome of applying a [`PageSettled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Merged(MergeReport),
    /// The request failed; see [`FeedPaginator::last_error`].
    Failed,
    /// The completion belonged to an earlier epoch or a request that is no
    /// longer in flight and was dropped.
    Ignored,
}

/// Infinite-scroll page loader for one feed view.
///
/// At most one page request is outstanding at any time, and none once the
/// backend has reported the end of the feed. `load_next()` is safe to call
/// as often as visibility events arrive; extra calls are no-ops.
pub struct FeedPaginator {
    source: Arc<dyn PageSource>,
    page_size: usize,
    items: Vec<VideoDescriptor>,
    seen: HashSet<Arc<str>>,
    cursor: Cursor,
    has_more: bool,
    /// Cursor of the dispatched request; `Some` exactly while in flight.
    in_flight: Option<Cursor>,
    epoch: u64,
    handle: Option<JoinHandle<()>>,
    last_error: Option<FeedError>,
    pages_loaded: usize,
}

impl FeedPaginator {
    pub fn new(source: Arc<dyn PageSource>, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            items: Vec::new(),
            seen: HashSet::new(),
            cursor: Cursor::START,
            has_more: true,
            in_flight: None,
            epoch: next_epoch(),
            handle: None,
            last_error: None,
            pages_loaded: 0,
        }
    }

    pub fn items(&self) -> &[VideoDescriptor] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    /// Request the next page unless one is already in flight or the feed is
    /// exhausted. Returns whether a request was dispatched.
    ///
    /// The request runs on its own task; its [`PageSettled`] is sent on `tx`
    /// and must be handed back through [`settle`](Self::settle).
    pub fn load_next<E>(&mut self, tx: &mpsc::Sender<E>) -> bool
    where
        E: From<PageSettled> + Send + 'static,
    {
        if let Some(pending) = &self.in_flight {
            tracing::debug!(cursor = %pending, "Page already in flight, skipping load");
            return false;
        }
        if !self.has_more {
            tracing::trace!("Feed exhausted, skipping load");
            return false;
        }

        let cursor = self.cursor.clone();
        let epoch = self.epoch;
        self.in_flight = Some(cursor.clone());

        tracing::debug!(%cursor, epoch, limit = self.page_size, "Dispatching page request");
        let request = self.source.fetch_page(cursor.clone(), self.page_size);
        let tx = tx.clone();

        self.handle = Some(tokio::spawn(async move {
            // A panicking source must still settle, or the latch would stay
            // set for the lifetime of the view.
            let result = catch_task_panic(request)
                .await
                .unwrap_or_else(|panic| Err(ApiError::Aborted(panic)));

            if tx
                .send(E::from(PageSettled {
                    epoch,
                    cursor,
                    result,
                }))
                .await
                .is_err()
            {
                tracing::debug!(epoch, "Page settled after receiver dropped");
            }
        }));

        true
    }

    /// Apply a completed page request.
    ///
    /// Success merges items (dedup by id, first occurrence wins), advances
    /// the cursor and updates `has_more`. Failure only releases the latch.
    /// Completions from another epoch, or for a cursor that is not the one in
    /// flight, are ignored.
    pub fn settle(&mut self, settled: PageSettled) -> Settlement {
        let PageSettled {
            epoch,
            cursor,
            result,
        } = settled;

        if epoch != self.epoch || self.in_flight.as_ref() != Some(&cursor) {
            tracing::debug!(
                expected_epoch = self.epoch,
                got_epoch = epoch,
                %cursor,
                "Ignoring stale page completion"
            );
            return Settlement::Ignored;
        }

        self.in_flight = None;
        self.handle = None;

        match result {
            Ok(page) => Settlement::Merged(self.merge(&cursor, page)),
            Err(source) => {
                tracing::warn!(%cursor, error = %source, "Page fetch failed");
                self.last_error = Some(FeedError::PageFetchFailed { cursor, source });
                Settlement::Failed
            }
        }
    }

    /// Drop all loaded state and start over from the first page.
    ///
    /// Any in-flight request is aborted and its completion, if it still
    /// arrives, is ignored.
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!(epoch = self.epoch, "Aborted in-flight page request on reset");
        }
        self.epoch = next_epoch();
        self.items.clear();
        self.seen.clear();
        self.cursor = Cursor::START;
        self.has_more = true;
        self.in_flight = None;
        self.last_error = None;
        self.pages_loaded = 0;
    }

    fn merge(&mut self, requested: &Cursor, page: FeedPage) -> MergeReport {
        let received = page.items.len();
        let mut added = 0;

        for item in page.items {
            if self.seen.insert(Arc::clone(&item.id)) {
                self.items.push(item);
                added += 1;
            }
        }

        let duplicates = received - added;
        if duplicates > 0 {
            tracing::debug!(%requested, duplicates, "Dropped items already in the feed");
        }

        let (next, has_more) = advance_cursor(requested, page.cursor, received, page.has_more);
        self.cursor = next;
        self.has_more = has_more;
        self.last_error = None;
        self.pages_loaded += 1;

        tracing::debug!(
            %requested,
            next = %self.cursor,
            added,
            total = self.items.len(),
            has_more,
            "Merged feed page"
        );

        MergeReport {
            added,
            duplicates,
            has_more,
        }
    }
}

impl Drop for FeedPaginator {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!(epoch = self.epoch, "Aborted page request on paginator drop");
        }
    }
}

/// Pick the cursor for the following page.
///
/// Cursors never rewind: an offset that fails to move forward is replaced by
/// `requested + received`, and a cursor that still cannot advance (empty
/// page, repeated token, missing token) ends the feed instead of looping on
/// the same page.
fn advance_cursor(
    requested: &Cursor,
    returned: Option<Cursor>,
    received: usize,
    has_more: bool,
) -> (Cursor, bool) {
    match (requested, returned) {
        (Cursor::Offset(req), Some(Cursor::Offset(next))) if next > *req => {
            (Cursor::Offset(next), has_more)
        }
        (Cursor::Offset(req), Some(Cursor::Offset(_)) | None) => {
            let next = req.saturating_add(received as u64);
            if next > *req {
                (Cursor::Offset(next), has_more)
            } else {
                if has_more {
                    tracing::warn!(
                        cursor = req,
                        "Feed cursor did not advance, treating feed as exhausted"
                    );
                }
                (Cursor::Offset(*req), false)
            }
        }
        (_, Some(next)) if next != *requested => (next, has_more),
        (_, Some(next)) => {
            if has_more {
                tracing::warn!(
                    cursor = %next,
                    "Feed returned the same cursor, treating feed as exhausted"
                );
            }
            (next, false)
        }
        (Cursor::Token(_), None) => {
            if has_more {
                tracing::warn!(
                    cursor = %requested,
                    "Feed page has no cursor, treating feed as exhausted"
                );
            }
            (requested.clone(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn video(id: &str) -> VideoDescriptor {
        VideoDescriptor {
            id: Arc::from(id),
            title: Arc::from(format!("Title {}", id).as_str()),
            thumbnail_url: Arc::from("https://img.example.com/t.png"),
            channel_avatar_url: Arc::from("https://img.example.com/a.png"),
            channel_name: Arc::from("Channel"),
        }
    }

    /// Serves `total` items in offset order and records every cursor asked for.
    struct CatalogSource {
        total: u64,
        calls: Mutex<Vec<Cursor>>,
    }

    impl CatalogSource {
        fn new(total: u64) -> Arc<Self> {
            Arc::new(Self {
                total,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Cursor> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PageSource for CatalogSource {
        fn fetch_page(
            &self,
            cursor: Cursor,
            limit: usize,
        ) -> BoxFuture<'static, Result<FeedPage, ApiError>> {
            self.calls.lock().unwrap().push(cursor.clone());
            let start = match cursor {
                Cursor::Offset(n) => n,
                Cursor::Token(_) => 0,
            };
            let end = (start + limit as u64).min(self.total);
            let items = (start..end).map(|i| video(&format!("video-{}", i + 1))).collect();
            let page = FeedPage {
                items,
                cursor: Some(Cursor::Offset(end)),
                has_more: end < self.total,
            };
            async move { Ok(page) }.boxed()
        }
    }

    fn dummy_paginator() -> FeedPaginator {
        FeedPaginator::new(CatalogSource::new(0), 20)
    }

    fn page(ids: &[&str], cursor: u64, has_more: bool) -> FeedPage {
        FeedPage {
            items: ids.iter().map(|id| video(id)).collect(),
            cursor: Some(Cursor::Offset(cursor)),
            has_more,
        }
    }

    async fn load_and_settle(
        paginator: &mut FeedPaginator,
        tx: &mpsc::Sender<PageSettled>,
        rx: &mut mpsc::Receiver<PageSettled>,
    ) -> Settlement {
        assert!(paginator.load_next(tx));
        let settled = rx.recv().await.unwrap();
        paginator.settle(settled)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let paginator = dummy_paginator();
        assert!(paginator.items().is_empty());
        assert!(paginator.has_more());
        assert!(!paginator.in_flight());
        assert_eq!(paginator.cursor(), &Cursor::START);
    }

    #[tokio::test]
    async fn test_load_sets_in_flight_until_settled() {
        let source = CatalogSource::new(120);
        let mut paginator = FeedPaginator::new(source.clone(), 20);
        let (tx, mut rx) = mpsc::channel(8);

        assert!(paginator.load_next(&tx));
        assert!(paginator.in_flight());

        let settled = rx.recv().await.unwrap();
        assert!(paginator.in_flight(), "latch holds until settle is applied");
        let outcome = paginator.settle(settled);

        assert!(!paginator.in_flight());
        assert_eq!(
            outcome,
            Settlement::Merged(MergeReport {
                added: 20,
                duplicates: 0,
                has_more: true
            })
        );
        assert_eq!(paginator.cursor(), &Cursor::Offset(20));
    }

    #[tokio::test]
    async fn test_second_load_while_in_flight_is_noop() {
        let source = CatalogSource::new(120);
        let mut paginator = FeedPaginator::new(source.clone(), 20);
        let (tx, mut rx) = mpsc::channel(8);

        assert!(paginator.load_next(&tx));
        assert!(!paginator.load_next(&tx));
        assert!(!paginator.load_next(&tx));

        let settled = rx.recv().await.unwrap();
        paginator.settle(settled);

        assert_eq!(source.calls(), vec![Cursor::START]);
        assert_eq!(paginator.items().len(), 20);
    }

    #[tokio::test]
    async fn test_exhaustion_stops_requests() {
        let source = CatalogSource::new(30);
        let mut paginator = FeedPaginator::new(source.clone(), 20);
        let (tx, mut rx) = mpsc::channel(8);

        load_and_settle(&mut paginator, &tx, &mut rx).await;
        let last = load_and_settle(&mut paginator, &tx, &mut rx).await;
        assert!(matches!(last, Settlement::Merged(MergeReport { has_more: false, .. })));

        assert!(!paginator.load_next(&tx));
        assert_eq!(paginator.items().len(), 30);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor_and_items() {
        let mut paginator = dummy_paginator();
        paginator.merge(&Cursor::START, page(&["a", "b"], 2, true));
        paginator.in_flight = Some(Cursor::Offset(2));

        let outcome = paginator.settle(PageSettled {
            epoch: paginator.epoch(),
            cursor: Cursor::Offset(2),
            result: Err(ApiError::HttpStatus(500)),
        });

        assert_eq!(outcome, Settlement::Failed);
        assert!(!paginator.in_flight());
        assert!(paginator.has_more());
        assert_eq!(paginator.cursor(), &Cursor::Offset(2));
        assert_eq!(paginator.items().len(), 2);
        assert!(matches!(
            paginator.last_error(),
            Some(FeedError::PageFetchFailed { cursor: Cursor::Offset(2), .. })
        ));
    }

    #[tokio::test]
    async fn test_settle_from_old_epoch_ignored() {
        let mut paginator = dummy_paginator();
        let old_epoch = paginator.epoch();
        paginator.in_flight = Some(Cursor::START);
        paginator.reset();

        let outcome = paginator.settle(PageSettled {
            epoch: old_epoch,
            cursor: Cursor::START,
            result: Ok(page(&["a"], 1, true)),
        });

        assert_eq!(outcome, Settlement::Ignored);
        assert!(paginator.items().is_empty());
        assert_ne!(paginator.epoch(), old_epoch);
    }

    #[tokio::test]
    async fn test_settle_without_request_ignored() {
        let mut paginator = dummy_paginator();
        let outcome = paginator.settle(PageSettled {
            epoch: paginator.epoch(),
            cursor: Cursor::START,
            result: Ok(page(&["a"], 1, true)),
        });
        assert_eq!(outcome, Settlement::Ignored);
        assert!(paginator.items().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_pages_keep_first_position() {
        let mut paginator = dummy_paginator();
        paginator.merge(&Cursor::START, page(&["a", "b", "c"], 3, true));
        let report = paginator.merge(&Cursor::Offset(3), page(&["c", "d", "a", "e"], 7, true));

        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 2);
        let ids: Vec<&str> = paginator.items().iter().map(|v| &*v.id).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_duplicate_keeps_first_seen_fields() {
        let mut paginator = dummy_paginator();
        paginator.merge(&Cursor::START, page(&["a"], 1, true));

        let mut renamed = video("a");
        renamed.title = Arc::from("Renamed");
        paginator.merge(
            &Cursor::Offset(1),
            FeedPage {
                items: vec![renamed],
                cursor: Some(Cursor::Offset(2)),
                has_more: true,
            },
        );

        assert_eq!(&*paginator.items()[0].title, "Title a");
    }

    #[test]
    fn test_advance_cursor_rules() {
        // Normal forward offset
        assert_eq!(
            advance_cursor(&Cursor::Offset(0), Some(Cursor::Offset(20)), 20, true),
            (Cursor::Offset(20), true)
        );
        // Rewinding offset falls back to counting received items
        assert_eq!(
            advance_cursor(&Cursor::Offset(40), Some(Cursor::Offset(20)), 20, true),
            (Cursor::Offset(60), true)
        );
        // Missing offset cursor counts received items
        assert_eq!(
            advance_cursor(&Cursor::Offset(40), None, 5, false),
            (Cursor::Offset(45), false)
        );
        // Empty page that claims more exhausts the feed
        assert_eq!(
            advance_cursor(&Cursor::Offset(40), Some(Cursor::Offset(40)), 0, true),
            (Cursor::Offset(40), false)
        );
        // New token advances
        assert_eq!(
            advance_cursor(&Cursor::START, Some(Cursor::Token("p2".into())), 20, true),
            (Cursor::Token("p2".into()), true)
        );
        // Repeated token exhausts
        assert_eq!(
            advance_cursor(&Cursor::Token("p2".into()), Some(Cursor::Token("p2".into())), 20, true),
            (Cursor::Token("p2".into()), false)
        );
        // Missing token exhausts
        assert_eq!(
            advance_cursor(&Cursor::Token("p2".into()), None, 20, true),
            (Cursor::Token("p2".into()), false)
        );
    }

    proptest! {
        #[test]
        fn prop_merge_never_duplicates_and_keeps_first_seen_order(
            pages in prop::collection::vec(prop::collection::vec(0u8..24, 0..12), 1..8)
        ) {
            let mut paginator = dummy_paginator();
            let mut expected: Vec<String> = Vec::new();
            let mut offset = 0u64;

            for ids in &pages {
                let ids: Vec<String> = ids.iter().map(|n| format!("v{}", n)).collect();
                for id in &ids {
                    if !expected.contains(id) {
                        expected.push(id.clone());
                    }
                }
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                let next = offset + ids.len() as u64;
                paginator.merge(&Cursor::Offset(offset), page(&refs, next, true));
                offset = next;
            }

            let got: Vec<String> = paginator.items().iter().map(|v| v.id.to_string()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
