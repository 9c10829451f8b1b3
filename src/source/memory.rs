use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use super::{Page, PageMeta, SourceError, TransactionSource, Window};
use crate::model::RawTransaction;

/// An in-process upstream holding its records in memory.
///
/// Records are served ordered by timestamp and split into pages of `page_size`.
/// Records without a timestamp belong to no window and are never served.
#[derive(Debug)]
pub struct MemorySource {
    records: Vec<RawTransaction>,
    page_size: usize,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// The upstream never returns more than this many records per page.
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    pub fn new() -> Self {
        Self::with_page_size(Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            records: Vec::new(),
            page_size: page_size.max(1),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn push(&mut self, record: RawTransaction) {
        let at = self
            .records
            .partition_point(|existing| existing.created_at <= record.created_at);
        self.records.insert(at, record);
    }

    /// Drain a stream of records into the source, returning how many were added.
    pub async fn ingest(&mut self, mut stream: impl Stream<Item = RawTransaction> + Unpin) -> usize {
        let mut added = 0;
        while let Some(record) = stream.next().await {
            self.records.push(record);
            added += 1;
        }
        self.records.sort_by_key(|record| record.created_at);
        debug!(added, total = self.records.len(), "records ingested");
        added
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of page requests served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<RawTransaction> for MemorySource {
    fn from_iter<I: IntoIterator<Item = RawTransaction>>(iter: I) -> Self {
        let mut source = Self::new();
        source.records.extend(iter);
        source.records.sort_by_key(|record| record.created_at);
        source
    }
}

impl TransactionSource for MemorySource {
    async fn fetch(&self, window: Window, page: u32) -> Result<Page, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let matching: Vec<&RawTransaction> = self
            .records
            .iter()
            .filter(|record| record.created_at.is_some_and(|at| window.contains(at)))
            .collect();

        let total_items = matching.len();
        let total_pages = total_items.div_ceil(self.page_size) as u32;

        if page == 0 || (total_pages > 0 && page > total_pages) {
            return Err(SourceError::Status(404));
        }

        let items: Vec<RawTransaction> = matching
            .into_iter()
            .skip((page as usize - 1) * self.page_size)
            .take(self.page_size)
            .cloned()
            .collect();

        Ok(Page {
            meta: PageMeta {
                total_items,
                item_count: items.len(),
                items_per_page: self.page_size,
                total_pages,
                current_page: page,
            },
            items,
        })
    }
}
