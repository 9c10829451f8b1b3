//! Upstream transaction source.
//!
//! A [`TransactionSource`] answers one page of a half-open time window at a time.
//! [`fetch_window`] hides the paging and returns every record of the window.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RawTransaction;

mod memory;
pub use memory::MemorySource;

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Paging metadata attached to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_items: usize,
    pub item_count: usize,
    pub items_per_page: usize,
    pub total_pages: u32,
    pub current_page: u32,
}

/// One page of a window, as returned by the upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<RawTransaction>,
    #[serde(default)]
    pub meta: PageMeta,
}

/// Errors raised while talking to the upstream.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source responded with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("asked for page {requested}, got page {returned} of {total}")]
    Pagination {
        requested: u32,
        returned: u32,
        total: u32,
    },
}

/// A source of transaction records.
///
/// Pages are numbered from 1. Implementations must return records whose timestamp
/// lies inside `window`, and report in `meta` how many pages the window spans.
pub trait TransactionSource: Send + Sync {
    fn fetch(
        &self,
        window: Window,
        page: u32,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send;
}

impl<S: TransactionSource> TransactionSource for std::sync::Arc<S> {
    fn fetch(
        &self,
        window: Window,
        page: u32,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send {
        (**self).fetch(window, page)
    }
}

/// Fetch every record of `window`, walking pages until `meta.totalPages` is reached.
///
/// Any page failure fails the whole window; partial results are discarded.
pub async fn fetch_window<S: TransactionSource>(
    source: &S,
    window: Window,
) -> Result<Vec<RawTransaction>, SourceError> {
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let mut response = source.fetch(window, page).await?;

        // An empty window may legitimately report zero pages
        if response.meta.total_pages == 0 {
            items.append(&mut response.items);
            break;
        }

        if response.meta.current_page != page {
            return Err(SourceError::Pagination {
                requested: page,
                returned: response.meta.current_page,
                total: response.meta.total_pages,
            });
        }

        items.append(&mut response.items);

        if page >= response.meta.total_pages {
            break;
        }
        page += 1;
    }

    Ok(items)
}
