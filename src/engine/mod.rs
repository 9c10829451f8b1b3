//! Aggregation cache engine.
//!
//! The cache folds upstream transactions into per-user running totals and a payout
//! index. Queries refresh it on demand: when the last refresh is older than the TTL,
//! the records since the high-water mark are fetched and folded before answering.

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::model::{PayoutEntry, RawTransaction, UserAggregate};
use crate::source::{TransactionSource, Window, fetch_window};

mod error;
pub use error::{CacheError, RecordError};

mod fold;
pub use fold::fold;

mod state;
pub use state::{CacheState, FoldSummary};

/// The aggregation cache.
///
/// All derived state sits behind one async mutex. A query holds it across the
/// freshness check, the upstream fetch and the fold, so at most one refresh runs at a
/// time and callers arriving meanwhile read the refreshed state once it completes.
pub struct AggregationCache<S, C> {
    source: S,
    clock: C,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

/// Public API
impl<S: TransactionSource, C: Clock> AggregationCache<S, C> {
    pub fn new(source: S, clock: C, config: CacheConfig) -> Self {
        Self {
            source,
            clock,
            config,
            state: Mutex::new(CacheState::new()),
        }
    }

    /// Totals for one user; a user with no transactions reads as zero.
    pub async fn user_aggregate(&self, user_id: &str) -> Result<UserAggregate, CacheError> {
        if user_id.is_empty() {
            return Err(CacheError::InvalidArgument("user id is required"));
        }

        let state = self.fresh_state().await?;
        Ok(state.user(user_id))
    }

    /// Every user with recorded payouts and their cumulative amount, in no particular
    /// order.
    pub async fn list_payouts(&self) -> Result<Vec<PayoutEntry>, CacheError> {
        let state = self.fresh_state().await?;
        Ok(state.payouts())
    }

    /// Refresh from upstream unless the last refresh is younger than the TTL.
    pub async fn ensure_fresh(&self) -> Result<(), CacheError> {
        self.fresh_state().await.map(drop)
    }

    /// When the cache last refreshed successfully.
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_updated()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Private API
impl<S: TransactionSource, C: Clock> AggregationCache<S, C> {
    /// Lock the state and bring it up to date.
    ///
    /// `now` is read after the lock is acquired so that a caller which waited on a
    /// concurrent refresh sees that refresh's high-water mark and does not fetch again.
    async fn fresh_state(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(last) = state.last_updated() {
            if now - last < self.config.ttl {
                return Ok(state);
            }
        }

        self.refresh(&mut state, now).await?;
        Ok(state)
    }

    /// Fetch `[high-water mark, now)` and fold it. On failure nothing is folded and the
    /// high-water mark stays put, so the next query retries the same window.
    async fn refresh(&self, state: &mut CacheState, now: DateTime<Utc>) -> Result<(), CacheError> {
        let start = state.last_updated().unwrap_or(self.config.epoch_start);
        let window = Window::new(start, now);

        let records = match fetch_window(&self.source, window).await {
            Ok(records) => records,
            Err(e) => {
                warn!(start = %window.start, end = %window.end, reason = %e, "refresh failed");
                return Err(e.into());
            }
        };

        let summary = Self::fold_batch(state, records);
        state.advance(now);

        info!(
            start = %window.start,
            end = %window.end,
            folded = summary.folded,
            invalid = summary.invalid,
            duplicate = summary.duplicate,
            "cache refreshed"
        );

        Ok(())
    }

    /// Fold a fetched batch; records that fail validation are logged and dropped.
    fn fold_batch(state: &mut CacheState, records: Vec<RawTransaction>) -> FoldSummary {
        let mut summary = FoldSummary::default();

        for raw in records {
            let id = raw.id.clone().unwrap_or_default();
            match state.apply_raw(raw) {
                Ok(()) => summary.folded += 1,
                Err(e @ RecordError::Duplicate(_)) => {
                    summary.duplicate += 1;
                    warn!(tx = %id, reason = %e, "transaction skipped");
                }
                Err(e) => {
                    summary.invalid += 1;
                    warn!(tx = %id, reason = %e, "transaction skipped");
                }
            }
        }

        summary
    }
}
