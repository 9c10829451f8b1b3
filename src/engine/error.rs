//! Error types for the aggregation cache.

use thiserror::Error;

use crate::Amount;
use crate::model::{TxId, TxKind, UnknownTxKind};
use crate::source::SourceError;

/// Error returned by the query surface of [`AggregationCache`](super::AggregationCache).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("failed to fetch transactions: {0}")]
    FetchFailure(#[from] SourceError),
}

/// Reason a transaction record was not folded.
///
/// These never reach callers; the record is logged and dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("missing user id")]
    MissingUserId,

    #[error("missing transaction type")]
    MissingType,

    #[error(transparent)]
    UnrecognizedType(#[from] UnknownTxKind),

    #[error("missing amount")]
    MissingAmount,

    #[error("amount {0} is not a finite number")]
    InvalidAmount(String),

    #[error("negative amount {0}")]
    NegativeAmount(String),

    /// Amounts are kept to four decimal places; finer values are rejected rather
    /// than rounded.
    #[error("amount {0} has more than 4 decimal places")]
    Precision(String),

    #[error("{kind} of {amount} overflows the totals of user {user_id}")]
    Overflow {
        user_id: String,
        kind: TxKind,
        amount: Amount,
    },

    #[error("transaction {0} already folded")]
    Duplicate(TxId),
}
