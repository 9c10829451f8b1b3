//! Core domain types for the aggregation cache.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

/// User identifier.
pub type UserId = String;

/// Transaction identifier, opaque to the engine.
pub type TxId = String;

/// The kind of a transaction, deciding which running total it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    /// Credit earned by the user; raises the balance.
    Earned,
    /// Money spent by the user; lowers the balance.
    Spent,
    /// Money paid out to the user; lowers the balance and is tracked separately.
    Payout,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Earned => "earned",
            TxKind::Spent => "spent",
            TxKind::Payout => "payout",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction type outside the `earned | spent | payout` vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized transaction type '{0}'")]
pub struct UnknownTxKind(pub String);

impl FromStr for TxKind {
    type Err = UnknownTxKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(TxKind::Earned),
            "spent" => Ok(TxKind::Spent),
            "payout" => Ok(TxKind::Payout),
            other => Err(UnknownTxKind(other.to_string())),
        }
    }
}

/// A transaction record as delivered by the upstream source.
///
/// Every field is optional and `amount` is left untyped so that one malformed record
/// does not fail the decoding of a whole page; validation happens at fold time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default)]
    pub id: Option<TxId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated transaction, ready to be folded.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<TxId>,
    pub user_id: UserId,
    pub kind: TxKind,
    pub amount: Amount,
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(user_id: impl Into<UserId>, kind: TxKind, amount: Amount) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            kind,
            amount,
            created_at: None,
        }
    }
}

/// Running totals for one user.
///
/// `balance` always equals `earned - spent - payout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub user_id: UserId,
    pub balance: Amount,
    pub earned: Amount,
    pub spent: Amount,
    pub payout: Amount,
}

impl UserAggregate {
    /// The aggregate of a user with no transactions.
    pub fn zero(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: Amount::ZERO,
            earned: Amount::ZERO,
            spent: Amount::ZERO,
            payout: Amount::ZERO,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.balance == self.earned - self.spent - self.payout
    }
}

/// One row of the payout listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutEntry {
    pub user_id: UserId,
    pub amount: Amount,
}
