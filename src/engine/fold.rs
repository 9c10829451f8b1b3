//! Record validation and the per-user reducer.

use serde_json::Value;

use super::RecordError;
use crate::Amount;
use crate::model::{RawTransaction, Transaction, TxKind, UserAggregate};

impl TryFrom<RawTransaction> for Transaction {
    type Error = RecordError;

    /// Validate a wire record:
    /// - user id present and non-empty
    /// - type present and one of `earned | spent | payout`
    /// - amount a finite, non-negative JSON number with at most 4 decimal places
    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let user_id = raw
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or(RecordError::MissingUserId)?;

        let kind: TxKind = raw.kind.as_deref().ok_or(RecordError::MissingType)?.parse()?;

        let amount = match raw.amount {
            None | Some(Value::Null) => return Err(RecordError::MissingAmount),
            Some(Value::Number(n)) => {
                let value = n
                    .as_f64()
                    .filter(|value| Amount::from_float(*value).is_some())
                    .ok_or_else(|| RecordError::InvalidAmount(n.to_string()))?;
                Amount::from_float_exact(value).ok_or_else(|| RecordError::Precision(n.to_string()))?
            }
            // strings are rejected even when they look numeric
            Some(other) => return Err(RecordError::InvalidAmount(other.to_string())),
        };

        if amount.is_negative() {
            return Err(RecordError::NegativeAmount(amount.to_string()));
        }

        Ok(Transaction {
            id: raw.id,
            user_id,
            kind,
            amount,
            created_at: raw.created_at,
        })
    }
}

/// Apply one transaction to an aggregate.
///
/// Every kind is a pure additive delta, so folding a set of transactions gives the
/// same result in any order. Balances are never clamped and may go negative.
///
/// Fails with [`RecordError::Overflow`] when a total would leave the `Amount` range;
/// the input aggregate is consumed either way, so callers fold a copy.
pub fn fold(mut aggregate: UserAggregate, tx: &Transaction) -> Result<UserAggregate, RecordError> {
    let overflow = || RecordError::Overflow {
        user_id: tx.user_id.clone(),
        kind: tx.kind,
        amount: tx.amount,
    };

    let (total, balance) = match tx.kind {
        TxKind::Earned => (
            aggregate.earned.checked_add(tx.amount),
            aggregate.balance.checked_add(tx.amount),
        ),
        TxKind::Spent => (
            aggregate.spent.checked_add(tx.amount),
            aggregate.balance.checked_sub(tx.amount),
        ),
        TxKind::Payout => (
            aggregate.payout.checked_add(tx.amount),
            aggregate.balance.checked_sub(tx.amount),
        ),
    };
    let (total, balance) = total.zip(balance).ok_or_else(overflow)?;

    match tx.kind {
        TxKind::Earned => aggregate.earned = total,
        TxKind::Spent => aggregate.spent = total,
        TxKind::Payout => aggregate.payout = total,
    }
    aggregate.balance = balance;
    Ok(aggregate)
}
