use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::RecordError;
use super::fold::fold;
use crate::Amount;
use crate::model::{PayoutEntry, RawTransaction, Transaction, TxId, TxKind, UserAggregate, UserId};

/// Everything the cache derives from the transaction history.
///
/// `users` and `payouts` only grow. For every user `payouts[user]` equals
/// `users[user].payout` whenever that payout is nonzero.
#[derive(Debug, Default)]
pub struct CacheState {
    users: HashMap<UserId, UserAggregate>,
    payouts: HashMap<UserId, Amount>,
    /// Ids of folded transactions, to skip re-deliveries.
    /// Never pruned: a re-delivery can arrive at any later refresh, so the set grows
    /// with the number of distinct ids seen.
    folded_ids: HashSet<TxId>,
    /// High-water mark: everything before this instant has been folded
    last_updated: Option<DateTime<Utc>>,
}

/// Counts of one refresh batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FoldSummary {
    pub folded: usize,
    pub invalid: usize,
    pub duplicate: usize,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Advance the high-water mark. It never moves backwards.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(self.last_updated.map_or(now, |last| last.max(now)));
    }

    /// Validate a wire record and fold it.
    pub fn apply_raw(&mut self, raw: RawTransaction) -> Result<(), RecordError> {
        let tx = Transaction::try_from(raw)?;
        self.apply(&tx)
    }

    /// Fold a validated transaction into the user map and, for payouts, the payout
    /// index. Both updates happen together or not at all: every total is computed
    /// before anything is written, and a rejected record does not consume its id.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), RecordError> {
        if let Some(id) = &tx.id {
            if self.folded_ids.contains(id) {
                return Err(RecordError::Duplicate(id.clone()));
            }
        }

        let current = self.user(&tx.user_id);
        let aggregate = fold(current, tx)?;

        let payout = match tx.kind {
            TxKind::Payout => {
                let indexed = self.payouts.get(&tx.user_id).copied().unwrap_or_default();
                let total = indexed.checked_add(tx.amount).ok_or_else(|| RecordError::Overflow {
                    user_id: tx.user_id.clone(),
                    kind: tx.kind,
                    amount: tx.amount,
                })?;
                Some(total)
            }
            _ => None,
        };

        if let Some(id) = &tx.id {
            self.folded_ids.insert(id.clone());
        }
        if let Some(total) = payout {
            self.payouts.insert(tx.user_id.clone(), total);
        }
        self.users.insert(tx.user_id.clone(), aggregate);

        Ok(())
    }

    /// A copy of the user's aggregate, or zero for a user never seen.
    pub fn user(&self, user_id: &str) -> UserAggregate {
        self.users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserAggregate::zero(user_id))
    }

    pub fn users(&self) -> impl Iterator<Item = &UserAggregate> + '_ {
        self.users.values()
    }

    pub fn payouts(&self) -> Vec<PayoutEntry> {
        self.payouts
            .iter()
            .map(|(user_id, amount)| PayoutEntry {
                user_id: user_id.clone(),
                amount: *amount,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tx(id: &str, user: &str, kind: TxKind, amount: i64) -> Transaction {
        Transaction {
            id: Some(id.to_string()),
            ..Transaction::new(user, kind, Amount::from_scaled(amount))
        }
    }

    fn assert_payout_index_consistent(state: &CacheState) {
        for aggregate in state.users() {
            assert!(aggregate.is_consistent());
            let indexed = state.payouts.get(&aggregate.user_id).copied().unwrap_or_default();
            assert_eq!(indexed, aggregate.payout, "user {}", aggregate.user_id);
        }
        for user_id in state.payouts.keys() {
            assert!(state.users.contains_key(user_id));
        }
    }

    #[test]
    fn new_state_is_empty() {
        let state = CacheState::new();
        assert_eq!(state.users().count(), 0);
        assert!(state.payouts().is_empty());
        assert_eq!(state.last_updated(), None);
    }

    #[test]
    fn unseen_user_reads_as_zero_without_being_created() {
        let state = CacheState::new();
        assert_eq!(state.user("ghost"), UserAggregate::zero("ghost"));
        assert_eq!(state.users().count(), 0);
    }

    #[test]
    fn apply_creates_user_lazily_and_accumulates() {
        let mut state = CacheState::new();
        state.apply(&tx("1", "user1", TxKind::Earned, 100)).unwrap();
        state.apply(&tx("2", "user1", TxKind::Spent, 30)).unwrap();

        let user = state.user("user1");
        assert_eq!(user.earned, Amount::from_scaled(100));
        assert_eq!(user.spent, Amount::from_scaled(30));
        assert_eq!(user.payout, Amount::ZERO);
        assert_eq!(user.balance, Amount::from_scaled(70));
        assert_eq!(state.users().count(), 1);
        assert!(state.payouts().is_empty());
    }

    #[test]
    fn payouts_update_both_structures() {
        let mut state = CacheState::new();
        state.apply(&tx("1", "user2", TxKind::Payout, 50)).unwrap();
        state.apply(&tx("2", "user2", TxKind::Payout, 25)).unwrap();
        state.apply(&tx("3", "user3", TxKind::Earned, 10)).unwrap();

        assert_eq!(state.user("user2").balance, Amount::from_scaled(-75));
        assert_eq!(
            state.payouts(),
            vec![PayoutEntry {
                user_id: "user2".to_string(),
                amount: Amount::from_scaled(75),
            }]
        );
        assert_payout_index_consistent(&state);
    }

    #[test]
    fn duplicate_ids_are_folded_once() {
        let mut state = CacheState::new();
        state.apply(&tx("1", "user1", TxKind::Payout, 50)).unwrap();

        let result = state.apply(&tx("1", "user1", TxKind::Payout, 50));
        assert_eq!(result, Err(RecordError::Duplicate("1".to_string())));

        assert_eq!(state.user("user1").payout, Amount::from_scaled(50));
        assert_payout_index_consistent(&state);
    }

    #[test]
    fn overflowing_record_leaves_no_trace() {
        let half = i64::MAX / 2 + 1;
        let mut state = CacheState::new();
        state.apply(&tx("1", "user1", TxKind::Earned, half)).unwrap();
        state.apply(&tx("p1", "user2", TxKind::Payout, half)).unwrap();
        let user1 = state.user("user1");
        let user2 = state.user("user2");

        let result = state.apply(&tx("2", "user1", TxKind::Earned, half));
        assert!(matches!(result, Err(RecordError::Overflow { .. })));
        let result = state.apply(&tx("p2", "user2", TxKind::Payout, half));
        assert!(matches!(result, Err(RecordError::Overflow { .. })));

        assert_eq!(state.user("user1"), user1);
        assert_eq!(state.user("user2"), user2);
        assert_eq!(
            state.payouts(),
            vec![PayoutEntry {
                user_id: "user2".to_string(),
                amount: Amount::from_scaled(half),
            }]
        );
        assert_payout_index_consistent(&state);

        // the rejected ids were not consumed
        state.apply(&tx("2", "user1", TxKind::Spent, 1)).unwrap();
        state.apply(&tx("p2", "user2", TxKind::Earned, 1)).unwrap();
        assert_eq!(state.user("user1").spent, Amount::from_scaled(1));
        assert_eq!(state.user("user2").earned, Amount::from_scaled(1));
    }

    #[test]
    fn transactions_without_id_are_always_folded() {
        let mut state = CacheState::new();
        let tx = Transaction::new("user1", TxKind::Earned, Amount::from_scaled(10));
        state.apply(&tx).unwrap();
        state.apply(&tx).unwrap();
        assert_eq!(state.user("user1").earned, Amount::from_scaled(20));
    }

    #[test]
    fn invalid_records_leave_state_untouched() {
        let mut state = CacheState::new();
        state.apply(&tx("1", "user3", TxKind::Earned, 100)).unwrap();
        let before = state.user("user3");

        let invalid = [
            RawTransaction {
                user_id: None,
                kind: Some("earned".into()),
                amount: Some(json!(100)),
                ..Default::default()
            },
            RawTransaction {
                user_id: Some("user3".into()),
                kind: Some("unknown".into()),
                amount: Some(json!(999)),
                ..Default::default()
            },
            RawTransaction {
                user_id: Some("user3".into()),
                kind: Some("spent".into()),
                amount: Some(json!("not-a-number")),
                ..Default::default()
            },
            RawTransaction {
                user_id: Some("user4".into()),
                kind: Some("payout".into()),
                amount: None,
                ..Default::default()
            },
        ];

        for raw in invalid {
            assert!(state.apply_raw(raw).is_err());
        }

        assert_eq!(state.user("user3"), before);
        assert_eq!(state.users().count(), 1);
        assert!(state.payouts().is_empty());
    }

    #[test]
    fn invalid_record_does_not_consume_its_id() {
        let mut state = CacheState::new();
        let bad = RawTransaction {
            id: Some("tx-9".into()),
            user_id: Some("user1".into()),
            kind: Some("bogus".into()),
            amount: Some(json!(5)),
            created_at: None,
        };
        assert!(state.apply_raw(bad).is_err());

        state.apply(&tx("tx-9", "user1", TxKind::Earned, 5)).unwrap();
        assert_eq!(state.user("user1").earned, Amount::from_scaled(5));
    }

    #[test]
    fn high_water_mark_is_monotonic() {
        let mut state = CacheState::new();
        let t1 = DateTime::from_timestamp(100, 0).unwrap();
        let t0 = DateTime::from_timestamp(50, 0).unwrap();

        state.advance(t1);
        assert_eq!(state.last_updated(), Some(t1));

        state.advance(t0);
        assert_eq!(state.last_updated(), Some(t1));
    }
}
