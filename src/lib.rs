pub mod amount;
pub mod clock;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod source;

pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use engine::{AggregationCache, CacheError};
pub use model::{PayoutEntry, RawTransaction, Transaction, TxKind, UserAggregate, UserId};
pub use source::{MemorySource, TransactionSource, Window};
