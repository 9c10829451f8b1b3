use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;

use crate::source::MemorySource;

/// Tuning of the aggregation cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a refresh stays fresh.
    pub ttl: Duration,
    /// Lower bound of the very first refresh window.
    pub epoch_start: DateTime<Utc>,
}

impl CacheConfig {
    pub const DEFAULT_TTL_MS: i64 = 2 * 60 * 1000;
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::milliseconds(Self::DEFAULT_TTL_MS),
            epoch_start: DateTime::UNIX_EPOCH,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
/// Per-user balances and payouts folded from a transaction history
pub struct Config {
    /// CSV file of transactions (id,userId,type,amount,createdAt)
    pub input: PathBuf,
    #[clap(long = "user", value_name = "USER_ID")]
    /// Print the balance of this user (repeatable)
    pub users: Vec<String>,
    #[clap(long)]
    /// Print the payout listing (default when no user is asked for)
    pub payouts: bool,
    #[clap(
        long,
        env = "TTL_MS",
        default_value_t = CacheConfig::DEFAULT_TTL_MS,
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    /// Cache freshness window, in milliseconds (0 refreshes on every query)
    pub ttl_ms: i64,
    #[clap(long, env = "EPOCH_START", default_value = "1970-01-01T00:00:00Z")]
    /// Lower bound of the first refresh window (RFC 3339)
    pub epoch_start: DateTime<Utc>,
    #[clap(long, env = "PAGE_SIZE", default_value_t = MemorySource::DEFAULT_PAGE_SIZE)]
    /// Records per upstream page
    pub page_size: usize,
}

impl Config {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::milliseconds(self.ttl_ms),
            epoch_start: self.epoch_start,
        }
    }

    /// Whether the payout listing should be printed.
    pub fn wants_payouts(&self) -> bool {
        self.payouts || self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::minutes(2));
        assert_eq!(config.epoch_start, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn parses_defaults() {
        let config = Config::try_parse_from(["txs-agg", "txs.csv"]).unwrap();
        assert_eq!(config.input, PathBuf::from("txs.csv"));
        assert!(config.users.is_empty());
        assert!(config.wants_payouts());
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.cache_config(), CacheConfig::default());
    }

    #[test]
    fn parses_users_and_overrides() {
        let config = Config::try_parse_from([
            "txs-agg",
            "txs.csv",
            "--user",
            "user1",
            "--user",
            "user2",
            "--ttl-ms",
            "5000",
            "--epoch-start",
            "2024-01-01T00:00:00Z",
        ])
        .unwrap();

        assert_eq!(config.users, ["user1", "user2"]);
        assert!(!config.wants_payouts());

        let cache = config.cache_config();
        assert_eq!(cache.ttl, Duration::seconds(5));
        assert_eq!(cache.epoch_start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_negative_ttl() {
        let result = Config::try_parse_from(["txs-agg", "txs.csv", "--ttl-ms=-5"]);
        assert!(result.is_err());

        let config = Config::try_parse_from(["txs-agg", "txs.csv", "--ttl-ms", "0"]).unwrap();
        assert_eq!(config.cache_config().ttl, Duration::zero());
    }

    #[test]
    fn rejects_malformed_epoch_start() {
        let result = Config::try_parse_from(["txs-agg", "txs.csv", "--epoch-start", "yesterday"]);
        assert!(result.is_err());
    }
}
