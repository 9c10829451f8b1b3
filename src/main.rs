use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use txs_agg::config::Config;
use txs_agg::csv::read_transactions;
use txs_agg::{AggregationCache, MemorySource, SystemClock};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn print_json(body: &impl Serialize) {
    match serde_json::to_string(body) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("failed to encode response: {e}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    if config.input.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %config.input.display(), "input file seems to not be a csv file");
    }

    let rows = match read_transactions(config.input.clone()) {
        Ok(rows) => rows,
        Err(e) => {
            print_json(&ErrorBody {
                error: e.to_string(),
            });
            return ExitCode::FAILURE;
        }
    };

    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in rows {
            match result {
                Ok(raw) => {
                    if tx_sender.send(raw).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let mut source = MemorySource::with_page_size(config.page_size);
    let loaded = source.ingest(ReceiverStream::new(tx_receiver)).await;
    info!(loaded, "transactions loaded");

    let cache = AggregationCache::new(source, SystemClock, config.cache_config());
    let mut status = ExitCode::SUCCESS;

    for user_id in &config.users {
        match cache.user_aggregate(user_id).await {
            Ok(aggregate) => print_json(&aggregate),
            Err(e) => {
                print_json(&ErrorBody {
                    error: e.to_string(),
                });
                status = ExitCode::FAILURE;
            }
        }
    }

    if config.wants_payouts() {
        match cache.list_payouts().await {
            Ok(mut payouts) => {
                payouts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                print_json(&payouts);
            }
            Err(e) => {
                print_json(&ErrorBody {
                    error: e.to_string(),
                });
                status = ExitCode::FAILURE;
            }
        }
    }

    status
}
