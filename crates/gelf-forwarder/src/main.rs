// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use gelf_shipper::{
    agent::ShipperAgent,
    codec::decode_record,
    config::{ShipperConfig, DEFAULT_LOG_LEVEL},
    error::ShipperError,
    record::{Extensions, LogRecord, DEFAULT_LEVEL},
    store::FileKeyValueStore,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("GELF_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or(DEFAULT_LOG_LEVEL.to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}. Shutting down GELF forwarder.");
            return;
        }
    };

    let store = match FileKeyValueStore::open(&config.store_dir) {
        Ok(store) => store,
        Err(e) => {
            error!(
                "Unable to open log store at {}: {e}. Shutting down GELF forwarder.",
                config.store_dir.display()
            );
            return;
        }
    };

    let agent = match ShipperAgent::start(config, store) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Unable to start GELF shipper: {e}. Shutting down GELF forwarder.");
            return;
        }
    };
    info!(
        "GELF forwarder started, shipping stdin to {}",
        agent.config().endpoint
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = forward_line(&agent, &line) {
                        warn!("Dropping input line: {e}");
                        if matches!(e, ShipperError::QueueClosed) {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    debug!("End of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    agent.shutdown().await;
    info!("GELF forwarder stopped");
}

/// A line holding a GELF JSON object is forwarded as that record; any other
/// non-empty line becomes the short message of a new record.
fn forward_line(agent: &ShipperAgent, line: &str) -> Result<(), ShipperError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    match parse_record(line) {
        Some(record) => agent.log_record(record),
        None => agent.log(line, None, DEFAULT_LEVEL, Extensions::new()),
    }
}

fn parse_record(line: &str) -> Option<LogRecord> {
    if !line.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    decode_record(&value).ok()
}
