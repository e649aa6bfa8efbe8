// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide agent for code that cannot carry a [`ShipperAgent`] around.
//!
//! The agent is installed once with [`configure`] and lives until the process
//! exits. Calling [`log`] before that returns [`ShipperError::NotConfigured`].

use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::warn;

use crate::agent::ShipperAgent;
use crate::config::ShipperConfig;
use crate::error::ShipperError;
use crate::record::Extensions;
use crate::store::KeyValueStore;

static AGENT: OnceLock<ShipperAgent> = OnceLock::new();
static CONFIGURE_LOCK: Mutex<()> = Mutex::new(());

/// Starts and installs the process-wide agent.
///
/// Returns `Ok(false)` without touching the installed agent if one is already
/// configured. Must be called from within a tokio runtime.
pub fn configure(
    config: ShipperConfig,
    kv_store: impl KeyValueStore + 'static,
) -> Result<bool, ShipperError> {
    let _lock = CONFIGURE_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if AGENT.get().is_some() {
        warn!("GELF shipper already configured, ignoring new configuration");
        return Ok(false);
    }

    let agent = ShipperAgent::start(config, kv_store)?;
    if AGENT.set(agent).is_err() {
        warn!("GELF shipper already configured, ignoring new configuration");
        return Ok(false);
    }
    Ok(true)
}

/// The installed agent.
pub fn shared() -> Result<&'static ShipperAgent, ShipperError> {
    AGENT.get().ok_or(ShipperError::NotConfigured)
}

/// [`ShipperAgent::log`] on the installed agent.
pub fn log(
    short_message: impl Into<String>,
    full_message: Option<String>,
    level: i64,
    extensions: Extensions,
) -> Result<(), ShipperError> {
    shared()?.log(short_message, full_message, level, extensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;
    use std::time::Duration;
    use tracing_test::traced_test;

    // The agent is process-wide, so the whole lifecycle lives in one test.
    #[tokio::test]
    #[traced_test]
    async fn test_global_lifecycle() {
        let err = log("too early", None, 1, Extensions::new()).unwrap_err();
        assert!(matches!(err, ShipperError::NotConfigured));
        assert!(shared().is_err());

        let config = ShipperConfig::new("http://127.0.0.1:9/gelf".parse().unwrap())
            .with_host("global-host")
            .with_batch_interval(Duration::from_secs(3600));
        assert!(configure(config.clone(), MemoryKeyValueStore::new()).unwrap());

        let second = config.with_host("other-host");
        assert!(!configure(second, MemoryKeyValueStore::new()).unwrap());
        assert!(logs_contain("already configured"));
        assert_eq!(shared().unwrap().config().host, "global-host");

        log("boot", None, 6, Extensions::new()).unwrap();
        let batch = shared().unwrap().queue().flush().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].record.host(), "global-host");
    }
}
