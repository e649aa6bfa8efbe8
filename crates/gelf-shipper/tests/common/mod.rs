// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::net::TcpListener;
use std::time::Duration;

use gelf_shipper::agent::ShipperAgent;
use gelf_shipper::config::ShipperConfig;
use gelf_shipper::store::KeyValueStore;

/// Config pointing at `url` whose scheduler never fires during a test.
pub fn manual_config(url: &str) -> ShipperConfig {
    ShipperConfig::new(url.parse().expect("valid test url"))
        .with_host("test-host")
        .with_batch_interval(Duration::from_secs(3600))
}

pub fn start_agent(url: &str, store: impl KeyValueStore + 'static) -> ShipperAgent {
    ShipperAgent::start(manual_config(url), store).expect("failed to start agent")
}

/// URL of a local port nothing listens on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let port = listener.local_addr().expect("no local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/gelf")
}
