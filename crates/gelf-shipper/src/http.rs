// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the delivery client.

use core::time::Duration;
use std::error::Error;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::error;

use crate::config::ShipperConfig;
use crate::error::ShipperError;

/// Builds the client used to POST batches.
///
/// An unusable proxy setting is logged and the client falls back to a direct
/// connection, so a typo in `HTTPS_PROXY` does not stop log shipping.
pub fn get_client(config: &ShipperConfig) -> Result<reqwest::Client, ShipperError> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(config, false).map_err(|inner| ShipperError::HttpClient(inner.to_string()))
        }
    }
}

fn build_client(config: &ShipperConfig, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }

    Ok(client.build()?)
}

/// Headers sent with every batch: JSON content type plus the configured extras.
pub fn batch_headers(extra: &[(String, String)]) -> Result<HeaderMap, Box<dyn Error + Send + Sync>> {
    let mut headers = HeaderMap::with_capacity(extra.len() + 1);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    Ok(headers)
}
