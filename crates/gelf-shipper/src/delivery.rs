// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch to the collector.
//!
//! A batch is POSTed as a single JSON array. The collector accepts or rejects
//! the whole batch: only `202 Accepted` counts as delivered, every other status
//! (including other 2xx codes) and every transport failure leaves the batch
//! pending for the next cycle.
//!
//! ```text
//!   Idle ──> Encoding ──> Sending ──┬──> Acknowledged   (202)
//!               │                   ├──> Rejected       (any other status)
//!               v                   └──> TransportFailed (connect/timeout)
//!          EncodingFailed
//! ```

use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use tracing::{debug, error};

use crate::codec::encode_batch;
use crate::config::ShipperConfig;
use crate::error::{DeliveryError, ShipperError};
use crate::http::{batch_headers, get_client};
use crate::record::LogRecord;

#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl DeliveryClient {
    pub fn new(config: &ShipperConfig) -> Result<Self, ShipperError> {
        let headers = batch_headers(&config.headers)
            .map_err(|e| ShipperError::InvalidConfig(format!("invalid header: {e}")))?;
        Ok(Self {
            client: get_client(config)?,
            endpoint: config.endpoint.clone(),
            headers,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends `records` as one POST. `Ok` means the collector answered 202.
    pub async fn send<'a, I>(&self, records: I) -> Result<(), DeliveryError>
    where
        I: IntoIterator<Item = &'a LogRecord>,
    {
        let body = match encode_batch(records) {
            Ok(body) => body,
            Err(e) => {
                error!("Error serializing log batch: {e}");
                return Err(e.into());
            }
        };
        debug!("Sending {} bytes of logs to {}", body.len(), self.endpoint);

        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send logs: {e}");
                DeliveryError::Transport(e)
            })?;

        let status = resp.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        // Only read the body on failure, it is not needed otherwise.
        let body = resp.text().await.unwrap_or_default();
        error!("{status}: Failed to send logs, collector rejected batch: {body:?}");
        Err(DeliveryError::Rejected { status, body })
    }
}
