/**
 * Copyright (c) 2024-2025 ArcX, Inc.
 *
 * This file is part of ArcX Gateway
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::time::{Duration, Instant};

use reqwest::StatusCode;

use crate::error::AppError;
use crate::model::Proxy;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: StatusCode,
    pub latency: Duration,
}

// opens a fresh client per probe, scoped to a single proxy. mirrors the source's
// ProxyClient, which built a brand new requests.Session per check rather than reusing
// a pooled client across proxies.
pub struct ProbeClient {
    probe_url: String,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(probe_url: String, timeout_seconds: u64) -> Self {
        ProbeClient {
            probe_url,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    // issues one GET through `proxy`, retrying connection-class failures up to
    // MAX_ATTEMPTS times. the response body is never read, only the status line.
    pub async fn probe(&self, proxy: &Proxy) -> Result<ProbeOutcome, AppError> {
        let mut last_err = AppError::Transient("no attempt made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(proxy).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }

    async fn attempt(&self, proxy: &Proxy) -> Result<ProbeOutcome, AppError> {
        proxy.validate_for_check()?;

        let upstream = reqwest::Proxy::all(proxy.url())
            .map_err(|e| AppError::Parse(format!("invalid proxy url: {e}")))?;

        let client = reqwest::Client::builder()
            .proxy(upstream)
            .timeout(self.timeout)
            .build()
            .map_err(|e| AppError::Fatal(format!("failed to build probe client: {e}")))?;

        let started = Instant::now();
        let response = client.get(&self.probe_url).send().await.map_err(|e| {
            AppError::Transient(format!("probe request to {} failed: {e}", proxy.connection_string()))
        })?;
        let latency = started.elapsed();

        Ok(ProbeOutcome {
            status: response.status(),
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scheme;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_proxy(port: u16) -> Proxy {
        let mut p = Proxy::new("127.0.0.1".to_string(), Some(port), Scheme::Http);
        p.port = Some(port);
        p
    }

    #[tokio::test]
    async fn succeeds_against_a_200_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/200"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let addr = server.address();
        let client = ProbeClient::new(format!("http://{}/status/200", server.address()), 5);
        let proxy = local_proxy(addr.port());

        // wiremock isn't a forward proxy, so routing through it as an upstream proxy
        // fails at connect time; this exercises the retry path and error surface only,
        // the happy path is exercised at the checker layer with a direct client stub.
        let result = client.probe(&proxy).await;
        assert!(result.is_err());
    }

    #[test]
    fn rejects_proxies_without_a_port() {
        let p = Proxy::new("1.2.3.4".to_string(), None, Scheme::Http);
        assert!(p.validate_for_check().is_err());
    }
}
