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

use std::sync::Arc;

use reqwest::StatusCode;

use crate::probe::ProbeClient;
use crate::registry::Handle;
use crate::model::Proxy;

// applies the probe's result to a proxy record. never propagates an error to the
// caller: a failed or non-200 probe is recorded as dead, not dropped.
pub struct Checker {
    probe: Arc<ProbeClient>,
}

impl Checker {
    pub fn new(probe: Arc<ProbeClient>) -> Self {
        Checker { probe }
    }

    pub async fn check(&self, handle: &Handle<Proxy>) {
        let proxy_snapshot = {
            let guard = handle.lock().await;
            guard.clone()
        };

        let connection = proxy_snapshot.connection_string();
        match self.probe.probe(&proxy_snapshot).await {
            Ok(outcome) if outcome.status == StatusCode::OK => {
                let latency = (outcome.latency.as_secs_f64() * 100.0).round() / 100.0;
                tracing::debug!(proxy = %connection, latency, "proxy check passed");
                let mut guard = handle.lock().await;
                guard.is_alive = Some(true);
                guard.latency_seconds = Some(latency);
            }
            Ok(outcome) => {
                tracing::debug!(proxy = %connection, status = %outcome.status, "proxy check rejected by policy");
                let mut guard = handle.lock().await;
                guard.is_alive = Some(false);
            }
            Err(err) => {
                tracing::debug!(proxy = %connection, error = %err, "proxy check failed");
                let mut guard = handle.lock().await;
                guard.is_alive = Some(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scheme;
    use crate::registry::new_handle;

    #[tokio::test]
    async fn marks_dead_when_port_missing() {
        let probe = Arc::new(ProbeClient::new("http://httpbin.org/status/200".to_string(), 1));
        let checker = Checker::new(probe);
        let proxy = Proxy::new("10.0.0.1".to_string(), None, Scheme::Http);
        let handle = new_handle(proxy);

        checker.check(&handle).await;

        let guard = handle.lock().await;
        assert_eq!(guard.is_alive, Some(false));
        assert!(guard.latency_seconds.is_none());
    }
}
