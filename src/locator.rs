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

use reqwest::StatusCode;

use crate::error::AppError;
use crate::model::Location;
use crate::model::{GeoApiResponse, Proxy};
use crate::registry::Handle;

// a thin client over the geo-IP lookup endpoint. the checker has no equivalent of
// this: it's a separate enrichment hop, never on the hot path of liveness checking.
pub struct LocationClient {
    base_url: String,
    client: reqwest::Client,
}

impl LocationClient {
    pub fn new(base_url: String) -> Self {
        LocationClient {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub async fn lookup(&self, ip: &str) -> Result<Location, AppError> {
        let url = format!("{}{}", self.base_url, ip);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("geo lookup for {ip} failed: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                let body: GeoApiResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::Transient(format!("geo lookup for {ip} returned unparsable body: {e}")))?;
                Ok(body.into())
            }
            StatusCode::FORBIDDEN => Err(AppError::RateLimited),
            other => Err(AppError::Transient(format!("geo lookup for {ip} returned {other}"))),
        }
    }
}

// enriches a Proxy's location in place. always forwards the proxy downstream
// regardless of lookup outcome: enrichment is best-effort, never a gate.
pub struct Locator {
    client: LocationClient,
}

impl Locator {
    pub fn new(client: LocationClient) -> Self {
        Locator { client }
    }

    pub async fn enrich(&self, handle: &Handle<Proxy>) {
        let host = {
            let guard = handle.lock().await;
            guard.host.clone()
        };

        match self.client.lookup(&host).await {
            Ok(location) => {
                let mut guard = handle.lock().await;
                guard.location = Some(location);
            }
            Err(AppError::RateLimited) => {
                tracing::warn!(ip = %host, "geo lookup rate limited");
            }
            Err(err) => {
                tracing::debug!(ip = %host, error = %err, "geo lookup failed, forwarding unenriched");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_a_successful_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/json/1\.2\.3\.4$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "1.2.3.4",
                "country_code": "US",
                "country_name": "United States",
                "region_code": null,
                "region_name": null,
                "city": "Ashburn",
                "zip_code": null,
                "time_zone": null,
                "latitude": 39.0,
                "longitude": -77.4,
                "metro_code": null
            })))
            .mount(&server)
            .await;

        let client = LocationClient::new(format!("{}/json/", server.uri()));
        let location = client.lookup("1.2.3.4").await.unwrap();
        assert_eq!(location.country_code.as_deref(), Some("US"));
        assert_eq!(location.city.as_deref(), Some("Ashburn"));
    }

    #[tokio::test]
    async fn surfaces_rate_limit_as_its_own_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/json/.*$"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = LocationClient::new(format!("{}/json/", server.uri()));
        let result = client.lookup("5.6.7.8").await;
        assert!(matches!(result, Err(AppError::RateLimited)));
    }
}
