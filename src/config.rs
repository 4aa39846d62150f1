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

use std::env;
use std::fs::File;

use serde::Deserialize;

// overlay loaded from an optional config.yaml, every field optional so the
// file can set just the keys it cares about
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    postgresql_uri: Option<String>,
    tcp_limit_per_host: Option<usize>,
    verify_ssl: Option<bool>,
    limit_checker_queues: Option<usize>,
    limit_check_proxy: Option<usize>,
    start_check_proxy: Option<bool>,
    parse_sources: Option<Vec<String>>,
    delta_minutes_for_check: Option<i64>,
    relay_listen_port: Option<u16>,
    probe_url: Option<String>,
    probe_timeout_seconds: Option<u64>,
    geo_api_base: Option<String>,
    http_listen_addr: Option<String>,
}

// the recognized configuration keys from spec section 6
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub postgresql_uri: String,
    pub tcp_limit_per_host: usize,
    pub verify_ssl: bool,
    pub limit_checker_queues: usize,
    pub limit_check_proxy: usize,
    pub start_check_proxy: bool,
    pub parse_sources: Vec<String>,
    pub delta_minutes_for_check: i64,
    pub relay_listen_port: u16,
    pub probe_url: String,
    pub probe_timeout_seconds: u64,
    pub geo_api_base: String,
    pub http_listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            postgresql_uri: "postgres://localhost/proxyd".to_string(),
            tcp_limit_per_host: 100,
            verify_ssl: false,
            limit_checker_queues: 0,
            limit_check_proxy: 50,
            start_check_proxy: true,
            parse_sources: Vec::new(),
            delta_minutes_for_check: 60,
            relay_listen_port: 5555,
            probe_url: "http://httpbin.org/status/200".to_string(),
            probe_timeout_seconds: 180,
            geo_api_base: "https://freegeoip.app/json/".to_string(),
            http_listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

fn load_yaml_overlay(path: &str) -> ConfigOverlay {
    match File::open(path) {
        Ok(file) => serde_yaml::from_reader(file).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path, "failed to parse config overlay, ignoring");
            ConfigOverlay::default()
        }),
        Err(_) => ConfigOverlay::default(),
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    // env first, then config.yaml overlay, then defaults
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        let overlay = load_yaml_overlay("config.yaml");
        let defaults = AppConfig::default();

        AppConfig {
            postgresql_uri: env_var("POSTGRESQL_URI")
                .or(overlay.postgresql_uri)
                .unwrap_or(defaults.postgresql_uri),
            tcp_limit_per_host: env_var("TCP_limit_per_host")
                .and_then(|v| v.parse().ok())
                .or(overlay.tcp_limit_per_host)
                .unwrap_or(defaults.tcp_limit_per_host),
            verify_ssl: env_var("verify_ssl")
                .and_then(|v| v.parse().ok())
                .or(overlay.verify_ssl)
                .unwrap_or(defaults.verify_ssl),
            limit_checker_queues: env_var("limit_checker_queues")
                .and_then(|v| v.parse().ok())
                .or(overlay.limit_checker_queues)
                .unwrap_or(defaults.limit_checker_queues),
            limit_check_proxy: env_var("limit_check_proxy")
                .and_then(|v| v.parse().ok())
                .or(overlay.limit_check_proxy)
                .unwrap_or(defaults.limit_check_proxy),
            start_check_proxy: env_var("start_check_proxy")
                .and_then(|v| v.parse().ok())
                .or(overlay.start_check_proxy)
                .unwrap_or(defaults.start_check_proxy),
            parse_sources: env_var("PARSE_SOURCES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .or(overlay.parse_sources)
                .unwrap_or(defaults.parse_sources),
            delta_minutes_for_check: env_var("delta_minutes_for_check")
                .and_then(|v| v.parse().ok())
                .or(overlay.delta_minutes_for_check)
                .unwrap_or(defaults.delta_minutes_for_check),
            relay_listen_port: env_var("relay_listen_port")
                .and_then(|v| v.parse().ok())
                .or(overlay.relay_listen_port)
                .unwrap_or(defaults.relay_listen_port),
            probe_url: env_var("probe_url").or(overlay.probe_url).unwrap_or(defaults.probe_url),
            probe_timeout_seconds: env_var("probe_timeout_seconds")
                .and_then(|v| v.parse().ok())
                .or(overlay.probe_timeout_seconds)
                .unwrap_or(defaults.probe_timeout_seconds),
            geo_api_base: env_var("geo_api_base")
                .or(overlay.geo_api_base)
                .unwrap_or(defaults.geo_api_base),
            http_listen_addr: env_var("HTTP_LISTEN_ADDR")
                .or(overlay.http_listen_addr)
                .unwrap_or(defaults.http_listen_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.tcp_limit_per_host, 100);
        assert_eq!(cfg.limit_check_proxy, 50);
        assert!(cfg.start_check_proxy);
        assert_eq!(cfg.delta_minutes_for_check, 60);
        assert_eq!(cfg.relay_listen_port, 5555);
        assert_eq!(cfg.probe_timeout_seconds, 180);
        assert_eq!(cfg.probe_url, "http://httpbin.org/status/200");
        assert_eq!(cfg.geo_api_base, "https://freegeoip.app/json/");
    }
}
