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

mod api;
mod checker;
mod config;
mod error;
mod locator;
mod model;
mod persistence;
mod pipeline;
mod probe;
mod registry;
mod relay;
mod rescheduler;
mod sources;
mod stage;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::ApiState;
use crate::config::AppConfig;
use crate::pipeline::Pipeline;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AppConfig::load();
    tracing::info!(relay_port = config.relay_listen_port, http = %config.http_listen_addr, "starting");

    let mut pipeline = match Pipeline::build(config.clone()).await {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!(error = %err, "failed to build pipeline");
            std::process::exit(1);
        }
    };

    let api_state = Arc::new(ApiState {
        queue_api_to_db: pipeline.queue_api_to_db.clone(),
        proxy_registry: Arc::clone(&pipeline.proxy_registry),
    });
    let app = api::router(api_state);

    let http_listener = match tokio::net::TcpListener::bind(&config.http_listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %config.http_listen_addr, "failed to bind http listener");
            std::process::exit(1);
        }
    };

    let relay_factory = Arc::clone(&pipeline.relay_factory);
    let relay_port = config.relay_listen_port;
    tokio::spawn(async move {
        if let Err(err) = relay::serve(relay_port, relay_factory).await {
            tracing::error!(error = %err, "relay exited");
        }
    });

    let http_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(http_listener, app).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_server => {
            tracing::warn!("http server task ended unexpectedly");
        }
        result = &mut pipeline.persistence_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("persistence writer ended unexpectedly"),
                Ok(Err(err)) => tracing::error!(error = %err, "persistence writer failed, shutting down"),
                Err(join_err) => tracing::error!(error = %join_err, "persistence writer task panicked"),
            }
        }
    }

    pipeline.shutdown().await;
    tracing::info!("shutdown complete");
}
