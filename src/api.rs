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

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::model::Proxy;
use crate::registry::{new_handle, Handle, LiveRegistry};

pub struct ApiState {
    pub queue_api_to_db: UnboundedSender<Handle<Proxy>>,
    pub proxy_registry: Arc<LiveRegistry<Proxy>>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/proxy", post(submit_proxies))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"test": "hello word"}))
}

#[derive(Deserialize)]
struct SubmitProxiesRequest {
    proxys: Vec<String>,
}

#[derive(Serialize)]
struct SubmitProxiesResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// all-or-nothing: every entry must parse before any is enqueued
async fn submit_proxies(State(state): State<Arc<ApiState>>, body: Result<Json<SubmitProxiesRequest>, axum::extract::rejection::JsonRejection>) -> impl IntoResponse {
    let Json(request) = match body {
        Ok(json) => json,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: err.to_string() })).into_response();
        }
    };

    let mut parsed = Vec::with_capacity(request.proxys.len());
    for raw in &request.proxys {
        match Proxy::from_url(raw) {
            Ok(proxy) => parsed.push(proxy),
            Err(err) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: err.to_string() })).into_response();
            }
        }
    }

    for proxy in parsed {
        let handle = new_handle(proxy);
        state.proxy_registry.register(&handle);
        if state.queue_api_to_db.send(handle).is_err() {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "ingress is shutting down".to_string(),
                }),
            )
                .into_response();
        }
    }

    (StatusCode::OK, Json(SubmitProxiesResponse { status: "put to processing" })).into_response()
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(rename = "Proxy")]
    proxy: usize,
    #[serde(rename = "Location")]
    location: usize,
}

// Location has no independent handle in this design, it lives embedded in whichever
// Proxy it enriched, so its "live count" is the live proxies that carry one
async fn stats(State(state): State<Arc<ApiState>>) -> Json<StatsResponse> {
    let live = state.proxy_registry.snapshot();
    let mut with_location = 0usize;
    for handle in &live {
        if handle.lock().await.location.is_some() {
            with_location += 1;
        }
    }
    Json(StatsResponse {
        proxy: live.len(),
        location: with_location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> (Arc<ApiState>, tokio::sync::mpsc::UnboundedReceiver<Handle<Proxy>>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let state = Arc::new(ApiState {
            queue_api_to_db: tx,
            proxy_registry: Arc::new(LiveRegistry::new()),
        });
        (state, rx)
    }

    #[tokio::test]
    async fn submit_rejects_the_whole_batch_on_one_bad_entry() {
        let (state, mut rx) = test_state();
        let app = router(state);

        let body = serde_json::json!({"proxys": ["http://1.2.3.4:80", "not-a-url"]});
        let response = app
            .oneshot(
                Request::post("/proxy")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn submit_enqueues_every_entry_when_all_parse() {
        let (state, mut rx) = test_state();
        let app = router(state);

        let body = serde_json::json!({"proxys": ["http://1.2.3.4:80", "socks5://5.6.7.8:1080"]});
        let response = app
            .oneshot(
                Request::post("/proxy")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stats_reports_live_counts() {
        let (state, _rx) = test_state();
        let proxy_handle = new_handle(Proxy::new("1.2.3.4".to_string(), Some(80), crate::model::Scheme::Http));
        state.proxy_registry.register(&proxy_handle);
        let app = router(state);

        let response = app.oneshot(Request::get("/stats").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn root_returns_the_fixed_greeting() {
        let (state, _rx) = test_state();
        let app = router(state);

        let response = app.oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"test": "hello word"}));
    }
}
