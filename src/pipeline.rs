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

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::checker::Checker;
use crate::config::AppConfig;
use crate::locator::{LocationClient, Locator};
use crate::model::Proxy;
use crate::persistence::location_repo::LocationRepo;
use crate::persistence::proxy_repo::ProxyRepo;
use crate::persistence::{pool, PersistenceGateway};
use crate::probe::ProbeClient;
use crate::registry::{new_handle, Handle, LiveRegistry};
use crate::relay::ProxyFactory;
use crate::rescheduler::Rescheduler;
use crate::sources::static_list::StaticListSource;
use crate::sources::{self, Source};
use crate::stage::Stage;
use crate::error::AppError;

// the locator has no configuration key of its own, spec's default max_tasks applies
const DEFAULT_LOCATOR_CONCURRENCY: usize = 20;

// owns every long-running task and the handles needed to drain them in order at
// shutdown: pause intake first, let in-flight work settle, then tear down storage.
pub struct Pipeline {
    pub config: AppConfig,
    pub proxy_registry: Arc<LiveRegistry<Proxy>>,
    pub queue_api_to_db: mpsc::UnboundedSender<Handle<Proxy>>,
    pub persistence: Arc<PersistenceGateway>,
    pub rescheduler: Arc<Rescheduler>,
    pub checker_stage: Arc<Stage>,
    pub locator_stage: Arc<Stage>,
    pub relay_factory: Arc<ProxyFactory>,
    // Err(_) or a panic here means the persistence writer hit a storage failure and
    // re-raised instead of dropping the item; main.rs treats this as fatal.
    pub persistence_task: JoinHandle<Result<(), AppError>>,
}

impl Pipeline {
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let pg_pool = pool::connect(&config.postgresql_uri).await?;
        let proxy_repo = ProxyRepo::new(pg_pool.clone());
        let location_repo = LocationRepo::new(pg_pool);
        let persistence = Arc::new(PersistenceGateway::new(proxy_repo.clone(), location_repo));

        let proxy_registry = Arc::new(LiveRegistry::<Proxy>::new());

        // Q_ingress: rescheduler -> checker, bounded per limit_checker_queues (0 = unbounded)
        const EFFECTIVELY_UNBOUNDED: usize = 1_000_000;
        let ingress_capacity = if config.limit_checker_queues == 0 {
            EFFECTIVELY_UNBOUNDED
        } else {
            config.limit_checker_queues
        };
        let (ingress_tx, ingress_rx) = mpsc::channel(ingress_capacity);

        // Q_checked: checker -> locator
        let (checked_tx, checked_rx) = mpsc::channel(config.limit_check_proxy.max(1) * 2);
        // Q_located: locator -> persistence
        let (located_tx, mut located_rx) = mpsc::channel::<Handle<Proxy>>(config.limit_check_proxy.max(1) * 2);
        // queue_api_to_db: operator API + sources -> persistence (brand-new submissions)
        let (api_to_db_tx, mut api_to_db_rx) = mpsc::unbounded_channel::<Handle<Proxy>>();

        let probe = Arc::new(ProbeClient::new(config.probe_url.clone(), config.probe_timeout_seconds));
        let checker = Arc::new(Checker::new(probe));
        let checker_stage = Stage::new();
        {
            let checker = Arc::clone(&checker);
            let checked_tx = checked_tx.clone();
            checker_stage.start(
                ingress_rx,
                Arc::new(tokio::sync::Semaphore::new(config.limit_check_proxy)),
                move |handle: Handle<Proxy>| {
                    let checker = Arc::clone(&checker);
                    let checked_tx = checked_tx.clone();
                    async move {
                        checker.check(&handle).await;
                        let _ = checked_tx.send(handle).await;
                    }
                },
            );
        }

        let locator = Arc::new(Locator::new(LocationClient::new(config.geo_api_base.clone())));
        let locator_stage = Stage::new();
        {
            let locator = Arc::clone(&locator);
            let located_tx = located_tx.clone();
            locator_stage.start(
                checked_rx,
                Arc::new(tokio::sync::Semaphore::new(DEFAULT_LOCATOR_CONCURRENCY)),
                move |handle: Handle<Proxy>| {
                    let locator = Arc::clone(&locator);
                    let located_tx = located_tx.clone();
                    async move {
                        locator.enrich(&handle).await;
                        let _ = located_tx.send(handle).await;
                    }
                },
            );
        }

        // persistence writer: merges the two ingress points, no concurrency bound
        // beyond the pool's own connection limit. unlike the checker/locator stages,
        // a storage failure here is not logged-and-dropped: it re-raises out of the
        // task so the failure is visible to whatever is watching persistence_task,
        // rather than being silently swallowed like a single bad checker/locator item.
        let persistence_task = {
            let persistence = Arc::clone(&persistence);
            let proxy_registry = Arc::clone(&proxy_registry);
            tokio::spawn(async move {
                loop {
                    let (handle, context) = tokio::select! {
                        Some(handle) = located_rx.recv() => (handle, "checked proxy"),
                        Some(handle) = api_to_db_rx.recv() => (handle, "submitted proxy"),
                        else => break,
                    };
                    proxy_registry.register(&handle);
                    if let Err(err) = persistence.save(&handle).await {
                        tracing::error!(error = %err, context, "persistence write failed, surfacing condition");
                        return Err(err);
                    }
                }
                Ok(())
            })
        };

        let rescheduler = Rescheduler::new(proxy_repo.clone(), Arc::clone(&proxy_registry), config.delta_minutes_for_check);
        if config.start_check_proxy {
            rescheduler.start(ingress_tx);
        }

        if !config.parse_sources.is_empty() {
            // each entry in PARSE_SOURCES is a path to a newline-delimited proxy list;
            // a real scraper would implement Source directly and be registered here instead
            let mut source_list: Vec<Box<dyn Source>> = Vec::new();
            for path in &config.parse_sources {
                match StaticListSource::from_file(path.clone(), path).await {
                    Ok(source) => source_list.push(Box::new(source)),
                    Err(err) => tracing::warn!(path, error = %err, "failed to load source list, skipping"),
                }
            }
            let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
            sources::spawn_all(source_list, raw_tx);
            let api_to_db_tx = api_to_db_tx.clone();
            tokio::spawn(async move {
                while let Some(proxy) = raw_rx.recv().await {
                    let _ = api_to_db_tx.send(new_handle(proxy));
                }
            });
        }

        let relay_factory = Arc::new(ProxyFactory::new(proxy_repo));

        Ok(Pipeline {
            config,
            proxy_registry,
            queue_api_to_db: api_to_db_tx,
            persistence,
            rescheduler,
            checker_stage,
            locator_stage,
            relay_factory,
            persistence_task,
        })
    }

    // pause intake, let whatever is live drain back with in_process cleared, then stop
    pub async fn shutdown(&self) {
        self.rescheduler.pause();
        let live = self.proxy_registry.snapshot();
        for handle in live {
            let mut guard = handle.lock().await;
            guard.in_process = false;
            let proxy = guard.clone();
            drop(guard);
            if let Err(err) = self.persistence.proxies.update(&proxy).await {
                tracing::warn!(error = %err, proxy = %proxy.connection_string(), "failed to release proxy during shutdown");
            }
        }
        self.rescheduler.stop();
        self.checker_stage.stop();
        self.locator_stage.stop();
    }
}
