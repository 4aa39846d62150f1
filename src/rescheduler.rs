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

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

use crate::model::Proxy;
use crate::persistence::proxy_repo::ProxyRepo;
use crate::registry::{new_handle, Handle, LiveRegistry};

const STATE_RUNNING: u8 = 0;
const STATE_PAUSED: u8 = 1;
const STATE_STOPPED: u8 = 2;

const IDLE_SLEEP: Duration = Duration::from_secs(1);

// continually claims rows due for a (re)check and feeds them to the ingress queue. a
// claimed row is never handed out to a second tick: claim_due() flips in_process
// inside its own transaction.
pub struct Rescheduler {
    repo: ProxyRepo,
    registry: Arc<LiveRegistry<Proxy>>,
    delta_minutes: i64,
    state: AtomicU8,
    join: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Rescheduler {
    pub fn new(repo: ProxyRepo, registry: Arc<LiveRegistry<Proxy>>, delta_minutes: i64) -> Arc<Self> {
        Arc::new(Rescheduler {
            repo,
            registry,
            delta_minutes,
            state: AtomicU8::new(STATE_RUNNING),
            join: std::sync::Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>, ingress: Sender<Handle<Proxy>>) {
        let this = Arc::clone(self);
        let join = tokio::spawn(async move {
            loop {
                match this.state.load(Ordering::SeqCst) {
                    STATE_STOPPED => break,
                    STATE_PAUSED => {
                        tokio::time::sleep(IDLE_SLEEP).await;
                        continue;
                    }
                    _ => {}
                }

                match this.repo.claim_due(this.delta_minutes).await {
                    Ok(Some(proxy)) => {
                        let handle = new_handle(proxy);
                        this.registry.register(&handle);
                        // blocks if Q_ingress is full, which is the intended back-pressure
                        if ingress.send(handle).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tokio::time::sleep(IDLE_SLEEP).await;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "rescheduler claim failed, backing off");
                        tokio::time::sleep(IDLE_SLEEP).await;
                    }
                }
            }
        });
        *self.join.lock().unwrap() = Some(join);
    }

    pub fn pause(&self) {
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
    }
}
