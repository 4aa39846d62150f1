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

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

// generic worker combinator: pull from input queue, bound by a semaphore, push the result to an
// output queue. this replaces the class-hierarchy approach (BaseTaskHandler / BasePipelineTask)
// the source used to share stage-driver code with a single parameterized driver loop.
pub struct Stage {
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Stage {
    pub fn new() -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Stage {
            running: AtomicBool::new(false),
            stop_tx,
            join: Mutex::new(None),
        })
    }

    /// Starts the driver loop. `process` receives one item per permit and MUST release the
    /// permit (implicit via drop) in every exit path, including panics.
    pub fn start<T, F, Fut>(self: &Arc<Self>, mut input: mpsc::Receiver<T>, semaphore: Arc<Semaphore>, process: F)
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        let mut stop_rx = this.stop_tx.subscribe();
        stop_rx.borrow_and_update();
        this.running.store(true, Ordering::SeqCst);
        let process = Arc::new(process);

        let join = tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    permit = semaphore.clone().acquire_owned() => permit,
                };
                let permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => break, // semaphore closed, stage is shutting down
                };

                let item = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        drop(permit);
                        break;
                    }
                    item = input.recv() => item,
                };

                match item {
                    Some(item) => {
                        let process = Arc::clone(&process);
                        tokio::spawn(async move {
                            process(item).await;
                            drop(permit);
                        });
                    }
                    None => {
                        // input queue closed, no more work will ever arrive
                        drop(permit);
                        break;
                    }
                }
            }
            this.running.store(false, Ordering::SeqCst);
        });

        *self.join.lock().unwrap() = Some(join);
    }

    /// Cancels the driver. In-flight `processing` tasks run to completion. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Stage {
    fn default() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Stage {
            running: AtomicBool::new(false),
            stop_tx,
            join: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn processes_items_and_respects_concurrency_bound() {
        let (tx, rx) = mpsc::channel(8);
        let semaphore = Arc::new(Semaphore::new(2));
        let inflight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let stage = Stage::new();
        {
            let inflight = Arc::clone(&inflight);
            let max_seen = Arc::clone(&max_seen);
            stage.start(rx, semaphore, move |item: u32| {
                let inflight = Arc::clone(&inflight);
                let max_seen = Arc::clone(&max_seen);
                async move {
                    let now = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    inflight.fetch_sub(1, Ordering::SeqCst);
                    let _ = item;
                }
            });
        }

        for i in 0..6u32 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_driver_exits() {
        let (_tx, rx) = mpsc::channel::<u32>(1);
        let semaphore = Arc::new(Semaphore::new(1));
        let stage = Stage::new();
        stage.start(rx, semaphore, |_item: u32| async {});
        stage.stop();
        stage.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stage.is_running());
    }
}
