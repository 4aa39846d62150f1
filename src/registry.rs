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

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Mutex as AsyncMutex;

// a pipeline value shared across stages, mutated in place while it is live
pub type Handle<T> = Arc<AsyncMutex<T>>;

pub fn new_handle<T>(value: T) -> Handle<T> {
    Arc::new(AsyncMutex::new(value))
}

// process-wide weak set of live Proxy/Location handles, used only at shutdown and by /stats.
// registering never extends a value's lifetime: once the last Handle clone is dropped by the
// pipeline, the entry here stops upgrading and is pruned on the next touch.
pub struct LiveRegistry<T> {
    entries: Mutex<Vec<Weak<AsyncMutex<T>>>>,
}

impl<T> LiveRegistry<T> {
    pub fn new() -> Self {
        LiveRegistry {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handle: &Handle<T>) {
        let weak = Arc::downgrade(handle);
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|w| w.strong_count() > 0);
        entries.push(weak);
    }

    // snapshot of currently-reachable values, for the shutdown drain
    pub fn snapshot(&self) -> Vec<Handle<T>> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|w| w.strong_count() > 0);
        entries.iter().filter_map(|w| w.upgrade()).collect()
    }

    // live count, for GET /stats
    pub fn count(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|w| w.strong_count() > 0);
        entries.len()
    }
}

impl<T> Default for LiveRegistry<T> {
    fn default() -> Self {
        LiveRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_and_prunes_dropped_handles() {
        let registry: LiveRegistry<i32> = LiveRegistry::new();
        let handle = new_handle(42);
        registry.register(&handle);
        assert_eq!(registry.count(), 1);

        let handle2 = new_handle(7);
        registry.register(&handle2);
        assert_eq!(registry.count(), 2);

        drop(handle);
        assert_eq!(registry.count(), 1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn registering_does_not_extend_lifetime() {
        let registry: LiveRegistry<i32> = LiveRegistry::new();
        {
            let handle = new_handle(1);
            registry.register(&handle);
        }
        assert_eq!(registry.count(), 0);
    }
}
