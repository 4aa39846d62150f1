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

pub mod location_repo;
pub mod pool;
pub mod proxy_repo;

use crate::error::AppError;
use crate::model::Proxy;
use crate::registry::Handle;
use location_repo::LocationRepo;
use proxy_repo::ProxyRepo;

// the only writer of proxy/location records. everything downstream of the checker and
// locator funnels through here, which decides insert-vs-update from the record's
// in_process flag rather than the caller having to track it.
pub struct PersistenceGateway {
    pub proxies: ProxyRepo,
    pub locations: LocationRepo,
}

impl PersistenceGateway {
    pub fn new(proxies: ProxyRepo, locations: LocationRepo) -> Self {
        PersistenceGateway { proxies, locations }
    }

    // in_process=true means this record was claimed by the rescheduler and is coming
    // back around after a recheck; anything else is a first-time submission
    pub async fn save(&self, handle: &Handle<Proxy>) -> Result<(), AppError> {
        let proxy = handle.lock().await.clone();

        if proxy.in_process {
            self.proxies.update(&proxy).await?;
        } else {
            self.proxies.insert(&proxy).await?;
        }

        if let Some(location) = &proxy.location {
            self.locations.insert(location).await?;
        }

        Ok(())
    }
}
