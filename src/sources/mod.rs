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

pub mod static_list;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::AppError;
use crate::model::Proxy;

// anything that can feed parsed proxies onto the ingress queue. source-specific
// scraping logic is deliberately out of scope, the contract is just "emit well-formed
// Proxy values".
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    async fn parse(&self, out: &UnboundedSender<Proxy>) -> Result<(), AppError>;
}

// runs every configured source as its own detached task. one source failing or
// finishing does not affect the others.
pub fn spawn_all(sources: Vec<Box<dyn Source>>, out: UnboundedSender<Proxy>) {
    for source in sources {
        let out = out.clone();
        tokio::spawn(async move {
            let name = source.name().to_string();
            match source.parse(&out).await {
                Ok(()) => tracing::info!(source = %name, "source finished"),
                Err(err) => tracing::warn!(source = %name, error = %err, "source failed"),
            }
        });
    }
}
