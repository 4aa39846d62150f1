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

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;

use crate::error::AppError;
use crate::model::{Proxy, Scheme};

#[derive(Debug, FromRow)]
struct ProxyRow {
    host: String,
    port: Option<i32>,
    login: Option<String>,
    password: Option<String>,
    scheme: String,
    latency_seconds: Option<f64>,
    is_alive: Option<bool>,
    anonymous: Option<bool>,
    in_process: bool,
    date_creation: Option<DateTime<Utc>>,
    date_update: Option<DateTime<Utc>>,
}

impl TryFrom<ProxyRow> for Proxy {
    type Error = AppError;

    fn try_from(row: ProxyRow) -> Result<Self, AppError> {
        Ok(Proxy {
            host: row.host,
            port: row.port.map(|p| p as u16),
            login: row.login,
            password: row.password,
            scheme: Scheme::from_str(&row.scheme)?,
            latency_seconds: row.latency_seconds,
            is_alive: row.is_alive,
            anonymous: row.anonymous,
            in_process: row.in_process,
            date_creation: row.date_creation,
            date_update: row.date_update,
            location: None,
        })
    }
}

// storage gateway for the proxy table. every method takes the caller's (host, port)
// pair as the identity key, mirroring the source's db_work module. cloning is cheap,
// PgPool is itself a handle to a shared connection pool.
#[derive(Clone)]
pub struct ProxyRepo {
    pool: PgPool,
}

impl ProxyRepo {
    pub fn new(pool: PgPool) -> Self {
        ProxyRepo { pool }
    }

    // new submissions never carry a date_creation from the caller, the database clock
    // is authoritative
    pub async fn insert(&self, proxy: &Proxy) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO proxy (host, port, login, password, scheme, latency_seconds, is_alive, \
             anonymous, in_process, date_creation, date_update) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), NULL) \
             ON CONFLICT (host, port) DO NOTHING",
        )
        .bind(&proxy.host)
        .bind(proxy.port.map(|p| p as i32))
        .bind(&proxy.login)
        .bind(&proxy.password)
        .bind(proxy.scheme.to_string())
        .bind(proxy.latency_seconds)
        .bind(proxy.is_alive)
        .bind(proxy.anonymous)
        .bind(proxy.in_process)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // a recheck result: clears in_process and stamps date_update, matching the
    // rescheduler's contract that claimed rows are released here, not by the rescheduler
    pub async fn update(&self, proxy: &Proxy) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE proxy SET login = $3, password = $4, scheme = $5, latency_seconds = $6, \
             is_alive = $7, anonymous = $8, in_process = false, date_update = now() \
             WHERE host = $1 AND port = $2",
        )
        .bind(&proxy.host)
        .bind(proxy.port.map(|p| p as i32))
        .bind(&proxy.login)
        .bind(&proxy.password)
        .bind(proxy.scheme.to_string())
        .bind(proxy.latency_seconds)
        .bind(proxy.is_alive)
        .bind(proxy.anonymous)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, host: &str, port: Option<u16>) -> Result<(), AppError> {
        sqlx::query("DELETE FROM proxy WHERE host = $1 AND port = $2")
            .bind(host)
            .bind(port.map(|p| p as i32))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn select(&self, host: &str, port: Option<u16>) -> Result<Option<Proxy>, AppError> {
        let row = sqlx::query_as::<_, ProxyRow>("SELECT * FROM proxy WHERE host = $1 AND port = $2")
            .bind(host)
            .bind(port.map(|p| p as i32))
            .fetch_optional(&self.pool)
            .await?;
        row.map(Proxy::try_from).transpose()
    }

    // atomically claims one row due for (re)checking: never already in_process, and
    // either never checked or last checked more than `delta_minutes` ago. the select
    // and the in_process flip happen in one transaction so two rescheduler ticks can
    // never claim the same row.
    pub async fn claim_due(&self, delta_minutes: i64) -> Result<Option<Proxy>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProxyRow>(
            "SELECT * FROM proxy \
             WHERE in_process = false \
               AND (date_update IS NULL OR date_update < now() - make_interval(mins => $1)) \
             ORDER BY date_update NULLS FIRST \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(delta_minutes as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        sqlx::query("UPDATE proxy SET in_process = true WHERE host = $1 AND port = $2")
            .bind(&row.host)
            .bind(row.port)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut proxy = Proxy::try_from(row)?;
        proxy.in_process = true;
        Ok(Some(proxy))
    }

    // candidates for the relay's upstream pick: alive, optionally restricted to one
    // scheme, fastest first
    pub async fn list_alive(&self, scheme: Option<Scheme>, limit: i64) -> Result<Vec<Proxy>, AppError> {
        let rows = match scheme {
            Some(scheme) => {
                sqlx::query_as::<_, ProxyRow>(
                    "SELECT * FROM proxy WHERE is_alive = true AND scheme = $1 \
                     ORDER BY latency_seconds ASC NULLS LAST LIMIT $2",
                )
                .bind(scheme.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ProxyRow>(
                    "SELECT * FROM proxy WHERE is_alive = true \
                     ORDER BY latency_seconds ASC NULLS LAST LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Proxy::try_from).collect()
    }
}

// live-Postgres tests: `cargo test --features integration` against a database matching
// migrations/0001_init.sql. Plain `cargo test` never touches the network, matching how
// the rest of the suite runs without any service dependencies.
#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::model::Scheme;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        PgPool::connect(&url).await.expect("failed to connect to test database")
    }

    fn sample_proxy(host: &str) -> Proxy {
        Proxy::new(host.to_string(), Some(8080), Scheme::Http)
    }

    #[tokio::test]
    #[ignore]
    async fn insert_then_select_round_trips_as_dict() {
        let pool = test_pool().await;
        let repo = ProxyRepo::new(pool);
        let proxy = sample_proxy("203.0.113.10");
        repo.delete(&proxy.host, proxy.port).await.unwrap();

        repo.insert(&proxy).await.unwrap();
        let fetched = repo.select(&proxy.host, proxy.port).await.unwrap().expect("row was inserted");

        assert_eq!(fetched.host, proxy.host);
        assert_eq!(fetched.port, proxy.port);
        assert_eq!(fetched.scheme, proxy.scheme);
        assert!(!fetched.in_process);

        repo.delete(&proxy.host, proxy.port).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn claim_due_never_hands_the_same_row_to_two_claimants() {
        let pool = test_pool().await;
        let repo = ProxyRepo::new(pool);
        let proxy = sample_proxy("203.0.113.11");
        repo.delete(&proxy.host, proxy.port).await.unwrap();
        repo.insert(&proxy).await.unwrap();

        let repo_a = repo.clone();
        let repo_b = repo.clone();
        let (a, b) = tokio::join!(repo_a.claim_due(0), repo_b.claim_due(0));
        let claims = [a.unwrap(), b.unwrap()].into_iter().flatten().count();

        assert_eq!(claims, 1, "exactly one concurrent claimant should win the row");

        repo.delete(&proxy.host, proxy.port).await.unwrap();
    }
}
