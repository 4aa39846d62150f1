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

use sqlx::postgres::PgPool;
use sqlx::FromRow;

use crate::error::AppError;
use crate::model::Location;

#[derive(Debug, FromRow)]
struct LocationRow {
    ip: String,
    country_code: Option<String>,
    country_name: Option<String>,
    region_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    zip_code: Option<String>,
    time_zone: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    metro_code: Option<i64>,
}

impl From<LocationRow> for Location {
    fn from(r: LocationRow) -> Self {
        Location {
            ip: r.ip,
            country_code: r.country_code,
            country_name: r.country_name,
            region_code: r.region_code,
            region_name: r.region_name,
            city: r.city,
            zip_code: r.zip_code,
            time_zone: r.time_zone,
            latitude: r.latitude,
            longitude: r.longitude,
            metro_code: r.metro_code,
        }
    }
}

pub struct LocationRepo {
    pool: PgPool,
}

impl LocationRepo {
    pub fn new(pool: PgPool) -> Self {
        LocationRepo { pool }
    }

    // an IP already on file keeps its existing row, matching LocationDb.insert_location's
    // on_conflict_do_nothing
    pub async fn insert(&self, location: &Location) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO location (ip, country_code, country_name, region_code, region_name, \
             city, zip_code, time_zone, latitude, longitude, metro_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (ip) DO NOTHING",
        )
        .bind(&location.ip)
        .bind(&location.country_code)
        .bind(&location.country_name)
        .bind(&location.region_code)
        .bind(&location.region_name)
        .bind(&location.city)
        .bind(&location.zip_code)
        .bind(&location.time_zone)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.metro_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn select(&self, ip: &str) -> Result<Option<Location>, AppError> {
        let row = sqlx::query_as::<_, LocationRow>("SELECT * FROM location WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Location::from))
    }

    pub async fn exists(&self, ip: &str) -> Result<bool, AppError> {
        Ok(self.select(ip).await?.is_some())
    }

    pub async fn delete(&self, ip: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM location WHERE ip = $1").bind(ip).execute(&self.pool).await?;
        Ok(())
    }
}

// live-Postgres tests: `cargo test --features integration` against a database matching
// migrations/0001_init.sql.
#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        PgPool::connect(&url).await.expect("failed to connect to test database")
    }

    #[tokio::test]
    #[ignore]
    async fn insert_keeps_the_first_row_on_conflict() {
        let pool = test_pool().await;
        let repo = LocationRepo::new(pool);
        let ip = "203.0.113.20".to_string();
        repo.delete(&ip).await.unwrap();

        let mut first = Location::new(ip.clone());
        first.country_code = Some("US".to_string());
        repo.insert(&first).await.unwrap();

        let mut second = Location::new(ip.clone());
        second.country_code = Some("DE".to_string());
        repo.insert(&second).await.unwrap();

        let stored = repo.select(&ip).await.unwrap().expect("row was inserted");
        assert_eq!(stored.country_code, Some("US".to_string()), "second insert must not overwrite the first");

        repo.delete(&ip).await.unwrap();
    }
}
