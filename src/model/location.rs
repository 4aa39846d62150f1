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

use serde::{Deserialize, Serialize};

// geolocation for an IP, primary key is `ip`. many proxies may share one by IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub ip: String,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub time_zone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub metro_code: Option<i64>,
}

impl Location {
    pub fn new(ip: String) -> Self {
        Location {
            ip,
            country_code: None,
            country_name: None,
            region_code: None,
            region_name: None,
            city: None,
            zip_code: None,
            time_zone: None,
            latitude: None,
            longitude: None,
            metro_code: None,
        }
    }
}

// wire shape of the geo-IP API response, tolerant of missing optional fields
#[derive(Debug, Clone, Deserialize)]
pub struct GeoApiResponse {
    pub ip: String,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub time_zone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub metro_code: Option<i64>,
}

impl From<GeoApiResponse> for Location {
    fn from(r: GeoApiResponse) -> Self {
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
