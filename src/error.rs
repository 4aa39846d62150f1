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

use thiserror::Error;

// error taxonomy, one variant per class in the error handling design
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid proxy url: {0}")]
    Parse(String),

    #[error("transient network error: {0}")]
    Transient(String),

    #[error("policy check failed: status {0}")]
    PolicyFail(u16),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl AppError {
    // connection-class errors are retryable per the probe's retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
