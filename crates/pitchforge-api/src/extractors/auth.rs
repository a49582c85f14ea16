//! Shared-secret extractors for machine callers.
//!
//! The trigger is called by the interval scheduler with
//! `x-scheduler-secret`; administrative endpoints take `x-admin-key`. The two
//! credentials are configured separately and never accepted for each other.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use pitchforge_core::error::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the scheduler secret.
pub const SCHEDULER_SECRET_HEADER: &str = "x-scheduler-secret";

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Proof that the caller presented the scheduler secret.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerAuth;

/// Proof that the caller presented the admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for SchedulerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify(parts, SCHEDULER_SECRET_HEADER, &state.config.auth.scheduler_secret)?;
        Ok(SchedulerAuth)
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify(parts, ADMIN_KEY_HEADER, &state.config.auth.admin_key)?;
        Ok(AdminAuth)
    }
}

fn verify(parts: &Parts, header: &str, expected: &str) -> Result<(), AppError> {
    if expected.is_empty() {
        tracing::warn!(header, "Rejected request: credential not configured");
        return Err(AppError::unauthorized("Endpoint is disabled"));
    }

    let presented = parts
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized(format!("Missing {header} header")))?;

    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        tracing::warn!(header, "Rejected request: invalid credential");
        return Err(AppError::unauthorized("Invalid credential"));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
