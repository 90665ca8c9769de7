pub mod audit;
pub mod entries;
pub mod error;
pub mod handlers;
pub mod machines;
pub mod maintenance;
pub mod middleware;
pub mod orders;
pub mod reports;
pub mod routes;
pub mod tickets;

use std::str::FromStr;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;

/// Maximum allowed limit for list queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for list queries
const DEFAULT_LIMIT: i64 = 100;

/// Clamp pagination parameters to sane values.
fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset.unwrap_or(0).max(0),
    )
}

/// Parse an optional query parameter through its `FromStr` impl.
fn parse_param<T>(value: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    value
        .map(|raw| raw.parse::<T>().map_err(ApiError::bad_parameter))
        .transpose()
}
