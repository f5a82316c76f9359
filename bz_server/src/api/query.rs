//! Query-string parsing shared by the list endpoints.
//!
//! Parameters arrive as raw strings so that malformed filter values become a
//! `400 validation_error` rather than a generic extractor rejection, while
//! `page`/`limit` keep their lenient fall-back-to-default behavior.

use chrono::{DateTime, NaiveDate, Utc};
use std::{collections::HashMap, fmt::Display, str::FromStr};

use super::error::{ApiError, ApiResult};

/// Parse an optional parameter; absent or blank means "no filter"
pub fn optional_param<T>(params: &HashMap<String, String>, key: &str) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ApiError::validation(format!("invalid {key} '{raw}': {e}"))),
    }
}

/// `start_date`/`end_date` as calendar days, rejecting an inverted range
pub fn parse_dates(
    params: &HashMap<String, String>,
) -> ApiResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    let from: Option<NaiveDate> = optional_param(params, "start_date")?;
    let to: Option<NaiveDate> = optional_param(params, "end_date")?;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ApiError::validation(
                "start_date must not be after end_date",
            ));
        }
    }
    Ok((from, to))
}

/// Day range as instants: inclusive lower bound, exclusive upper bound
pub fn parse_day_range(
    params: &HashMap<String, String>,
) -> ApiResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let (from, to) = parse_dates(params)?;
    let start_of = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    Ok((
        from.and_then(start_of),
        to.and_then(|d| d.succ_opt()).and_then(start_of),
    ))
}
