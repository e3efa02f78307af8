//! Percentage convention and return-curve normalization
//!
//! Percentage-shaped fields with magnitude <= 1 are ratios; larger magnitudes
//! are already percentage points. Curves are plotted as an index around 100,
//! so a ratio `r` becomes `100 + 100r`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::payloads::ReturnCurve;
use crate::series::{Series, SeriesPoint};

/// Normalize a percentage-shaped field to percentage points
pub fn percent_points(value: f64) -> f64 {
    if value.abs() <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

/// Chart index value for a return: 100 plus the return in percentage points
pub fn curve_index(return_pct: f64) -> f64 {
    100.0 + percent_points(return_pct)
}

/// Parse a snapshot date into epoch milliseconds (UTC).
pub fn parse_snapshot_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Convert one participant's curve into a chart series.
pub fn curve_to_series(curve: &ReturnCurve) -> Series {
    let points = curve
        .curve
        .iter()
        .filter_map(|point| match parse_snapshot_ms(&point.snapshot_date) {
            Some(ts) => Some(SeriesPoint::new(ts, curve_index(point.return_pct))),
            None => {
                debug!(
                    user = %curve.user_name,
                    snapshot_date = %point.snapshot_date,
                    "skipping unparseable curve point"
                );
                None
            }
        })
        .collect();
    Series::new(curve.user_name.clone(), points)
}
