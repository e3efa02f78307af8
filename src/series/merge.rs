//! Time-series merger
//!
//! Aligns independently sampled series onto one bucketed timeline:
//!
//! 1. Each sample is floored to its bucket; within a bucket the later sample
//!    (input order) wins.
//! 2. Buckets are the sorted union across all series.
//! 3. Walking buckets in order, a series without a sample repeats its last
//!    value (carry-forward), or stays absent until its first sample.
//! 4. Only the most recent `cap` buckets are kept.
//!
//! Series sharing a name are treated as one series.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{AgentboardError, Result};

/// Buckets kept by the return chart
pub const DEFAULT_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// One aligned timestamp; `values[i]` belongs to `MergedTimeline::names[i]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedBucket {
    pub timestamp_ms: i64,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergedTimeline {
    pub names: Vec<String>,
    pub buckets: Vec<MergedBucket>,
}

impl MergedTimeline {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.buckets.iter().map(|b| b.timestamp_ms).collect()
    }

    /// Values of one series across all buckets; `None` for unknown names.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(self.buckets.iter().map(|b| b.values[idx]).collect())
    }

    /// Chart rows: `{"timestamp": ms, "<series>": value, ...}`, absent values omitted.
    pub fn to_records(&self) -> Vec<Value> {
        self.buckets
            .iter()
            .map(|bucket| {
                let mut row = Map::new();
                row.insert("timestamp".to_string(), Value::from(bucket.timestamp_ms));
                for (name, value) in self.names.iter().zip(&bucket.values) {
                    if let Some(v) = value {
                        row.insert(name.clone(), Value::from(*v));
                    }
                }
                Value::Object(row)
            })
            .collect()
    }
}

/// Merge `series` into one forward-filled timeline of `bucket_ms` buckets,
/// keeping at most `cap` of the most recent buckets.
pub fn merge(series: &[Series], bucket_ms: i64, cap: Option<usize>) -> Result<MergedTimeline> {
    if bucket_ms <= 0 {
        return Err(AgentboardError::Validation(format!(
            "bucket size must be positive, got {bucket_ms}"
        )));
    }

    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut observed: Vec<BTreeMap<i64, f64>> = Vec::new();
    let mut union: BTreeSet<i64> = BTreeSet::new();

    for s in series {
        let idx = *index.entry(s.name.as_str()).or_insert_with(|| {
            names.push(s.name.clone());
            observed.push(BTreeMap::new());
            names.len() - 1
        });
        for point in &s.points {
            let bucket = floor_to_bucket(point.timestamp_ms, bucket_ms).ok_or_else(|| {
                AgentboardError::Validation(format!(
                    "timestamp {} of series '{}' has no {bucket_ms}ms bucket in range",
                    point.timestamp_ms, s.name
                ))
            })?;
            observed[idx].insert(bucket, point.value);
            union.insert(bucket);
        }
    }

    let mut last_seen: Vec<Option<f64>> = vec![None; names.len()];
    let mut buckets: Vec<MergedBucket> = Vec::with_capacity(union.len());
    for timestamp_ms in union {
        for (idx, samples) in observed.iter().enumerate() {
            if let Some(value) = samples.get(&timestamp_ms) {
                last_seen[idx] = Some(*value);
            }
        }
        buckets.push(MergedBucket {
            timestamp_ms,
            values: last_seen.clone(),
        });
    }

    if let Some(cap) = cap {
        if buckets.len() > cap {
            buckets.drain(..buckets.len() - cap);
        }
    }

    Ok(MergedTimeline { names, buckets })
}

/// Nearest lower multiple of `bucket_ms` (also for negative timestamps);
/// `None` when that multiple is not representable.
fn floor_to_bucket(timestamp_ms: i64, bucket_ms: i64) -> Option<i64> {
    timestamp_ms.div_euclid(bucket_ms).checked_mul(bucket_ms)
}
