//! Multi-series timeline alignment for the return chart

pub mod merge;

pub use merge::{merge, MergedBucket, MergedTimeline, Series, SeriesPoint, DEFAULT_CAP};
