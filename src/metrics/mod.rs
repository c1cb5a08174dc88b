//! Bounded metrics history and recency-weighted aggregation.
//!
//! The history is pure storage (FIFO, capacity 100); the aggregator owns all
//! windowing and weighting policy.

pub mod aggregate;
pub mod history;

pub use aggregate::{aggregate_samples, AggregatedWindow, WeightedAggregator};
pub use history::{MetricsHistory, HISTORY_CAPACITY};
