//! Concurrent fan-out of sub-queries to the registered sources

mod aggregator;

pub use aggregator::{Aggregation, ConcurrentAggregator, FetchBudget, SourceReport};
