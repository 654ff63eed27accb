//! Knowledge sources
//!
//! Every external provider is reached through a `SourceAdapter`. The
//! registry holds the fixed set configured at startup; the response cache
//! sits between the aggregator and the adapters.

mod cache;
mod fixture;
mod registry;
mod traits;
mod types;

pub use cache::{CacheStats, ResponseCache};
pub use fixture::{FixtureEntry, FixtureError, FixtureFile, FixtureSource, SourceFixture};
pub use registry::SourceRegistry;
pub use traits::SourceAdapter;
pub use types::{
    normalize_query_text, FailureReason, Fragment, QueryPurpose, SourceError, SourceKind,
    SourceOutcome, SubQuery,
};
