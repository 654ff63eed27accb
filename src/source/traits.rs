//! SourceAdapter trait: the contract every knowledge source implements
//!
//! An adapter translates a query fragment into its provider's wire protocol
//! (GraphQL, REST, bulk files) and returns a fragment. The aggregator never
//! sees the protocol.

use super::types::{Fragment, SourceError, SourceKind, SubQuery};
use async_trait::async_trait;
use std::time::Duration;

/// A uniform-interface client to one external knowledge source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source (used in provenance and diagnostics)
    fn id(&self) -> &str;

    /// What class of provider this is
    fn kind(&self) -> SourceKind;

    /// Whether this source should be asked about the sub-query at all.
    fn applies_to(&self, _query: &SubQuery) -> bool {
        true
    }

    /// Fetch a fragment for the sub-query.
    ///
    /// `timeout` is the budget the aggregator will enforce; adapters may pass
    /// it on to their transport. An empty fragment means "nothing known".
    async fn fetch(&self, query: &SubQuery, timeout: Duration) -> Result<Fragment, SourceError>;
}
