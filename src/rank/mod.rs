//! Query-adaptive ranking
//!
//! `ActivationRanker` scores one graph against one seed set;
//! `RobustQueryEngine` repeats that across paraphrases and penalizes
//! wording-sensitive nodes.

mod activation;
mod robust;

pub use activation::{ActivationRanker, RankedNode, RankerConfig, Ranking};
pub use robust::{
    combine_rankings, relevance_matrix, robust_score, RobustConfig, RobustQueryEngine,
    RobustRanking, VariantRun, MAX_VARIANTS,
};
