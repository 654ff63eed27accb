//! Hypotheses and their adversarial validation

mod hypothesis;
mod validator;

pub use hypothesis::{EvidenceRef, Hypothesis, SupportingSubgraph, ValidationReport, Verdict};
pub use validator::{AdversarialValidator, ValidationError, ValidationOutcome, ValidatorConfig};
