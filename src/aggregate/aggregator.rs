//! ConcurrentAggregator: fans a sub-query out to every applicable source
//!
//! Each source runs on its own task under its own timeout. One slow,
//! failing or panicking source never delays or breaks the others: every
//! source ends up with exactly one report, and the aggregation completes
//! within (roughly) the per-source timeout regardless of stragglers.

use crate::source::{
    FailureReason, Fragment, ResponseCache, SourceKind, SourceOutcome, SourceRegistry, SubQuery,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Time budget for one aggregation.
#[derive(Debug, Clone, Copy)]
pub struct FetchBudget {
    /// Upper bound on any single source call
    pub per_source_timeout: Duration,
    /// Absolute request deadline; calls never run past it
    pub deadline: Option<Instant>,
}

impl FetchBudget {
    pub fn new(per_source_timeout: Duration) -> Self {
        Self {
            per_source_timeout,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Timeout to give a call started now, or `None` once the deadline has
    /// passed.
    pub fn effective_timeout(&self) -> Option<Duration> {
        match self.deadline {
            None => Some(self.per_source_timeout),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    None
                } else {
                    Some(left.min(self.per_source_timeout))
                }
            }
        }
    }

    pub fn deadline_elapsed(&self) -> bool {
        self.effective_timeout().is_none()
    }
}

/// What one source did for one sub-query.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub kind: SourceKind,
    pub outcome: SourceOutcome,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub from_cache: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Every report for one sub-query, ordered by source id.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub query: SubQuery,
    pub reports: Vec<SourceReport>,
}

impl Aggregation {
    /// Ids of sources that returned a non-empty fragment.
    pub fn sources_ok(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, SourceOutcome::Fragment(_)))
    }

    /// Ids of sources that answered with nothing.
    pub fn sources_empty(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, SourceOutcome::Empty))
    }

    /// Ids of sources that failed.
    pub fn sources_failed(&self) -> Vec<&str> {
        self.ids_where(SourceOutcome::is_failed)
    }

    /// Failed sources with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureReason)> {
        self.reports
            .iter()
            .filter_map(|r| r.outcome.failure().map(|f| (r.source_id.as_str(), f)))
    }

    /// True when at least one source was asked and every one failed.
    pub fn all_failed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(|r| r.outcome.is_failed())
    }

    /// Fragments of successful sources, paired with their source id.
    pub fn fragments(&self) -> impl Iterator<Item = (&str, &Fragment)> {
        self.reports
            .iter()
            .filter_map(|r| r.outcome.fragment().map(|f| (r.source_id.as_str(), f)))
    }

    fn ids_where(&self, pred: impl Fn(&SourceOutcome) -> bool) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.source_id.as_str())
            .collect()
    }
}

/// Issues sub-queries to all applicable sources concurrently.
#[derive(Clone)]
pub struct ConcurrentAggregator {
    registry: Arc<SourceRegistry>,
    cache: Option<Arc<ResponseCache>>,
}

impl ConcurrentAggregator {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }

    /// Query every applicable source and collect one report per source.
    pub async fn aggregate(&self, query: &SubQuery, budget: &FetchBudget) -> Aggregation {
        let sources = self.registry.applicable(query);
        let mut reports = Vec::with_capacity(sources.len());
        let mut pending: Vec<(String, SourceKind, Instant, JoinHandle<SourceOutcome>)> =
            Vec::with_capacity(sources.len());

        for source in sources {
            let source_id = source.id().to_string();
            let kind = source.kind();

            if let Some(outcome) = self.cache.as_ref().and_then(|c| c.get(&source_id, query)) {
                reports.push(SourceReport {
                    source_id,
                    kind,
                    outcome,
                    elapsed: Duration::ZERO,
                    from_cache: true,
                });
                continue;
            }

            let Some(timeout) = budget.effective_timeout() else {
                reports.push(SourceReport {
                    source_id,
                    kind,
                    outcome: SourceOutcome::timeout(Duration::ZERO),
                    elapsed: Duration::ZERO,
                    from_cache: false,
                });
                continue;
            };

            let sub_query = query.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, source.fetch(&sub_query, timeout)).await {
                    Ok(result) => SourceOutcome::from_fetch(result),
                    Err(_) => SourceOutcome::timeout(timeout),
                }
            });
            pending.push((source_id, kind, Instant::now(), handle));
        }

        for (source_id, kind, started, handle) in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => SourceOutcome::Failed(FailureReason::Panicked {
                    message: e.to_string(),
                }),
            };
            if let Some(cache) = &self.cache {
                cache.put(&source_id, query, &outcome);
            }
            reports.push(SourceReport {
                source_id,
                kind,
                outcome,
                elapsed: started.elapsed(),
                from_cache: false,
            });
        }

        reports.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        for report in &reports {
            log_report(query, report);
        }

        Aggregation {
            query: query.clone(),
            reports,
        }
    }
}

fn log_report(query: &SubQuery, report: &SourceReport) {
    let elapsed_ms = report.elapsed.as_millis() as u64;
    match &report.outcome {
        SourceOutcome::Fragment(fragment) => info!(
            source = %report.source_id,
            purpose = ?query.purpose,
            nodes = fragment.nodes.len(),
            edges = fragment.edges.len(),
            elapsed_ms,
            cached = report.from_cache,
            "source returned fragment"
        ),
        SourceOutcome::Empty => debug!(
            source = %report.source_id,
            purpose = ?query.purpose,
            elapsed_ms,
            cached = report.from_cache,
            "source returned nothing"
        ),
        SourceOutcome::Failed(reason) => warn!(
            source = %report.source_id,
            purpose = ?query.purpose,
            elapsed_ms,
            reason = %reason,
            "source failed"
        ),
    }
}
