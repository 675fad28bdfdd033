//! Two-phase row counting.
//!
//! A catalog estimate short-circuits big tables; otherwise an exact `COUNT`
//! races the configured timeout and the estimate is the fallback.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{DaoConfig, DaoError, Result};

/// A row count and where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "lowercase")]
pub enum RowCount {
    /// Result of `COUNT(*)` (or an engine equivalent) that finished in time
    Exact(u64),
    /// Catalog statistics, or the threshold when no statistics exist
    Approximate(u64),
}

impl RowCount {
    pub fn value(&self) -> u64 {
        match self {
            RowCount::Exact(n) | RowCount::Approximate(n) => *n,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, RowCount::Approximate(_))
    }

    /// Large dataset iff the count is at or above the threshold
    pub fn is_large_dataset(&self, threshold: u64) -> bool {
        self.value() >= threshold
    }
}

/// Run the counting strategy.
///
/// `approximate` should be O(1) (table statistics); `Ok(None)` means the
/// engine has no estimate for this table. `exact` is only polled when the
/// estimate is below the threshold, and it is dropped when the timeout wins.
/// An exact count reporting [`DaoError::Timeout`] is handled like the
/// client-side timeout; any other exact-count error propagates.
pub async fn count_rows_with_fallback<A, E>(
    config: &DaoConfig,
    approximate: A,
    exact: E,
) -> Result<RowCount>
where
    A: Future<Output = Result<Option<u64>>>,
    E: Future<Output = Result<u64>>,
{
    let threshold = config.large_dataset_threshold();
    let estimate = match approximate.await {
        Ok(estimate) => estimate,
        Err(e) => {
            tracing::warn!(error = %e, "approximate row count failed, continuing without estimate");
            None
        }
    };

    if let Some(estimate) = estimate {
        if estimate >= threshold {
            tracing::debug!(estimate, threshold, "estimate above threshold, skipping exact count");
            return Ok(RowCount::Approximate(estimate));
        }
    }

    let fallback = || {
        let count = RowCount::Approximate(estimate.unwrap_or(threshold));
        tracing::debug!(?count, "exact count timed out, using fallback");
        count
    };

    match tokio::time::timeout(config.count_timeout(), exact).await {
        Ok(Ok(rows)) => Ok(RowCount::Exact(rows)),
        Ok(Err(DaoError::Timeout(msg))) => {
            tracing::debug!(reason = %msg, "exact count stopped by the server");
            Ok(fallback())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(fallback()),
    }
}
