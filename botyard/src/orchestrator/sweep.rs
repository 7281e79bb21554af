//! Result of the shutdown sweep.

use botyard_shared::errors::{BotyardError, BotyardResult};

/// One container the sweep could not stop.
#[derive(Debug)]
pub struct SweepFailure {
    pub record_id: i64,
    pub runtime_container_id: String,
    pub error: BotyardError,
}

/// Per-container outcome of [`Orchestrator::stop_all`](super::Orchestrator::stop_all).
///
/// Every record gets its own attempt; a failure never prevents the remaining
/// containers from being stopped.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Record ids whose container was stopped and persisted as stopped.
    pub stopped: Vec<i64>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse into all-or-nothing form for callers that need it.
    pub fn into_result(self) -> BotyardResult<Vec<i64>> {
        if self.failures.is_empty() {
            return Ok(self.stopped);
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("[{}] {}", f.runtime_container_id, f.error))
            .collect();
        Err(BotyardError::SweepIncomplete(format!(
            "{} of {} containers not stopped: {}",
            self.failures.len(),
            self.failures.len() + self.stopped.len(),
            details.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_complete() {
        let report = SweepReport::default();
        assert!(report.is_complete());
        assert!(report.into_result().unwrap().is_empty());
    }

    #[test]
    fn test_failures_are_aggregated() {
        let report = SweepReport {
            stopped: vec![1, 3],
            failures: vec![SweepFailure {
                record_id: 2,
                runtime_container_id: "c2".to_string(),
                error: BotyardError::Runtime("daemon unreachable".to_string()),
            }],
        };
        assert!(!report.is_complete());
        let err = report.into_result().unwrap_err().to_string();
        assert!(err.contains("1 of 3 containers not stopped"), "{}", err);
        assert!(err.contains("[c2] runtime error: daemon unreachable"), "{}", err);
    }
}
