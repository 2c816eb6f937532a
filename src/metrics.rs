//! Metrics for admission decisions
//!
//! Provides OpenTelemetry metrics for:
//! - Decisions by operation and outcome
//! - Decision latency, including the policy fetch
//! - Policy fetch failures
//! - Audit event emission

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::operation::Operation;

/// Global meter for validator metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("node_operation_validator"));

/// Counter of admission decisions
///
/// Labels:
/// - `operation`: create, delete, cordon, uncordon, update
/// - `decision`: allow, deny, error
pub static DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("node_validator_decisions_total")
        .with_description("Total number of Node admission decisions")
        .with_unit("{decisions}")
        .build()
});

/// Histogram of decision duration, including the policy fetch
///
/// Labels:
/// - `operation`: create, delete, cordon, uncordon, update
pub static DECISION_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("node_validator_decision_duration_seconds")
        .with_description("Duration of Node admission decisions in seconds")
        .with_unit("s")
        .build()
});

/// Counter of failed policy fetches
pub static POLICY_FETCH_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("node_validator_policy_fetch_errors_total")
        .with_description("Total number of failed policy ConfigMap fetches")
        .with_unit("{errors}")
        .build()
});

/// Counter of emitted audit events
///
/// Labels:
/// - `operation`: create, delete, cordon, uncordon
/// - `result`: success, error
pub static EVENTS_EMITTED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("node_validator_events_emitted_total")
        .with_description("Total number of Node operation events emitted")
        .with_unit("{events}")
        .build()
});

/// Labels for decision outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Operation allowed
    Allow,
    /// Operation denied by policy
    Deny,
    /// No verdict could be produced
    Error,
}

impl DecisionOutcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Error => "error",
        }
    }
}

/// Times one decision and records its outcome
pub struct DecisionTimer {
    operation: Operation,
    start: std::time::Instant,
}

impl DecisionTimer {
    /// Start timing a decision
    pub fn start(operation: Operation) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }

    /// Record the outcome and elapsed time
    pub fn complete(self, outcome: DecisionOutcome) {
        let duration = self.start.elapsed().as_secs_f64();
        DECISION_DURATION.record(
            duration,
            &[KeyValue::new("operation", self.operation.as_str())],
        );
        DECISIONS.add(
            1,
            &[
                KeyValue::new("operation", self.operation.as_str()),
                KeyValue::new("decision", outcome.as_str()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DecisionOutcome::Allow.as_str(), "allow");
        assert_eq!(DecisionOutcome::Deny.as_str(), "deny");
        assert_eq!(DecisionOutcome::Error.as_str(), "error");
    }

    #[test]
    fn test_timer_records_without_provider() {
        // Global meter is a no-op until a provider is installed
        let timer = DecisionTimer::start(Operation::Cordon);
        timer.complete(DecisionOutcome::Allow);
        POLICY_FETCH_ERRORS.add(1, &[]);
    }
}
