//! Reason annotation policy
//!
//! A reason is accepted when it matches an allowed reason (ignoring case), fully
//! matches the configured pattern, or accompanies a delete. Evaluation never
//! fails: a pattern that does not compile simply matches nothing.

use regex::Regex;
use tracing::warn;

use crate::operation::Operation;
use crate::policy::PolicyConfig;

/// Which rule accepted a reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Case-insensitive match against `allowedReasons`
    AllowedList,
    /// Full match against `reasonRegexPattern`
    Pattern,
    /// Any non-empty reason is enough for a delete
    FreeText,
}

impl Acceptance {
    /// Label value for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowedList => "allowed_list",
            Self::Pattern => "pattern",
            Self::FreeText => "free_text",
        }
    }
}

/// Evaluate a present reason annotation for the given operation
///
/// Returns the rule that accepted it, or `None` when the reason is rejected.
pub fn evaluate(reason: &str, operation: Operation, policy: &PolicyConfig) -> Option<Acceptance> {
    if is_allowed_reason(&policy.allowed_reasons, reason) {
        Some(Acceptance::AllowedList)
    } else if matches_pattern(&policy.reason_pattern, reason) {
        Some(Acceptance::Pattern)
    } else if is_free_text_allowed(operation, reason) {
        Some(Acceptance::FreeText)
    } else {
        None
    }
}

/// Case-insensitive exact match against the allowed reasons
pub fn is_allowed_reason(allowed_reasons: &[String], reason: &str) -> bool {
    let reason = reason.to_lowercase();
    allowed_reasons
        .iter()
        .any(|allowed| allowed.to_lowercase() == reason)
}

/// Case-sensitive full match against the reason pattern
///
/// The pattern is anchored here, so `Maintenance-\d+` does not accept
/// `Maintenance-12 because I felt like it`.
pub fn matches_pattern(pattern: &str, reason: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => re.is_match(reason),
        Err(e) => {
            warn!(
                pattern,
                error = %e,
                "Invalid reason pattern, treating as non-matching"
            );
            false
        }
    }
}

/// Deletes accept any non-empty free-text reason
pub fn is_free_text_allowed(operation: Operation, reason: &str) -> bool {
    operation == Operation::Delete && !reason.is_empty()
}
