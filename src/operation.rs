//! Node operation classification
//!
//! The API server only tells us CREATE, UPDATE or DELETE. Cordon and uncordon are
//! both updates, distinguished by how `spec.unschedulable` changed.

use std::fmt;

/// Admission verb for a Node request
///
/// `CONNECT` never reaches this type: it is rejected while decoding the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Node object is being created
    Create,
    /// Node object is being updated
    Update,
    /// Node object is being deleted
    Delete,
}

/// Logical Node operation derived from the verb and the schedulability change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Node registration
    Create,
    /// Node removal
    Delete,
    /// Node marked unschedulable
    Cordon,
    /// Node marked schedulable again
    Uncordon,
    /// Any other update; always allowed
    NoOp,
}

impl Operation {
    /// Classify an admission request
    ///
    /// `was_unschedulable` and `is_unschedulable` are only consulted for updates.
    pub fn classify(verb: Verb, was_unschedulable: bool, is_unschedulable: bool) -> Self {
        match verb {
            Verb::Create => Self::Create,
            Verb::Delete => Self::Delete,
            Verb::Update => match (was_unschedulable, is_unschedulable) {
                (false, true) => Self::Cordon,
                (true, false) => Self::Uncordon,
                _ => Self::NoOp,
            },
        }
    }

    /// Lowercase name used in messages and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Cordon => "cordon",
            Self::Uncordon => "uncordon",
            Self::NoOp => "update",
        }
    }

    /// PascalCase name used as the Kubernetes Event action
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Delete => "Delete",
            Self::Cordon => "Cordon",
            Self::Uncordon => "Uncordon",
            Self::NoOp => "Update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
