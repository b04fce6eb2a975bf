//! Domain argument errors shared by the geometry and cost helpers.

use std::fmt;

/// An input outside the domain of a pure helper (negative cost, zero speed,
/// duplicate id). Never recovered locally: the current round is aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidArgument {
    message: String,
}

impl InvalidArgument {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid argument: {}", self.message)
    }
}

impl std::error::Error for InvalidArgument {}
