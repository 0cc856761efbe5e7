use thiserror::Error;

use super::params::{CheckKind, CheckParameter};

/// A policy veto: the one intentional control-flow-altering failure in
/// this crate. Raised by the dispatcher on a block decision and expected
/// to propagate up through the intercepted call, aborting it.
#[derive(Debug, Clone, Error)]
#[error("operation blocked: {description}")]
pub struct SecurityError {
    kind: CheckKind,
    description: String,
}

impl SecurityError {
    pub(crate) fn from_parameter(parameter: &CheckParameter<'_>) -> Self {
        Self {
            kind: parameter.kind(),
            description: parameter.describe(),
        }
    }

    /// The check tag that vetoed the operation.
    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    /// Kind tag plus parameter bag, for the instrumentation layer to log.
    pub fn description(&self) -> &str {
        &self.description
    }
}
