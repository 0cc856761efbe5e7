pub mod error;
pub mod params;

pub use error::SecurityError;
pub use params::{CheckKind, CheckParameter, ParamValue, Params};

use std::sync::Arc;

/// The decision interface.
///
/// Implementations are the policy engine: given one normalized
/// [`CheckParameter`], return `true` to block the intercepted operation.
/// Called synchronously from every observing thread, so implementations
/// must be cheap to call and safe under concurrency. The dispatcher's
/// re-entrancy guard already covers any sensitive operations the checker
/// performs itself.
pub trait Checker: Send + Sync {
    /// `true` means block; the dispatcher converts it into a
    /// [`SecurityError`].
    fn check(&self, parameter: &CheckParameter<'_>) -> bool;
}

impl<C: Checker + ?Sized> Checker for Arc<C> {
    fn check(&self, parameter: &CheckParameter<'_>) -> bool {
        (**self).check(parameter)
    }
}

/// Checker that never blocks. Useful as a placeholder while wiring up
/// instrumentation, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Checker for AllowAll {
    fn check(&self, _parameter: &CheckParameter<'_>) -> bool {
        false
    }
}
