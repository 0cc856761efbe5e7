//! rasp-gate: the interception core of a runtime self-protection layer.
//!
//! Sits between an instrumented host application and a pluggable policy
//! checker. The instrumentation layer triggers a hook for each sensitive
//! operation (file I/O, command execution, SQL, deserialization,
//! expression evaluation, request entry/exit, incremental body reads);
//! this crate normalizes the raw call-site data into a
//! [`CheckParameter`](check::CheckParameter), gates it through per-thread
//! and process-wide switches, and submits it to the
//! [`Checker`](check::Checker). A block decision surfaces as
//! [`SecurityError`](check::SecurityError), which the instrumentation
//! propagates to abort the intercepted operation.
//!
//! # Architecture
//!
//! - **[`gate`]** — Gating core: process-wide [`Engine`](gate::Engine),
//!   per-thread [`ThreadGate`](gate::ThreadGate), dispatcher with
//!   re-entrancy guard, shield regions, request lifecycle, body reads.
//! - **[`check`]** — Check kinds, parameter bag, the `Checker` decision
//!   interface, and the blocking `SecurityError`.
//! - **[`hooks`]** — Raw hook events and the single normalization table.
//! - **[`request`]** — Request adapter trait and per-request body
//!   correlation.
//! - **[`config`]** — Embedded defaults + user overlay merge.
//! - **[`logging`]** — Logger init and the blocked-decision file log.

/// Check kinds, parameter bag, decision interface, blocking error.
pub mod check;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Engine, per-thread gate, and the check dispatcher.
pub mod gate;
/// Hook events and the normalization table.
pub mod hooks;
/// File-based logging for block decisions.
pub mod logging;
/// Request adapter capability and body correlation.
pub mod request;

use std::sync::Arc;

use check::Checker;
use gate::Engine;

/// Build an engine from the embedded default configuration.
///
/// This is the main entry point for tests and simple embeddings. Hosts
/// with a user config overlay should call [`config::Config::load`] and
/// [`Engine::new`] directly.
pub fn engine(checker: Box<dyn Checker>) -> Arc<Engine> {
    Engine::new(checker, config::Config::default_config())
}
