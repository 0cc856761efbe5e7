//! Gating state and the check dispatcher.
//!
//! [`Engine`] is the process-wide half: the master kill-switch, the boxed
//! [`Checker`], and configuration. [`ThreadGate`] is the per-thread half:
//! the instrumentation layer holds exactly one per worker thread and
//! routes every hook event through it. All mutable per-thread state lives
//! inside the gate, so no locking is needed by construction; the only
//! cross-thread datum is the master switch, a relaxed atomic.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::check::{CheckKind, CheckParameter, Checker, Params, SecurityError};
use crate::config::Config;
use crate::hooks::{self, HookEvent, WriteStreamToken};
use crate::logging;
use crate::request::{RequestContext, RequestHandle, StreamId};

/// Process-wide interception state, shared by every thread gate.
pub struct Engine {
    enabled: AtomicBool,
    checker: Box<dyn Checker>,
    config: Config,
}

impl Engine {
    /// Interception starts disabled; external control flips the master
    /// switch once instrumentation is in place.
    pub fn new(checker: Box<dyn Checker>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(false),
            checker,
            config,
        })
    }

    /// Master kill-switch. Single external writer, read by every
    /// dispatch; eventual visibility is all that is required.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn checker(&self) -> &dyn Checker {
        self.checker.as_ref()
    }

    /// Create the per-thread gate. One per worker thread; the gate is
    /// `!Sync` and must never be shared across threads.
    pub fn thread_gate(self: &Arc<Self>) -> ThreadGate {
        ThreadGate {
            engine: Arc::clone(self),
            hook_enabled: Cell::new(false),
            shield_depth: Cell::new(0),
            request: RefCell::new(None),
        }
    }
}

/// Restores the gate flag when dropped, so the re-entrancy guard is
/// released on every exit path, including checker panic.
struct Reenable<'a>(&'a Cell<bool>);

impl Drop for Reenable<'_> {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

/// Per-thread gating state plus every hook entry point.
///
/// Hooking is disabled by default; only threads that have entered an
/// observed request dispatch checks. Entry points take `&self` because
/// they fire at arbitrary instrumented call sites; interior mutability
/// keeps the state thread-confined without locks.
pub struct ThreadGate {
    engine: Arc<Engine>,
    hook_enabled: Cell<bool>,
    shield_depth: Cell<u32>,
    request: RefCell<Option<RequestContext>>,
}

impl ThreadGate {
    fn interception_active(&self) -> bool {
        self.engine.enabled() && self.hook_enabled.get() && self.shield_depth.get() == 0
    }

    /// The funnel every hook kind goes through.
    ///
    /// Gates on the master switch and the thread flag, flips the thread
    /// flag off for the duration of the decision call (re-entrancy
    /// guard), and converts a block decision into [`SecurityError`].
    fn do_check(&self, kind: CheckKind, params: Params) -> Result<(), SecurityError> {
        if !self.interception_active() {
            return Ok(());
        }
        if self.engine.config().checks.is_disabled(kind) {
            return Ok(());
        }

        self.hook_enabled.set(false);
        let _reenable = Reenable(&self.hook_enabled);

        let request = self.request.borrow();
        let parameter = CheckParameter::new(kind, params, request.as_ref());
        if self.engine.checker().check(&parameter) {
            let err = SecurityError::from_parameter(&parameter);
            warn!("{err}");
            if self.engine.config().settings.log_blocked {
                logging::log_blocked(&err);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Normalize a raw hook event and dispatch it. Events the skip
    /// policy drops are silent no-ops.
    pub fn dispatch(&self, event: HookEvent<'_>) -> Result<(), SecurityError> {
        match hooks::normalize(&event, &self.engine.config().settings) {
            Some((kind, params)) => self.do_check(kind, params),
            None => Ok(()),
        }
    }

    // ── Shield regions ──

    /// Bracket internal framework code that must never be observed.
    /// Depth-counted, so nested shielded regions pair correctly.
    pub fn enter_shield(&self) {
        self.shield_depth.set(self.shield_depth.get() + 1);
    }

    pub fn exit_shield(&self) {
        self.shield_depth.set(self.shield_depth.get().saturating_sub(1));
    }

    // ── Request lifecycle ──

    /// Servlet-level request entry: enables hooking for this thread,
    /// binds a fresh request context, and issues the one zero-parameter
    /// `request` check of the request. `None` (the container gave us no
    /// request object) is a no-op.
    pub fn request_enter(
        &self,
        request: Option<Box<dyn RequestHandle>>,
    ) -> Result<(), SecurityError> {
        let Some(handle) = request else {
            return Ok(());
        };
        self.hook_enabled.set(true);
        self.set_request(Some(RequestContext::new(
            handle,
            self.engine.config().settings.body_max_bytes,
        )));
        self.do_check(CheckKind::Request, Params::new())
    }

    /// Filter-level variant: identical to [`request_enter`] except it
    /// yields to an entry that already ran on this thread.
    ///
    /// [`request_enter`]: ThreadGate::request_enter
    pub fn filter_enter(
        &self,
        request: Option<Box<dyn RequestHandle>>,
    ) -> Result<(), SecurityError> {
        if self.hook_enabled.get() {
            return Ok(());
        }
        self.request_enter(request)
    }

    /// Request exit: disables hooking and clears the request context.
    /// No hook may fire for this request afterwards; anything arriving
    /// later on this thread belongs to the next request.
    pub fn request_exit(&self) {
        self.hook_enabled.set(false);
        self.set_request(None);
    }

    /// Transport-level entry: installs the request context without
    /// touching the hook flag, so body reads that happen before the
    /// servlet-level entry are still correlated.
    pub fn transport_enter(&self, request: Option<Box<dyn RequestHandle>>) {
        if let Some(handle) = request {
            self.set_request(Some(RequestContext::new(
                handle,
                self.engine.config().settings.body_max_bytes,
            )));
        }
    }

    /// Transport-level exit: clears the request context only.
    pub fn transport_exit(&self) {
        self.set_request(None);
    }

    // The request slot is borrowed while a check is in flight; lifecycle
    // events in that window can only come from inside the checker, which
    // the guard already declares unobserved, so they are dropped.
    fn set_request(&self, value: Option<RequestContext>) {
        if let Ok(mut slot) = self.request.try_borrow_mut() {
            *slot = value;
        }
    }

    /// Read-only view of the in-flight request, if any.
    pub fn with_request<T>(&self, f: impl FnOnce(Option<&RequestContext>) -> T) -> T {
        f(self.request.borrow().as_ref())
    }

    // ── Incremental body reads ──
    //
    // Passive accumulation: none of these dispatch a check. A read that
    // returned -1 (end of stream) is a no-op, as is any read while no
    // request context is bound. The first source seen is bound to the
    // context; reads from any other source are ignored until exit.

    /// Single-byte read returning the byte value (or -1 at EOF).
    pub fn on_body_read_byte(&self, ret: i32, source: StreamId) {
        if ret < 0 {
            return;
        }
        self.with_bound_stream(source, |request| request.append_body(&[ret as u8]));
    }

    /// Buffer read that filled `buf[..ret]`.
    pub fn on_body_read(&self, ret: i32, source: StreamId, buf: &[u8]) {
        if ret < 0 {
            return;
        }
        let n = (ret as usize).min(buf.len());
        self.with_bound_stream(source, |request| request.append_body(&buf[..n]));
    }

    /// Buffer read that filled `buf[offset..offset + ret]`.
    pub fn on_body_read_at(&self, ret: i32, source: StreamId, buf: &[u8], offset: usize) {
        if ret < 0 {
            return;
        }
        let end = offset.saturating_add(ret as usize).min(buf.len());
        let start = offset.min(end);
        self.with_bound_stream(source, |request| request.append_body(&buf[start..end]));
    }

    fn with_bound_stream(&self, source: StreamId, f: impl FnOnce(&mut RequestContext)) {
        // Body events during an active check are dropped (slot is borrowed).
        let Ok(mut slot) = self.request.try_borrow_mut() else {
            return;
        };
        let Some(request) = slot.as_mut() else {
            return;
        };
        if request.bind_or_match(source) {
            f(request);
        }
    }

    // ── Operation hooks ──

    /// Multipart file upload.
    pub fn check_file_upload(
        &self,
        name: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::FileUpload { name, content })
    }

    /// Directory listing.
    pub fn check_list_files(&self, path: Option<&Path>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::ListFiles { path })
    }

    /// File opened for reading.
    pub fn check_read_file(&self, path: Option<&Path>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::ReadFile { path })
    }

    /// File opened for writing (no content yet).
    pub fn check_write_file(&self, path: Option<&Path>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::WriteFile { path })
    }

    /// Output-stream constructor: stash the target path on the stream's
    /// token for the paired write hook. No check here; the open call
    /// carries no content. Only stashes while interception is active.
    pub fn on_write_stream_open(&self, token: &mut WriteStreamToken, path: &str) {
        if self.interception_active() {
            token.set_path(path);
        }
    }

    /// Write through an instrumented output stream.
    pub fn check_stream_write(
        &self,
        token: &WriteStreamToken,
        bytes: &[u8],
    ) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::StreamWrite {
            path: token.path(),
            bytes,
        })
    }

    /// Process execution.
    pub fn check_command(&self, argv: &[String]) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::Command { argv })
    }

    /// Process execution from an unsplit command line.
    pub fn check_command_line(&self, line: &str) -> Result<(), SecurityError> {
        match shlex::split(line) {
            Some(argv) => self.check_command(&argv),
            None => {
                debug!("unparseable command line skipped: {line}");
                Ok(())
            }
        }
    }

    /// SQL statement execution.
    pub fn check_sql(&self, server: &str, statement: &str) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::Sql { server, statement })
    }

    /// External entity resolution during XML parsing.
    pub fn check_xxe(&self, entity: Option<&str>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::Xxe { entity })
    }

    /// Expression-language evaluation.
    pub fn check_ognl(&self, expression: Option<&str>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::Ognl { expression })
    }

    /// Deserialization of a class by resolved name.
    pub fn check_deserialization(&self, class_name: Option<&str>) -> Result<(), SecurityError> {
        self.dispatch(HookEvent::Deserialization { class_name })
    }

    /// Diagnostic hook for trialling new hook points: logs and nothing
    /// else, never dispatched to the checker.
    pub fn check_common(&self, class_name: &str, method: &str, descriptor: &str, args: &[&str]) {
        debug!("common hook {class_name}:{method}:{descriptor} {args:?}");
    }
}
