use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rasp_gate::check::{CheckKind, CheckParameter, Checker, ParamValue};
use rasp_gate::config::Config;
use rasp_gate::gate::{Engine, ThreadGate};
use rasp_gate::request::{RequestHandle, StreamId};

struct FakeRequest(u64);

impl RequestHandle for FakeRequest {
    fn id(&self) -> u64 {
        self.0
    }

    fn method(&self) -> Option<String> {
        Some("POST".to_string())
    }

    fn path(&self) -> Option<String> {
        Some("/login".to_string())
    }
}

/// Recording checker: counts invocations, remembers what it saw, and
/// blocks the kinds it is told to block.
#[derive(Default)]
struct Probe {
    calls: AtomicUsize,
    block: Mutex<Vec<CheckKind>>,
    kinds: Mutex<Vec<CheckKind>>,
    body_lens: Mutex<Vec<usize>>,
    upload_content_len: Mutex<Option<usize>>,
}

impl Probe {
    fn blocking(kinds: &[CheckKind]) -> Arc<Self> {
        let probe = Arc::new(Self::default());
        probe.block.lock().unwrap().extend_from_slice(kinds);
        probe
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Checker for Probe {
    fn check(&self, parameter: &CheckParameter<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds.lock().unwrap().push(parameter.kind());
        if let Some(request) = parameter.request() {
            self.body_lens.lock().unwrap().push(request.body().len());
        }
        if let Some(ParamValue::Str(content)) = parameter.param("content") {
            *self.upload_content_len.lock().unwrap() = Some(content.len());
        }
        self.block.lock().unwrap().contains(&parameter.kind())
    }
}

fn engine_with(probe: &Arc<Probe>) -> Arc<Engine> {
    let engine = Engine::new(Box::new(Arc::clone(probe)), Config::default_config());
    engine.set_enabled(true);
    engine
}

fn entered_gate(engine: &Arc<Engine>) -> ThreadGate {
    let gate = engine.thread_gate();
    gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();
    gate
}

// ── Scenario A: block decision raises, gate restored ──

#[test]
fn blocked_read_raises_and_gate_survives() {
    let probe = Probe::blocking(&[CheckKind::ReadFile]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    let err = gate
        .check_read_file(Some(Path::new("/etc/passwd")))
        .unwrap_err();
    assert_eq!(err.kind(), CheckKind::ReadFile);
    assert!(err.description().contains("/etc/passwd"));

    // Guard restored: the same thread is still observed.
    let before = probe.calls();
    gate.check_sql("mysql", "select 1").unwrap();
    assert_eq!(probe.calls(), before + 1);
}

// ── Scenario B: allow, then an independent second check ──

#[test]
fn allowed_checks_are_independent() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);
    let baseline = probe.calls();

    gate.check_read_file(Some(Path::new("/etc/passwd"))).unwrap();
    let argv = vec!["ls".to_string(), "-la".to_string()];
    gate.check_command(&argv).unwrap();

    assert_eq!(probe.calls(), baseline + 2);
    let kinds = probe.kinds.lock().unwrap();
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[CheckKind::ReadFile, CheckKind::Command]
    );
}

// ── Scenario C: upload content truncation ──

#[test]
fn upload_content_truncated_to_4096() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    let content = vec![b'a'; 5000];
    gate.check_file_upload(Some("a.txt"), Some(&content)).unwrap();
    assert_eq!(*probe.upload_content_len.lock().unwrap(), Some(4096));
}

// ── Scenario D: nothing fires after request exit ──

#[test]
fn post_exit_checks_are_noops() {
    let probe = Probe::blocking(&[CheckKind::Sql]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    gate.request_exit();
    let before = probe.calls();
    gate.check_sql("mysql", "drop table users").unwrap();
    assert_eq!(probe.calls(), before);
    gate.with_request(|request| assert!(request.is_none()));
}

// ── Master switch ──

#[test]
fn master_switch_toggles_mid_request() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);
    let baseline = probe.calls();

    engine.set_enabled(false);
    gate.check_sql("mysql", "select 1").unwrap();
    assert_eq!(probe.calls(), baseline);

    engine.set_enabled(true);
    gate.check_sql("mysql", "select 1").unwrap();
    assert_eq!(probe.calls(), baseline + 1);
}

// ── Body correlation ──

#[test]
fn body_reads_accumulate_on_bound_stream() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    let bound = StreamId(10);
    let foreign = StreamId(11);
    gate.on_body_read(5, bound, b"hello");
    gate.on_body_read(9, foreign, b"ignore me");
    gate.on_body_read_at(3, bound, b"..abc", 2);
    gate.on_body_read(-1, bound, b"");

    gate.with_request(|request| {
        let request = request.unwrap();
        assert_eq!(request.body(), b"helloabc");
        assert_eq!(request.stream(), Some(bound));
    });

    // The checker sees the accumulated body on the next check.
    gate.check_sql("mysql", "select 1").unwrap();
    assert_eq!(probe.body_lens.lock().unwrap().last(), Some(&8));
}

#[test]
fn single_byte_reads_append() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    let source = StreamId(3);
    gate.on_body_read_byte(b'h' as i32, source);
    gate.on_body_read_byte(b'i' as i32, source);
    gate.on_body_read_byte(-1, source);
    gate.with_request(|request| assert_eq!(request.unwrap().body(), b"hi"));
}

#[test]
fn stream_binding_resets_at_exit() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    gate.on_body_read(2, StreamId(1), b"ab");
    gate.on_body_read(2, StreamId(2), b"cd");
    gate.with_request(|request| assert_eq!(request.unwrap().body(), b"ab"));

    gate.request_exit();
    gate.request_enter(Some(Box::new(FakeRequest(2)))).unwrap();

    // Fresh context: the previously foreign stream can bind now.
    gate.on_body_read(2, StreamId(2), b"cd");
    gate.with_request(|request| {
        let request = request.unwrap();
        assert_eq!(request.stream(), Some(StreamId(2)));
        assert_eq!(request.body(), b"cd");
    });
}

#[test]
fn body_reads_without_context_are_noops() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);
    let gate = engine.thread_gate();
    gate.on_body_read(4, StreamId(1), b"data");
    gate.with_request(|request| assert!(request.is_none()));
}

// ── Re-entrancy guard ──

thread_local! {
    static NESTED: RefCell<Option<Rc<ThreadGate>>> = const { RefCell::new(None) };
}

/// Checker that plays a policy engine doing its own sensitive work: on
/// every decision call it re-enters the same thread's gate.
struct Reenter {
    calls: AtomicUsize,
}

impl Checker for Reenter {
    fn check(&self, _parameter: &CheckParameter<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        NESTED.with(|slot| {
            if let Some(gate) = slot.borrow().as_ref() {
                gate.check_sql("mysql", "select from inside the checker")
                    .unwrap();
                gate.check_read_file(Some(Path::new("/etc/hosts"))).unwrap();
            }
        });
        false
    }
}

#[test]
fn reentrant_checker_is_not_reinvoked() {
    let checker = Arc::new(Reenter {
        calls: AtomicUsize::new(0),
    });
    let engine = Engine::new(Box::new(Arc::clone(&checker)), Config::default_config());
    engine.set_enabled(true);
    let gate = Rc::new(engine.thread_gate());
    NESTED.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&gate)));

    gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();
    assert_eq!(checker.calls.load(Ordering::SeqCst), 1);

    gate.check_command(&["ls".to_string()]).unwrap();
    assert_eq!(checker.calls.load(Ordering::SeqCst), 2);

    NESTED.with(|slot| *slot.borrow_mut() = None);
}

// ── Guard restoration across a panicking checker ──

struct PanicOnSql {
    calls: AtomicUsize,
}

impl Checker for PanicOnSql {
    fn check(&self, parameter: &CheckParameter<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if parameter.kind() == CheckKind::Sql {
            panic!("checker blew up");
        }
        false
    }
}

#[test]
fn panicking_checker_does_not_disable_gate() {
    let checker = Arc::new(PanicOnSql {
        calls: AtomicUsize::new(0),
    });
    let engine = Engine::new(Box::new(Arc::clone(&checker)), Config::default_config());
    engine.set_enabled(true);
    let gate = engine.thread_gate();
    gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _ = gate.check_sql("mysql", "select 1");
    }));
    assert!(result.is_err());

    // The drop guard re-enabled hooking during unwind.
    let before = checker.calls.load(Ordering::SeqCst);
    gate.check_read_file(Some(Path::new("/etc/hosts"))).unwrap();
    assert_eq!(checker.calls.load(Ordering::SeqCst), before + 1);
}

// ── Write-stream token pairing ──

#[test]
fn stream_open_write_pair() {
    let probe = Probe::blocking(&[CheckKind::WriteFile]);
    let engine = engine_with(&probe);
    let gate = entered_gate(&engine);

    let mut token = rasp_gate::hooks::WriteStreamToken::new();
    gate.on_write_stream_open(&mut token, "/tmp/out.txt");
    assert_eq!(token.path(), Some("/tmp/out.txt"));

    // Open itself checked nothing; the write does.
    let before = probe.calls();
    let err = gate.check_stream_write(&token, b"payload").unwrap_err();
    assert_eq!(err.kind(), CheckKind::WriteFile);
    assert_eq!(probe.calls(), before + 1);

    // Empty writes and pathless tokens are skipped.
    gate.check_stream_write(&token, b"").unwrap();
    let blank = rasp_gate::hooks::WriteStreamToken::new();
    gate.check_stream_write(&blank, b"payload").unwrap();
    assert_eq!(probe.calls(), before + 1);
}

// ── Request attributes reach the checker ──

struct HeaderSniffer {
    saw_post_login: AtomicUsize,
}

impl Checker for HeaderSniffer {
    fn check(&self, parameter: &CheckParameter<'_>) -> bool {
        if let Some(request) = parameter.request() {
            let handle = request.handle();
            if handle.method().as_deref() == Some("POST")
                && handle.path().as_deref() == Some("/login")
            {
                self.saw_post_login.fetch_add(1, Ordering::SeqCst);
            }
        }
        false
    }
}

#[test]
fn request_check_exposes_lazy_attributes() {
    let checker = Arc::new(HeaderSniffer {
        saw_post_login: AtomicUsize::new(0),
    });
    let engine = Engine::new(Box::new(Arc::clone(&checker)), Config::default_config());
    engine.set_enabled(true);
    let gate = engine.thread_gate();
    gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();
    assert_eq!(checker.saw_post_login.load(Ordering::SeqCst), 1);
}

// ── Thread confinement ──

#[test]
fn gates_are_independent_across_threads() {
    let probe = Probe::blocking(&[]);
    let engine = engine_with(&probe);

    let entered = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            let gate = engine.thread_gate();
            gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();
            gate.check_sql("mysql", "select 1").unwrap();
        })
    };
    let idle = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            // This thread never entered a request: nothing dispatches.
            let gate = engine.thread_gate();
            gate.check_sql("mysql", "select 2").unwrap();
        })
    };
    entered.join().unwrap();
    idle.join().unwrap();

    // Request check + one sql check from the entered thread only.
    assert_eq!(probe.calls(), 2);
}

// ── Convenience constructor ──

#[test]
fn default_engine_starts_disabled() {
    let probe = Arc::new(Probe::default());
    let engine = rasp_gate::engine(Box::new(Arc::clone(&probe)));
    let gate = engine.thread_gate();
    gate.request_enter(Some(Box::new(FakeRequest(1)))).unwrap();
    assert_eq!(probe.calls(), 0);
}
