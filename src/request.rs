//! In-flight request correlation.
//!
//! Low-level hook events arrive scattered: a transport-level entry, any
//! number of incremental body reads, a servlet-level entry, an exit. The
//! [`RequestContext`] ties them together into one value the checker can
//! inspect. Concrete front ends (servlet container, raw transport adapter)
//! sit behind the [`RequestHandle`] trait.

use std::fmt;

/// Adapter capability for an opaque host request object.
///
/// The core never dereferences the underlying request; it only needs a
/// stable identity and lazily-computed descriptive attributes for the
/// checker to read. Attribute methods default to `None` so minimal
/// adapters stay one method long.
pub trait RequestHandle: Send {
    /// Stable identity of the underlying request, used for equality only.
    fn id(&self) -> u64;

    fn method(&self) -> Option<String> {
        None
    }

    fn path(&self) -> Option<String> {
        None
    }

    fn header(&self, _name: &str) -> Option<String> {
        None
    }

    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// Opaque identity of an input-stream source, derived by the
/// instrumentation layer (typically from object identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

/// One in-flight inbound request.
///
/// At most one exists per [`ThreadGate`](crate::gate::ThreadGate) at a time.
/// Body bytes accumulate passively across read events; only reads from the
/// first-bound stream source mutate the buffer.
pub struct RequestContext {
    handle: Box<dyn RequestHandle>,
    stream: Option<StreamId>,
    body: Vec<u8>,
    body_max: usize,
}

impl RequestContext {
    pub fn new(handle: Box<dyn RequestHandle>, body_max: usize) -> Self {
        Self {
            handle,
            stream: None,
            body: Vec::new(),
            body_max,
        }
    }

    /// The adapted host request.
    pub fn handle(&self) -> &dyn RequestHandle {
        self.handle.as_ref()
    }

    /// The bound input-stream source, if any read event has arrived.
    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    /// Body bytes consumed so far (capped at `body_max`).
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Bind the first-seen source, then report whether `source` is the
    /// bound one. First read wins; every other source is ignored until
    /// the context is cleared at request exit.
    pub(crate) fn bind_or_match(&mut self, source: StreamId) -> bool {
        *self.stream.get_or_insert(source) == source
    }

    pub(crate) fn append_body(&mut self, bytes: &[u8]) {
        let room = self.body_max.saturating_sub(self.body.len());
        let take = bytes.len().min(room);
        self.body.extend_from_slice(&bytes[..take]);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.handle.id())
            .field("stream", &self.stream)
            .field("body_len", &self.body.len())
            .finish()
    }
}
