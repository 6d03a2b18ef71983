//! Host-runtime integration hooks (spec.md §6.5), consumed but not provided
//! by the core. Real deployments of the original C project embed this inside
//! a language runtime (R) that owns structured values; here the seam is a
//! trait object so the object store and SFS codec don't need to know what's
//! on the other side of it.

use crate::sfs::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A structured artifact's handle as seen by the store. Cloning is cheap
/// (`Arc`) and does not by itself call `preserve` — only the host runtime's
/// hooks, invoked explicitly from the designated host thread, adjust whatever
/// external reference count the real embedding runtime keeps.
#[derive(Clone)]
pub struct StructuredHandle(pub Arc<Value>);

impl StructuredHandle {
    pub fn new(value: Value) -> StructuredHandle {
        StructuredHandle(Arc::new(value))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Hooks the host runtime must provide for structured artifacts. `preserve`
/// and `release` are only ever called from the thread draining
/// `Store::gc()` (spec.md §5); `interrupt_check` is polled from blocking
/// socket reads in the SFS socket source between short receive timeouts.
pub trait HostRuntime: Send + Sync {
    fn preserve(&self, handle: &StructuredHandle);
    fn release(&self, handle: &StructuredHandle);
    fn interrupt_check(&self) -> bool;
}

/// Default hook set for protocols that never register structured artifacts
/// (the line protocol and the raw side of the HTTP protocol only ever store
/// raw bytes).
pub struct NoopHostRuntime;

impl HostRuntime for NoopHostRuntime {
    fn preserve(&self, _handle: &StructuredHandle) {}
    fn release(&self, _handle: &StructuredHandle) {}
    fn interrupt_check(&self) -> bool {
        false
    }
}

/// Counting hook set used by tests to assert the store's deferred
/// reclamation actually round-trips through `preserve`/`release`.
#[derive(Default)]
pub struct TestHostRuntime {
    preserved: AtomicUsize,
    released: AtomicUsize,
}

impl TestHostRuntime {
    pub fn new() -> TestHostRuntime {
        TestHostRuntime::default()
    }

    pub fn preserved_count(&self) -> usize {
        self.preserved.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl HostRuntime for TestHostRuntime {
    fn preserve(&self, _handle: &StructuredHandle) {
        self.preserved.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _handle: &StructuredHandle) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn interrupt_check(&self) -> bool {
        false
    }
}
