//! Facade wiring the object store, dependency tracker and their shared
//! completion queue together, and owning the one cross-subsystem contract
//! spec.md §5 calls out: `put()` must invoke `deps.complete(key)` only after
//! the store's own mutex has been released.

use crate::deps::Deps;
use crate::host::{HostRuntime, NoopHostRuntime, StructuredHandle};
use crate::queue::{Entry, Queue};
use crate::store::{Artifact, Store};
use std::sync::Arc;

/// The whole in-process object service: store, deps tracker and the queue
/// they share (also reused as the HTTP `/work` queue, per spec.md §9 Open
/// Question 3).
pub struct Engine {
    store: Store,
    deps: Deps,
    queue: Arc<Queue>,
}

impl Engine {
    pub fn new(host: Arc<dyn HostRuntime>) -> Engine {
        let queue = Arc::new(Queue::new());
        Engine {
            store: Store::new(host),
            deps: Deps::new(Arc::clone(&queue)),
            queue,
        }
    }

    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    /// Stores a raw artifact and wakes any waiters depending on `key`. The
    /// store's own `insert` releases its mutex before returning, so calling
    /// `deps.complete` here is already outside that lock — the one ordering
    /// rule spec.md §5 requires.
    pub fn put_raw(&self, key: &str, data: Vec<u8>) {
        self.store.put_raw(key, data);
        self.deps.complete(Some(key));
    }

    pub fn put_structured(&self, key: &str, handle: StructuredHandle, len: usize) {
        self.store.put_structured(key, handle, len);
        self.deps.complete(Some(key));
    }

    pub fn get(&self, key: &str, remove: bool) -> Option<Arc<Artifact>> {
        self.store.get(key, remove)
    }

    pub fn has(&self, key: &str) -> bool {
        self.store.get(key, false).is_some()
    }

    pub fn add_dep(&self, name: &str, keys: &[String], msg: i32) -> i32 {
        self.deps.add_dep(&self.store, name, keys, msg)
    }

    /// Pushes a raw entry directly onto the shared queue, the path the HTTP
    /// `/work` endpoint uses (spec.md §6.2).
    pub fn push_work(&self, data: Vec<u8>) {
        self.queue.push(Entry::new(data), false);
    }

    pub fn gc(&self) {
        self.store.gc();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(Arc::new(NoopHostRuntime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::decode_resolved_event;

    #[test]
    fn put_raw_wakes_a_waiting_dependency() {
        let engine = Engine::default();
        engine.add_dep("job", &["a".to_string()], 9);
        assert!(engine.queue().pop().is_none());

        engine.put_raw("a", b"1".to_vec());

        let event = engine.queue().pop().expect("dependency should resolve");
        assert_eq!(decode_resolved_event(&event.data), Some((9, "job".to_string())));
    }

    #[test]
    fn get_and_has_reflect_store_state() {
        let engine = Engine::default();
        assert!(!engine.has("k"));
        engine.put_raw("k", b"v".to_vec());
        assert!(engine.has("k"));
        assert_eq!(engine.get("k", false).unwrap().raw.as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn push_work_lands_on_the_shared_queue() {
        let engine = Engine::default();
        engine.push_work(b"payload".to_vec());
        assert_eq!(engine.queue().pop().unwrap().data, b"payload");
    }
}
