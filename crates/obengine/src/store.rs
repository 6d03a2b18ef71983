//! 4.B Object Store — a thread-safe key→artifact mapping with deferred
//! reclamation. Grounded on `original_source/src/obj.c`/`mem_store.c`'s
//! linked-list-plus-reclamation-pool design, recast as a `HashMap` (spec.md
//! §9 explicitly allows a hashed index) behind a single mutex.

use crate::host::{HostRuntime, NoopHostRuntime, StructuredHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A named holder of either a raw byte buffer or a host-owned structured
/// value. Immutable once inserted; replacement is always a new insert
/// (spec.md §3).
pub struct Artifact {
    pub key: String,
    pub len: usize,
    pub raw: Option<Vec<u8>>,
    pub structured: Option<StructuredHandle>,
}

impl Artifact {
    fn raw(key: String, data: Vec<u8>) -> Artifact {
        Artifact {
            key,
            len: data.len(),
            raw: Some(data),
            structured: None,
        }
    }

    fn structured(key: String, handle: StructuredHandle, len: usize) -> Artifact {
        Artifact {
            key,
            len,
            raw: None,
            structured: Some(handle),
        }
    }
}

struct Inner {
    entries: HashMap<String, Arc<Artifact>>,
    /// Entries moved out of `entries` by a `remove=true` get, or displaced by
    /// a `put` that replaced an existing key. Drained only by `gc()`, which
    /// must run on the host thread (spec.md §4.B's rationale for deferred
    /// reclamation: the store mutex is held by network threads with no safe
    /// access to host-runtime hooks).
    pool: Vec<Arc<Artifact>>,
}

/// The object store. Lowest in the lock-order hierarchy described in
/// spec.md §5 — its mutex must never be held while acquiring the deps mutex.
pub struct Store {
    inner: Mutex<Inner>,
    host: Arc<dyn HostRuntime>,
}

impl Store {
    pub fn new(host: Arc<dyn HostRuntime>) -> Store {
        Store {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                pool: Vec::new(),
            }),
            host,
        }
    }

    /// Stores a raw byte artifact under `key`, copying the key and the
    /// buffer. Any previously present entry for `key` is displaced into the
    /// reclamation pool rather than dropped in place, in case it held a
    /// structured handle whose release must happen on the host thread.
    pub fn put_raw(&self, key: &str, data: Vec<u8>) {
        let artifact = Arc::new(Artifact::raw(key.to_string(), data));
        self.insert(key, artifact);
    }

    /// Stores a structured artifact, calling the host runtime's `preserve`
    /// hook on the handle before it's published, per spec.md §4.B.
    pub fn put_structured(&self, key: &str, handle: StructuredHandle, len: usize) {
        self.host.preserve(&handle);
        let artifact = Arc::new(Artifact::structured(key.to_string(), handle, len));
        self.insert(key, artifact);
    }

    fn insert(&self, key: &str, artifact: Arc<Artifact>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.entries.insert(key.to_string(), artifact) {
            inner.pool.push(old);
        }
    }

    /// Looks up `key`. If `remove` is true the entry is unlinked from the
    /// live map and pushed onto the reclamation pool, but the returned
    /// `Arc` remains a valid, independently owned reference — Rust's
    /// reference counting makes the "valid until the next gc()" caveat in
    /// spec.md §3 a non-issue for the caller, while gc() still performs the
    /// host-hook release on the store's own copy exactly once.
    pub fn get(&self, key: &str, remove: bool) -> Option<Arc<Artifact>> {
        let mut inner = self.inner.lock().unwrap();
        if remove {
            let removed = inner.entries.remove(key)?;
            inner.pool.push(Arc::clone(&removed));
            Some(removed)
        } else {
            inner.entries.get(key).cloned()
        }
    }

    /// Drains the reclamation pool, invoking the host runtime's `release`
    /// hook on every structured handle found. Must be called only from a
    /// context where host-runtime hooks are legal (the "host thread").
    pub fn gc(&self) {
        let drained: Vec<Arc<Artifact>> = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.pool)
        };
        for artifact in drained {
            if let Some(handle) = &artifact.structured {
                self.host.release(handle);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new(Arc::new(NoopHostRuntime))
    }
}
