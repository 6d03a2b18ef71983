//! 4.C Dependency Tracker — waiters that publish a resolved-event onto a
//! shared completion queue once every key they name is present. Grounded on
//! `original_source/src/deps.c`'s `depent_t` list and `deps_add`/`deps_complete`
//! pair; the pointer-rich single allocation the C version packs a waiter into
//! is replaced, per spec.md §9's design note, by a plain struct holding
//! `keys: Vec<String>` and `status: Vec<bool>`.

use crate::queue::{Entry, Queue};
use crate::store::Store;
use byteorder::{LittleEndian, WriteBytesExt};
use std::sync::{Arc, Mutex};

struct Waiter {
    name: String,
    msg: i32,
    keys: Vec<String>,
    status: Vec<bool>,
}

impl Waiter {
    fn is_satisfied(&self) -> bool {
        self.status.iter().all(|&s| s)
    }
}

/// The dependency tracker. Its mutex sits between the store's (lowest) and
/// the queue's (leaf) in the lock-order hierarchy of spec.md §5: `complete`
/// must never acquire the store mutex, and callers (the engine facade) must
/// call `complete` only after releasing the store mutex. This is the one
/// cross-subsystem contract spec.md §4.C calls out as load-bearing.
pub struct Deps {
    waiters: Mutex<Vec<Waiter>>,
    queue: Arc<Queue>,
}

impl Deps {
    /// `queue` is the shared completion queue resolved-events are published
    /// to; spec.md §9 Open Question 3 notes the HTTP `/work` endpoint reuses
    /// this same queue as its work queue — callers construct `Deps` with
    /// the queue they intend to share for both purposes.
    pub fn new(queue: Arc<Queue>) -> Deps {
        Deps {
            waiters: Mutex::new(Vec::new()),
            queue,
        }
    }

    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    /// Registers a new waiter. `probe` is consulted once per key *before*
    /// the waiter is linked under the deps mutex, to seed the
    /// already-satisfied state — the caller (the engine facade) supplies a
    /// `Store::get` closure so the probe never happens while holding any
    /// deps-internal lock, only the store's own (released by the time this
    /// returns, per spec.md §4.C). After linking, `complete(None)` is called
    /// to close the race window documented in spec.md §4.C: if a required
    /// key was written to the store between the probe and the link, this
    /// sweep catches it.
    pub fn add_dep(
        &self,
        store: &Store,
        name: &str,
        keys: &[String],
        msg: i32,
    ) -> i32 {
        let status: Vec<bool> = keys.iter().map(|k| store.get(k, false).is_some()).collect();

        let waiter = Waiter {
            name: name.to_string(),
            msg,
            keys: keys.to_vec(),
            status,
        };

        {
            let mut waiters = self.waiters.lock().unwrap();
            waiters.push(waiter);
        }

        self.complete(None);
        0
    }

    /// Re-evaluates waiters against `key`. If `key` is `Some`, every
    /// unsatisfied slot matching it is marked satisfied; if `None`, no slot
    /// is newly marked but satisfaction counts are recomputed from existing
    /// `status` (the sweep path used by `add_dep` and any caller wanting to
    /// force a recheck). A waiter that becomes fully satisfied is unlinked
    /// and a resolved-event is pushed to the tail of the completion queue.
    ///
    /// Must never acquire the store mutex — this is the half of the
    /// cross-subsystem contract this module owns.
    pub fn complete(&self, key: Option<&str>) {
        let mut waiters = self.waiters.lock().unwrap();
        let mut resolved = Vec::new();

        waiters.retain_mut(|waiter| {
            if let Some(key) = key {
                for (slot_key, satisfied) in waiter.keys.iter().zip(waiter.status.iter_mut()) {
                    if !*satisfied && slot_key == key {
                        *satisfied = true;
                    }
                }
            }

            if waiter.is_satisfied() {
                resolved.push(resolved_event(waiter.msg, &waiter.name));
                false
            } else {
                true
            }
        });

        drop(waiters);

        for entry in resolved {
            self.queue.push(entry, false);
        }
    }
}

/// Builds the completion event payload: a 4-byte little-endian `msg`
/// followed by the NUL-terminated waiter name, per spec.md §3/§6.3.
fn resolved_event(msg: i32, name: &str) -> Entry {
    let mut data = Vec::with_capacity(4 + name.len() + 1);
    data.write_i32::<LittleEndian>(msg).unwrap();
    data.extend_from_slice(name.as_bytes());
    data.push(0);
    Entry::new(data)
}

/// Decodes a completion event payload back into `(msg, name)`, the
/// consumer-side counterpart of `resolved_event`, used by `/work`-adjacent
/// consumers and by tests.
pub fn decode_resolved_event(data: &[u8]) -> Option<(i32, String)> {
    if data.len() < 5 {
        return None;
    }
    let msg = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let name_bytes = &data[4..];
    let nul = name_bytes.iter().position(|&b| b == 0)?;
    let name = String::from_utf8(name_bytes[..nul].to_vec()).ok()?;
    Some((msg, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoopHostRuntime;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn fresh() -> (Store, Deps) {
        let store = Store::new(Arc::new(NoopHostRuntime));
        let queue = Arc::new(Queue::new());
        let deps = Deps::new(queue);
        (store, deps)
    }

    #[test]
    fn already_present_fires_immediately() {
        let (store, deps) = fresh();
        store.put_raw("x", b"1".to_vec());

        deps.add_dep(&store, "job2", &["x".to_string()], 2);

        let event = deps.queue().pop().expect("event should be queued");
        assert_eq!(decode_resolved_event(&event.data), Some((2, "job2".to_string())));
    }

    #[test]
    fn eventually_present_fires_once_all_keys_land() {
        let (store, deps) = fresh();

        deps.add_dep(&store, "job1", &["a".to_string(), "b".to_string()], 7);
        assert!(deps.queue().pop().is_none());

        store.put_raw("a", b"1".to_vec());
        deps.complete(Some("a"));
        assert!(deps.queue().pop().is_none());

        store.put_raw("b", b"1".to_vec());
        deps.complete(Some("b"));

        let event = deps.queue().pop().expect("event should be queued");
        assert_eq!(decode_resolved_event(&event.data), Some((7, "job1".to_string())));
        assert!(deps.queue().pop().is_none());
    }

    #[test]
    fn no_double_fire() {
        let (store, deps) = fresh();
        store.put_raw("a", b"1".to_vec());
        deps.add_dep(&store, "job", &["a".to_string()], 1);
        assert!(deps.queue().pop().is_some());

        deps.complete(Some("a"));
        assert!(deps.queue().pop().is_none());
    }

    #[test]
    fn race_closure_concurrent_put_and_add_dep() {
        let store = Arc::new(Store::new(Arc::new(NoopHostRuntime)));
        let queue = Arc::new(Queue::new());
        let deps = Arc::new(Deps::new(queue));

        let store2 = Arc::clone(&store);
        let deps2 = Arc::clone(&deps);

        let putter = thread::spawn(move || {
            store2.put_raw("a", b"1".to_vec());
            deps2.complete(Some("a"));
        });

        let result = deps.add_dep(&store, "N", &["a".to_string()], 42);
        assert_eq!(result, 0);

        putter.join().unwrap();

        // Either add_dep's own post-link sweep or the putter's complete(Some("a"))
        // catches it; exactly one event must show up, never zero, never more.
        let got = deps.queue().pop_wait(Duration::from_secs(1));
        assert!(got.is_some());
        assert!(deps.queue().pop().is_none());
    }

    #[test]
    fn ordering_matches_satisfaction_order() {
        let (store, deps) = fresh();
        deps.add_dep(&store, "first", &["a".to_string()], 1);
        deps.add_dep(&store, "second", &["b".to_string()], 2);
        deps.add_dep(&store, "third", &["c".to_string()], 3);

        store.put_raw("a", vec![]);
        deps.complete(Some("a"));
        store.put_raw("b", vec![]);
        deps.complete(Some("b"));
        store.put_raw("c", vec![]);
        deps.complete(Some("c"));

        let names: Vec<String> = (0..3)
            .map(|_| decode_resolved_event(&deps.queue().pop().unwrap().data).unwrap().1)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }
}
