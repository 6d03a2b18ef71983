//! 4.A Event Queue — a thread-safe FIFO of opaque byte entries with blocking
//! and timed pops and optional fd notification. Grounded on
//! `original_source/src/evqueue.c`'s `ev_queue_t`/`ev_entry_t` pair, recast
//! per spec.md §9's design note as a `VecDeque` behind a `Mutex` + `Condvar`
//! instead of a hand-rolled intrusive doubly-linked list, and on
//! `lib/neutronium/src/net/buffer.rs`'s `Buffer` for the egress-outside-the-lock
//! shape (the notify-fd write happens after the mutex is released, same as
//! `ev_push`'s fd write in the original).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::io::RawFd;

/// A single FIFO entry. The C original's `ev_entry_t` distinguishes inline,
/// borrowed and owned-with-destructor storage regimes; in safe Rust a `Vec<u8>`
/// collapses all three into one owned-buffer regime, per spec.md §9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(data: Vec<u8>) -> Entry {
        Entry { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of registering a notification fd, mirroring `ev_queue_notify_fd`'s
/// three-way return in `original_source/src/evqueue.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    Ok,
    AlreadySetDifferently,
    Invalid,
}

struct Inner {
    items: VecDeque<Entry>,
    #[cfg(unix)]
    notify_fd: Option<RawFd>,
}

/// A thread-safe FIFO. One mutex guards all list mutation and the condition
/// wait (spec.md §5's lock-order item 3, the innermost/leaf lock).
pub struct Queue {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Queue {
    pub fn new() -> Queue {
        Queue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                #[cfg(unix)]
                notify_fd: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Registers a notification fd. Only one fd may be registered per queue;
    /// re-registering the same fd is idempotent.
    #[cfg(unix)]
    pub fn set_notify_fd(&self, fd: RawFd) -> NotifyResult {
        if fd < 0 {
            return NotifyResult::Invalid;
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.notify_fd {
            None => {
                inner.notify_fd = Some(fd);
                NotifyResult::Ok
            }
            Some(existing) if existing == fd => NotifyResult::Ok,
            Some(_) => NotifyResult::AlreadySetDifferently,
        }
    }

    /// Pushes `entry` onto the queue, taking ownership of it. `front` selects
    /// priority insertion (head) over the default FIFO tail insertion.
    /// The notify-fd write happens *after* the mutex is released, so a slow
    /// reader on that fd never blocks a pusher (spec.md §4.A).
    pub fn push(&self, entry: Entry, front: bool) {
        #[cfg(unix)]
        let fd = {
            let mut inner = self.inner.lock().unwrap();
            if front {
                inner.items.push_front(entry);
            } else {
                inner.items.push_back(entry);
            }
            let fd = inner.notify_fd;
            drop(inner);
            self.cond.notify_one();
            fd
        };
        #[cfg(not(unix))]
        {
            let mut inner = self.inner.lock().unwrap();
            if front {
                inner.items.push_front(entry);
            } else {
                inner.items.push_back(entry);
            }
            drop(inner);
            self.cond.notify_one();
        }

        #[cfg(unix)]
        if let Some(fd) = fd {
            notify_one_byte(fd);
        }
    }

    /// Non-blocking pop: returns `None` immediately if the queue is empty.
    pub fn pop(&self) -> Option<Entry> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.pop_front()
    }

    /// Blocks up to `timeout` waiting for an entry to become available.
    /// Returns `None` on timeout, matching `ev_pop_wait`'s wall-clock deadline
    /// semantics in spec.md §4.A.
    pub fn pop_wait(&self, timeout: Duration) -> Option<Entry> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(entry) = inner.items.pop_front() {
                return Some(entry);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self.cond.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if result.timed_out() && inner.items.is_empty() {
                return None;
            }
        }
    }

    /// Blocks indefinitely until an entry is available.
    pub fn pop_wait_forever(&self) -> Entry {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(entry) = inner.items.pop_front() {
                return entry;
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}

#[cfg(unix)]
fn notify_one_byte(fd: RawFd) {
    // Best-effort: the write errors (e.g. the reader closed its end) are
    // ignored, per spec.md §4.A.
    let byte: [u8; 1] = [1];
    unsafe {
        libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_at_tail() {
        let queue = Queue::new();
        queue.push(Entry::new(b"e1".to_vec()), false);
        queue.push(Entry::new(b"e2".to_vec()), false);
        assert_eq!(queue.pop().unwrap().data, b"e1");
        assert_eq!(queue.pop().unwrap().data, b"e2");
    }

    #[test]
    fn priority_at_front() {
        let queue = Queue::new();
        queue.push(Entry::new(b"e1".to_vec()), false);
        queue.push(Entry::new(b"e2".to_vec()), true);
        assert_eq!(queue.pop().unwrap().data, b"e2");
    }

    #[test]
    fn pop_wait_times_out() {
        let queue = Queue::new();
        let start = Instant::now();
        let result = queue.pop_wait(Duration::from_millis(100));
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn pop_wait_wakes_on_push() {
        let queue = Arc::new(Queue::new());
        let waiter = Arc::clone(&queue);
        let handle = thread::spawn(move || waiter.pop_wait(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        queue.push(Entry::new(b"wake".to_vec()), false);

        let result = handle.join().unwrap();
        assert_eq!(result.unwrap().data, b"wake");
    }

    #[test]
    fn pop_is_non_blocking_on_empty() {
        let queue = Queue::new();
        assert!(queue.pop().is_none());
    }
}
