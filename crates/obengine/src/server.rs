//! 4.E Server Runtime ("therver") — accept thread plus a fixed worker pool
//! dequeuing accepted sockets from a dedicated, sentinel-free task queue
//! (distinct from component A's event queue). Grounded on
//! `lib/neutronium/src/net/mod.rs`'s listener/worker split and on
//! `original_source/src/therver.c`'s `active` flag plus fork-safety design.

use slog::{error, info, o, Logger};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// One pending connection, queued by the accept thread and dequeued by a
/// worker. The worker's scratch state lives in the closure it's spawned
/// with (per-worker reuse falls out naturally from that instead of an
/// explicit scratch pointer).
struct Task {
    socket: TcpStream,
}

struct TaskQueue {
    items: Mutex<Vec<Task>>,
    cond: Condvar,
}

impl TaskQueue {
    fn new() -> TaskQueue {
        TaskQueue {
            items: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        }
    }

    fn push(&self, task: Task) {
        let mut items = self.items.lock().unwrap();
        items.push(task);
        self.cond.notify_one();
    }

    /// Blocks until a task is available or `active` goes false. Returns
    /// `None` only in the shutdown case, per spec.md §4.E's worker loop.
    fn pop_wait(&self, active: &AtomicBool) -> Option<Task> {
        let mut items = self.items.lock().unwrap();
        loop {
            if !items.is_empty() {
                return Some(items.remove(0));
            }
            if !active.load(Ordering::SeqCst) {
                return None;
            }
            items = self.cond.wait(items).unwrap();
        }
    }

    fn wake_all(&self) {
        let _items = self.items.lock().unwrap();
        self.cond.notify_all();
    }
}

/// A running server: an accept thread plus `workers` worker threads, all
/// sharing one `TaskQueue`. Shutdown sets `active=false` and wakes every
/// worker; per spec.md §4.E, a full join is not performed since workers may
/// be blocked on long-lived client connections.
pub struct Server {
    active: Arc<AtomicBool>,
    queue: Arc<TaskQueue>,
    accept_thread: Option<JoinHandle<()>>,
    local_addr: std::net::SocketAddr,
    #[cfg(unix)]
    fork_registration: Option<fork_safety::Registration>,
}

impl Server {
    /// Binds `host:port` (an empty host binds all interfaces) and spawns one
    /// accept thread plus `workers` worker threads, each invoking `handler`
    /// for every accepted connection. `workers` is bounded to 1..1000 per
    /// spec.md §5.
    pub fn start<F>(
        host: &str,
        port: u16,
        workers: usize,
        logger: Logger,
        handler: F,
    ) -> std::io::Result<Server>
    where
        F: Fn(TcpStream) + Send + Sync + 'static,
    {
        let workers = workers.clamp(1, 1000);
        let bind_host = if host.is_empty() { "0.0.0.0" } else { host };
        let listener = TcpListener::bind((bind_host, port))?;
        let local_addr = listener.local_addr()?;
        #[cfg(unix)]
        let listener_fd = listener.as_raw_fd();
        let active = Arc::new(AtomicBool::new(true));
        let queue = Arc::new(TaskQueue::new());
        let handler = Arc::new(handler);

        // Mask every signal on this thread before spawning workers/accept so
        // they inherit a fully-blocked mask and delivery stays on whichever
        // thread owns signal handling (spec.md §4.E), mirroring
        // `therver.c::start_threads`'s `sigfillset`/`sigprocmask` bracket.
        #[cfg(unix)]
        let saved_mask = block_all_signals();

        for id in 0..workers {
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let handler = Arc::clone(&handler);
            let worker_logger = logger.new(o!("worker" => id));
            thread::spawn(move || worker_loop(queue, active, handler, worker_logger));
        }

        let accept_logger = logger.new(o!("role" => "accept"));
        let accept_active = Arc::clone(&active);
        let accept_queue = Arc::clone(&queue);
        let accept_thread = thread::spawn(move || {
            accept_loop(listener, accept_queue, accept_active, accept_logger)
        });

        #[cfg(unix)]
        restore_signal_mask(saved_mask);

        #[cfg(unix)]
        let fork_registration = Some(fork_safety::Registration::new(
            Arc::clone(&active),
            Arc::clone(&queue),
            listener_fd,
        ));

        Ok(Server {
            active,
            queue,
            accept_thread: Some(accept_thread),
            local_addr,
            #[cfg(unix)]
            fork_registration,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Sets `active=false` and wakes every worker so idle ones exit; workers
    /// mid-request finish their current connection before noticing the flag.
    pub fn shutdown(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.queue.wake_all();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.queue.wake_all();
        // Per spec.md §4.E, shutdown doesn't join workers (they may hold
        // long-lived connections); we do join the accept thread since it's
        // blocked only in `accept()`, which a dropped listener unblocks.
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: TcpListener, queue: Arc<TaskQueue>, active: Arc<AtomicBool>, logger: Logger) {
    while active.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((socket, _addr)) => queue.push(Task { socket }),
            Err(err) => {
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                error!(logger, "accept failed"; "error" => %err);
            }
        }
    }
}

fn worker_loop<F>(queue: Arc<TaskQueue>, active: Arc<AtomicBool>, handler: Arc<F>, logger: Logger)
where
    F: Fn(TcpStream) + Send + Sync + 'static,
{
    info!(logger, "worker started");
    loop {
        let task = match queue.pop_wait(&active) {
            Some(task) => task,
            None => break,
        };
        handler(task.socket);
    }
    info!(logger, "worker exiting");
}

/// Blocks every signal on the calling thread, returning the previous mask so
/// it can be restored. Threads spawned while the mask is full inherit it,
/// per spec.md §4.E.
#[cfg(unix)]
fn block_all_signals() -> libc::sigset_t {
    unsafe {
        let mut full: libc::sigset_t = std::mem::zeroed();
        libc::sigfillset(&mut full);
        let mut old: libc::sigset_t = std::mem::zeroed();
        libc::pthread_sigmask(libc::SIG_SETMASK, &full, &mut old);
        old
    }
}

#[cfg(unix)]
fn restore_signal_mask(mask: libc::sigset_t) {
    unsafe {
        libc::pthread_sigmask(libc::SIG_SETMASK, &mask, std::ptr::null_mut());
    }
}

/// Process-wide fork-safety bookkeeping (spec.md §4.E), grounded on
/// `therver.c`'s `forked_child()`: since threads aren't joined before
/// `fork()`, the child can't safely resume any of them, so the best it can
/// do is stop accepting, close every socket it holds, and leave the rest to
/// the caller — exactly the original's documented looseness. Unlike the
/// original's single static instance, this server can run two `Server`s at
/// once (line + HTTP listeners), so a process-wide registry replaces the
/// single pair of globals `therver.c` used.
#[cfg(unix)]
mod fork_safety {
    use super::{Task, TaskQueue};
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, Once, OnceLock};

    struct Entry {
        active: Arc<AtomicBool>,
        queue: Arc<TaskQueue>,
        listener_fd: RawFd,
    }

    fn registry() -> &'static Mutex<Vec<Entry>> {
        static REGISTRY: OnceLock<Mutex<Vec<Entry>>> = OnceLock::new();
        REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
    }

    /// Locks taken in `prepare`, released in `parent`/`child`. Stashed in a
    /// global because `pthread_atfork` callbacks take no arguments, so state
    /// can only cross from one call to the next through a static.
    struct HeldLocks {
        registry: MutexGuard<'static, Vec<Entry>>,
        queues: Vec<MutexGuard<'static, Vec<Task>>>,
    }

    static HELD: Mutex<Option<HeldLocks>> = Mutex::new(None);

    /// Owned by a `Server`; deregisters on drop so a shut-down server's
    /// (possibly already-closed) listener fd is never visited by a later
    /// fork.
    pub struct Registration {
        listener_fd: RawFd,
    }

    impl Registration {
        pub fn new(active: Arc<AtomicBool>, queue: Arc<TaskQueue>, listener_fd: RawFd) -> Registration {
            register_hooks();
            registry().lock().unwrap().push(Entry {
                active,
                queue,
                listener_fd,
            });
            Registration { listener_fd }
        }
    }

    impl Drop for Registration {
        fn drop(&mut self) {
            registry()
                .lock()
                .unwrap()
                .retain(|e| e.listener_fd != self.listener_fd);
        }
    }

    fn register_hooks() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| unsafe {
            libc::pthread_atfork(Some(prepare), Some(parent), Some(child));
        });
    }

    /// Runs just before `fork()`: locks the registry and every live queue so
    /// the child inherits none of them mid-mutation.
    extern "C" fn prepare() {
        let reg = registry().lock().unwrap();
        let mut queues = Vec::with_capacity(reg.len());
        for entry in reg.iter() {
            let guard = entry.queue.items.lock().unwrap();
            // SAFETY: `reg` (held in `HELD` until `parent`/`child` below)
            // keeps `entry.queue`'s `Arc` alive, so the `Mutex<Vec<Task>>`
            // this guard borrows from outlives the transmuted lifetime.
            let guard: MutexGuard<'static, Vec<Task>> = unsafe { std::mem::transmute(guard) };
            queues.push(guard);
        }
        *HELD.lock().unwrap() = Some(HeldLocks {
            registry: reg,
            queues,
        });
    }

    /// Runs in the parent right after `fork()`: just releases everything
    /// `prepare` locked.
    extern "C" fn parent() {
        HELD.lock().unwrap().take();
    }

    /// Runs in the child right after `fork()`, the only place real cleanup
    /// happens: stop the child's copy of each server from accepting new
    /// work and close every socket it was holding, mirroring
    /// `forked_child()`'s `active = 0` / `closesocket(ss)` / queue walk.
    extern "C" fn child() {
        let held = match HELD.lock().unwrap().take() {
            Some(held) => held,
            None => return,
        };
        // Locks taken in `prepare` are no longer needed: only this single
        // thread survives the fork in the child, so nothing else could be
        // contending for them. Drop them before re-acquiring to drain.
        let reg = held.registry;
        drop(held.queues);

        for entry in reg.iter() {
            entry.active.store(false, Ordering::SeqCst);
            unsafe {
                libc::close(entry.listener_fd);
            }
            let mut items = entry.queue.items.lock().unwrap();
            for task in items.drain(..) {
                unsafe {
                    libc::close(task.socket.as_raw_fd());
                }
                // The fd is already closed; don't let `TcpStream::drop`
                // close it (and possibly a since-reopened fd) again.
                std::mem::forget(task.socket);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::Discard;
    use std::io::{Read, Write};
    use std::net::TcpStream as ClientStream;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn accepts_and_dispatches_to_worker() {
        let logger = Logger::root(Discard, o!());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        let mut server = Server::start("127.0.0.1", 0, 2, logger, move |mut socket| {
            let mut buf = [0u8; 5];
            if socket.read_exact(&mut buf).is_ok() {
                hits2.fetch_add(1, Ordering::SeqCst);
                let _ = socket.write_all(b"ok");
            }
        })
        .unwrap();

        let addr = server.local_addr();
        let mut client = ClientStream::connect(addr).unwrap();
        client.write_all(b"hello").unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"ok");

        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        server.shutdown();
    }
}
