//! The worker thread and its bounded queue.
//!
//! ```text
//! Created ──start──▶ Started ──shutdown──▶ ShutdownRequested ──wait──▶ Joined
//!    │                  │                          │                     │
//!    └──────────────────┴───────── destroy ────────┴─────────────────────┴──▶ Destroyed
//! ```
//!
//! The queue is a `VecDeque` behind a `Mutex` with one `Condvar`. Requests
//! run strictly in submission order, one at a time, outside the lock. After
//! `shutdown` the thread finishes what is queued and exits; `destroy` drops
//! whatever has not started yet.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::error::{JobError, WorkerError};
use crate::git;
use crate::request::{Payload, Request, RequestId, RequestKind, Response, ResultCode};

/// Queue bound used by the shell.
pub const DEFAULT_CAPACITY: usize = 16;

/// Completion callback. Runs on the worker thread.
pub type Callback = Box<dyn FnMut(Response) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    ShutdownRequested,
    Joined,
    Destroyed,
}

/// Counters shared with the worker thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Refused by `submit`, for either state or capacity.
    pub rejected: u64,
    /// Discarded by `destroy` before they ran.
    pub dropped: u64,
}

struct Queued {
    id: RequestId,
    request: Request,
}

struct Queue {
    items: VecDeque<Queued>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    stats: Mutex<Stats>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Worker ─────────────────────────────────────────────────────────────────

/// Handle to the background thread.
///
/// Dropping a worker that is still running destroys it: queued requests
/// are dropped and the thread is joined.
pub struct Worker {
    shared: Arc<Shared>,
    capacity: usize,
    state: Lifecycle,
    next_id: RequestId,
    callback: Option<Callback>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// A worker holding at most `capacity` queued requests (at least one).
    pub fn new(capacity: usize, callback: impl FnMut(Response) + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    items: VecDeque::new(),
                    shutdown: false,
                }),
                ready: Condvar::new(),
                stats: Mutex::new(Stats::default()),
            }),
            capacity: capacity.max(1),
            state: Lifecycle::Created,
            next_id: 1,
            callback: Some(Box::new(callback)),
            handle: None,
        }
    }

    /// A worker whose callback forwards every response into a channel.
    /// The foreground drains the receiver at its own pace.
    #[must_use]
    pub fn with_channel(capacity: usize) -> (Self, Receiver<Response>) {
        let (tx, rx) = mpsc::channel();
        let worker = Self::new(capacity, move |response| {
            // The receiver is gone once the foreground stopped listening.
            let _ = tx.send(response);
        });
        (worker, rx)
    }

    #[must_use]
    pub const fn state(&self) -> Lifecycle {
        self.state
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        *self.shared.stats()
    }

    /// Requests queued and not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue().items.len()
    }

    /// Spawn the background thread.
    ///
    /// # Errors
    ///
    /// [`WorkerError::InvalidState`] unless `Created`, [`WorkerError::Spawn`]
    /// if the OS refuses the thread. A failed start cannot be retried.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        let Some(callback) = self.callback.take().filter(|_| self.state == Lifecycle::Created)
        else {
            return Err(WorkerError::InvalidState { state: self.state });
        };
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("n-worker".into())
            .spawn(move || worker_loop(&shared, callback))
            .map_err(WorkerError::Spawn)?;
        self.handle = Some(handle);
        self.state = Lifecycle::Started;
        debug!(target: "worker", capacity = self.capacity, "started");
        Ok(())
    }

    /// Queue `request` and wake the thread.
    ///
    /// # Errors
    ///
    /// [`WorkerError::InvalidState`] unless `Started`,
    /// [`WorkerError::ResourceExhausted`] when the queue is full.
    pub fn submit(&mut self, request: Request) -> Result<RequestId, WorkerError> {
        if self.state != Lifecycle::Started {
            self.shared.stats().rejected += 1;
            return Err(WorkerError::InvalidState { state: self.state });
        }
        let mut queue = self.shared.queue();
        if queue.items.len() >= self.capacity {
            drop(queue);
            self.shared.stats().rejected += 1;
            debug!(target: "worker", capacity = self.capacity, "queue full");
            return Err(WorkerError::ResourceExhausted {
                capacity: self.capacity,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        trace!(target: "worker", id, kind = request.label(), "submit");
        queue.items.push_back(Queued { id, request });
        drop(queue);
        self.shared.ready.notify_one();
        self.shared.stats().submitted += 1;
        Ok(id)
    }

    /// Ask the thread to exit once the queue is empty. Does not block.
    ///
    /// # Errors
    ///
    /// [`WorkerError::InvalidState`] unless `Started` (or already shutting
    /// down, which is a no-op).
    pub fn shutdown(&mut self) -> Result<(), WorkerError> {
        match self.state {
            Lifecycle::Started => {
                self.signal_shutdown();
                self.state = Lifecycle::ShutdownRequested;
                Ok(())
            }
            Lifecycle::ShutdownRequested => Ok(()),
            state => Err(WorkerError::InvalidState { state }),
        }
    }

    /// Block until the thread has exited.
    ///
    /// # Errors
    ///
    /// [`WorkerError::InvalidState`] unless shutdown was requested first;
    /// waiting on a running worker would never return.
    pub fn wait(&mut self) -> Result<(), WorkerError> {
        match self.state {
            Lifecycle::ShutdownRequested => {
                self.join();
                self.state = Lifecycle::Joined;
                Ok(())
            }
            Lifecycle::Joined => Ok(()),
            state => Err(WorkerError::InvalidState { state }),
        }
    }

    /// Stop the thread if it runs, drop every request that has not started,
    /// and return how many were dropped. Idempotent.
    pub fn destroy(&mut self) -> usize {
        if self.state == Lifecycle::Destroyed {
            return 0;
        }
        let dropped = {
            let mut queue = self.shared.queue();
            let n = queue.items.len();
            queue.items.clear();
            queue.shutdown = true;
            n
        };
        self.shared.ready.notify_all();
        self.join();
        self.callback = None;
        self.state = Lifecycle::Destroyed;
        self.shared.stats().dropped += dropped as u64;
        debug!(target: "worker", dropped, "destroyed");
        dropped
    }

    fn signal_shutdown(&self) {
        self.shared.queue().shutdown = true;
        self.shared.ready.notify_all();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "worker", "worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ─── Thread ─────────────────────────────────────────────────────────────────

#[allow(clippy::needless_pass_by_value)]
fn worker_loop(shared: &Shared, mut callback: Callback) {
    loop {
        let next = {
            let mut queue = shared.queue();
            loop {
                if let Some(item) = queue.items.pop_front() {
                    break Some(item);
                }
                if queue.shutdown {
                    break None;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        let Some(Queued { id, request }) = next else {
            break;
        };

        let response = execute(id, request);
        {
            let mut stats = shared.stats();
            match response.code {
                ResultCode::Ok => stats.completed += 1,
                ResultCode::Failed => stats.failed += 1,
                ResultCode::TimedOut => stats.timed_out += 1,
            }
        }
        callback(response);
    }
    trace!(target: "worker", "exiting");
}

/// Run one request. Panics inside a custom job become `Failed`.
fn execute(id: RequestId, request: Request) -> Response {
    let started = Instant::now();
    let kind = request.label();
    let Request { kind: job, timeout } = request;
    let result = panic::catch_unwind(AssertUnwindSafe(move || match job {
        RequestKind::GitStatus { working_directory } => {
            git::status(&working_directory, timeout).map(Payload::GitStatus)
        }
        RequestKind::Custom(job) => job.run(timeout).map(Payload::Custom),
    }))
    .unwrap_or_else(|_| Err(JobError::Failed("job panicked".into())));

    let response = Response::from_result(id, result);
    debug!(
        target: "worker",
        id,
        kind,
        code = ?response.code,
        elapsed_ms = started.elapsed().as_millis(),
        "request done"
    );
    response
}
