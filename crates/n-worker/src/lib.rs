//! n-worker: one background thread for slow, decorative lookups.
//!
//! The foreground editor never waits on this crate. Requests go into a
//! bounded FIFO; a single thread drains it and hands each [`Response`] to a
//! completion callback *on the worker thread*. The callback is
//! `FnMut(Response) + Send + 'static`, so it cannot reach foreground state;
//! [`Worker::with_channel`] is the intended shape: the callback forwards into
//! an `mpsc` channel and the foreground drains it when it next redraws.
//!
//! - [`worker`]: lifecycle, queue and statistics;
//! - [`request`]: request kinds, result codes and payloads;
//! - [`git`]: repository detection and `git status` parsing.

pub mod error;
pub mod git;
pub mod request;
pub mod worker;

pub use error::{JobError, WorkerError};
pub use git::GitStatus;
pub use request::{CustomJob, Payload, Request, RequestId, RequestKind, Response, ResultCode};
pub use worker::{Lifecycle, Stats, Worker};
