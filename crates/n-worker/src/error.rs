//! Worker errors.
//!
//! [`WorkerError`] is returned synchronously to whoever called into the
//! worker. [`JobError`] never crosses the thread boundary as an error: the
//! worker turns it into a [`ResultCode`](crate::ResultCode) on the response.

use std::io;

use thiserror::Error;

use crate::worker::Lifecycle;

/// A call on the worker handle that was refused.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The call is not legal in the worker's current lifecycle state.
    #[error("worker is {state:?}")]
    InvalidState { state: Lifecycle },
    /// The queue already holds `capacity` requests.
    #[error("worker queue is full ({capacity} requests)")]
    ResourceExhausted { capacity: usize },
    /// The background thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A request that ran but did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out")]
    TimedOut,
}
