//! Requests in, responses out.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::JobError;
use crate::git::GitStatus;

/// Identifier assigned by [`Worker::submit`](crate::Worker::submit), starting at 1.
pub type RequestId = u64;

/// Budget for a request that did not set its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Caller-defined background work.
///
/// Runs once on the worker thread. Closures taking the timeout implement it
/// directly.
pub trait CustomJob: Send {
    fn run(self: Box<Self>, timeout: Duration) -> Result<Box<dyn Any + Send>, JobError>;
}

impl<F> CustomJob for F
where
    F: FnOnce(Duration) -> Result<Box<dyn Any + Send>, JobError> + Send,
{
    fn run(self: Box<Self>, timeout: Duration) -> Result<Box<dyn Any + Send>, JobError> {
        (*self)(timeout)
    }
}

pub enum RequestKind {
    /// Summarize the repository containing `working_directory`, if any.
    GitStatus { working_directory: PathBuf },
    Custom(Box<dyn CustomJob>),
}

impl fmt::Debug for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitStatus { working_directory } => f
                .debug_struct("GitStatus")
                .field("working_directory", working_directory)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One unit of background work with its time budget.
#[derive(Debug)]
pub struct Request {
    pub kind: RequestKind,
    pub timeout: Duration,
}

impl Request {
    #[must_use]
    pub fn git_status(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            kind: RequestKind::GitStatus {
                working_directory: working_directory.into(),
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn custom(job: impl CustomJob + 'static) -> Self {
        Self {
            kind: RequestKind::Custom(Box::new(job)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) const fn label(&self) -> &'static str {
        match self.kind {
            RequestKind::GitStatus { .. } => "git-status",
            RequestKind::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Failed,
    TimedOut,
}

pub enum Payload {
    /// Failed and timed-out requests carry nothing.
    Empty,
    GitStatus(GitStatus),
    Custom(Box<dyn Any + Send>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::GitStatus(status) => f.debug_tuple("GitStatus").field(status).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// The outcome of one request, handed to the completion callback.
#[derive(Debug)]
pub struct Response {
    pub id: RequestId,
    pub code: ResultCode,
    pub payload: Payload,
    /// Why the request failed, when it did.
    pub error: Option<String>,
}

impl Response {
    pub(crate) fn from_result(id: RequestId, result: Result<Payload, JobError>) -> Self {
        match result {
            Ok(payload) => Self {
                id,
                code: ResultCode::Ok,
                payload,
                error: None,
            },
            Err(JobError::TimedOut) => Self {
                id,
                code: ResultCode::TimedOut,
                payload: Payload::Empty,
                error: None,
            },
            Err(JobError::Failed(msg)) => Self {
                id,
                code: ResultCode::Failed,
                payload: Payload::Empty,
                error: Some(msg),
            },
        }
    }

    /// The git summary, if this is a successful git request.
    #[must_use]
    pub const fn git_status(&self) -> Option<&GitStatus> {
        match &self.payload {
            Payload::GitStatus(status) => Some(status),
            _ => None,
        }
    }

    /// Take a custom payload out as its concrete type.
    #[must_use]
    pub fn into_custom<T: 'static>(self) -> Option<T> {
        match self.payload {
            Payload::Custom(any) => any.downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_job_runs_with_timeout() {
        let job: Box<dyn CustomJob> = Box::new(|t: Duration| {
            Ok::<_, JobError>(Box::new(t.as_millis()) as Box<dyn Any + Send>)
        });
        let out = job.run(Duration::from_millis(7)).unwrap();
        assert_eq!(out.downcast::<u128>().ok().map(|b| *b), Some(7));
    }

    #[test]
    fn failed_result_keeps_message() {
        let r = Response::from_result(3, Err(JobError::Failed("boom".into())));
        assert_eq!(r.id, 3);
        assert_eq!(r.code, ResultCode::Failed);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.git_status().is_none());
    }

    #[test]
    fn custom_payload_downcasts() {
        let r = Response::from_result(1, Ok(Payload::Custom(Box::new(String::from("hi")))));
        assert_eq!(r.code, ResultCode::Ok);
        assert_eq!(r.into_custom::<String>().as_deref(), Some("hi"));
    }

    #[test]
    fn builder_sets_timeout() {
        let r = Request::git_status("/tmp").with_timeout(Duration::from_millis(5));
        assert_eq!(r.timeout, Duration::from_millis(5));
        assert_eq!(r.label(), "git-status");
    }
}
