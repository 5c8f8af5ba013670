//! The error kinds produced by this crate's primitives.
//!
//! Section 7 of the design calls out four distinct, non-intermixable kinds
//! of failure. They are modelled here as variants of a single enum rather
//! than as separate types so that combinators (`when_all`, `sync_wait`, I/O
//! operations) can all return one `Result` alias.

use std::io;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure produced by a suspension point.
///
/// Propagation never swallows a user panic: a panic unwinding out of a
/// coroutine body is carried by `std::thread::Result`/`catch_unwind` at the
/// task boundary and re-raised on the awaiter's side, exactly as an
/// uncaught C++ exception would be; it is not represented by this enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Produced only by the cancellation framework (§4.6, §4.8): a pending
    /// operation observed `token.is_cancellation_requested()` or was
    /// interrupted through a kernel-level cancel path before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// A failure originating in the kernel adapter (§6), carrying the
    /// original `io::Error` so the numeric errno and OS message survive.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A task's promise was destroyed before it delivered a value or
    /// exception to an awaiter that out-lived it (§4.1 Detachment).
    #[error("broken promise: the task was dropped before completing")]
    BrokenPromise,

    /// Caller misuse: awaiting an already-consumed task, releasing an
    /// unlocked mutex, two waiters racing on a single-consumer event, etc.
    #[error("logic error: {0}")]
    Logic(&'static str),
}

impl Error {
    /// True if this is the cancellation error kind, as opposed to a kernel
    /// error that happens to carry `ECANCELED`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn logic(msg: &'static str) -> Error {
        Error::Logic(msg)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Cancelled => io::Error::new(io::ErrorKind::Other, "operation cancelled"),
            Error::Io(err) => err,
            Error::BrokenPromise => {
                io::Error::new(io::ErrorKind::Other, "broken promise: the task was dropped before completing")
            }
            Error::Logic(msg) => io::Error::new(io::ErrorKind::Other, msg),
        }
    }
}
