//! Error types for the dataflow runtime.
//!
//! Every fatal condition is funneled through [`fatal`], which flushes a
//! structured diagnostic to the active [`tracing`] subscriber before
//! aborting the offending call chain. Nothing is retried.

use thiserror::Error;

/// Errors raised by the dataflow runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A stream was used outside its contract: write after close, a second
    /// producer or consumer, or a read past end-of-transmission.
    #[error("contract violation on stream `{stream}`: {detail}")]
    ContractViolation {
        /// Debug name of the offending stream.
        stream: String,
        /// What the caller did wrong.
        detail: String,
    },

    /// An address submitted to an async memory view fell outside `[0, size)`.
    #[error("address {addr} out of range for async mmap of {size} elements")]
    OutOfRange {
        /// The offending address (in element units).
        addr: u64,
        /// Element count of the mapped region.
        size: usize,
    },

    /// A memory view could not be reinterpreted at the requested type.
    #[error("invalid reinterpretation: {0}")]
    InvalidReinterpret(String),

    /// The scheduler observed no progress across repeated full scans while
    /// joined tasks were still pending.
    #[error("deadlock: no progress after {scans} scans; {live} tasks still live")]
    Deadlock {
        /// Number of progress-free scans before giving up.
        scans: usize,
        /// Number of unfinished tasks at the time of the report.
        live: usize,
    },
}

/// Convenience alias used by the fallible surface of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports a fatal error and aborts the current task graph.
///
/// The diagnostic is emitted at `error` severity first so that it reaches
/// the installed subscriber even when the panic is caught by a test harness.
pub(crate) fn fatal(err: Error) -> ! {
    tracing::error!("{err}");
    panic!("{err}");
}
