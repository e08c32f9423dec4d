// crates/amrcc-core/src/error.rs

//! Error kinds for the connected-components engine.
//!
//! The engine is fail-stop: none of these are recoverable mid-run, because
//! correctness depends on every block completing every exchange round.

use thiserror::Error;

/// Engine-level error kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad user input: unknown field names, missing files, bad threshold mode.
    /// Reported before any compute starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The globally reduced mean is unusable (non-positive, NaN, infinite,
    /// or implausibly large).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// An exchange-protocol invariant was broken. Carries the block and the
    /// round so the failure can be traced in distributed logs.
    #[error("protocol violation in block {gid} at round {round}: {msg}")]
    Protocol {
        /// Block where the violation was detected.
        gid: i32,
        /// Exchange round at the time of detection.
        round: u32,
        /// Description of the broken invariant.
        msg: String,
    },

    /// Spill-storage or message-transport failure, propagated from the
    /// block runtime.
    #[error("resource error: {0}")]
    Resource(#[from] amrcc_runtime::RuntimeError),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a protocol violation on a given block/round.
    #[must_use]
    pub fn protocol(gid: i32, round: u32, msg: impl Into<String>) -> Self {
        Self::Protocol {
            gid,
            round,
            msg: msg.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Resource(amrcc_runtime::RuntimeError::Storage(e))
    }
}
