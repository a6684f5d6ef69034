//! Compilation job errors

use thiserror::Error;

use crate::bailout::BailoutReason;
use crate::handles::{HandleHolder, PersistentHandles};
use crate::kind::JobKind;

/// Contract failures reported by value.
///
/// Bailouts are not errors: they are recorded on the job with
/// [`CompilationInfo::abort_optimization`](crate::CompilationInfo::abort_optimization)
/// and [`CompilationInfo::retry_optimization`](crate::CompilationInfo::retry_optimization).
#[derive(Debug, Error)]
pub enum JobError {
    /// Attach onto a holder that already owns a token
    #[error("{holder} already holds persistent handles")]
    HandlesAlreadyAttached {
        /// Holder that rejected the token
        holder: HandleHolder,
    },

    /// Detach from a holder that owns no token
    #[error("{holder} holds no persistent handles")]
    NoHandlesAttached {
        /// Holder that was asked to give up the token
        holder: HandleHolder,
    },

    /// `configure_osr` called a second time
    #[error("OSR entry already configured")]
    OsrAlreadyConfigured,

    /// OSR requested on a job that does not optimize a function
    #[error("OSR requires an optimizing job, got {kind}")]
    OsrRequiresOptimizing {
        /// Kind of the job
        kind: JobKind,
    },

    /// OSR requested with the none offset
    #[error("OSR offset must not be the none sentinel")]
    InvalidOsrOffset,

    /// Output slot already populated (or already released)
    #[error("output artifact already set")]
    OutputAlreadySet,

    /// Output published after the job bailed out
    #[error("cannot publish output after bailout: {reason}")]
    OutputAfterBailout {
        /// Recorded bailout reason
        reason: BailoutReason,
    },

    /// Wasm result on a job that produces code objects
    #[error("{kind} jobs cannot produce a wasm compilation result")]
    WasmOutputOnNonWasmJob {
        /// Kind of the job
        kind: JobKind,
    },

    /// Code object on a job that produces wasm results
    #[error("{kind} jobs cannot produce a code object")]
    CodeOutputOnWasmJob {
        /// Kind of the job
        kind: JobKind,
    },
}

/// Rejected attach. Owns the token that could not be attached so the caller
/// can route it elsewhere instead of losing it.
#[derive(Debug, Error)]
#[error("{holder} already holds persistent handles")]
pub struct AttachError {
    holder: HandleHolder,
    handles: PersistentHandles,
}

impl AttachError {
    pub(crate) fn new(holder: HandleHolder, handles: PersistentHandles) -> Self {
        Self { holder, handles }
    }

    /// Holder that rejected the token
    pub fn holder(&self) -> HandleHolder {
        self.holder
    }

    /// Take the rejected token back
    pub fn into_handles(self) -> PersistentHandles {
        self.handles
    }
}

impl From<AttachError> for JobError {
    fn from(value: AttachError) -> Self {
        Self::HandlesAlreadyAttached {
            holder: value.holder,
        }
    }
}

/// Result type for job operations
pub type Result<T> = std::result::Result<T, JobError>;
