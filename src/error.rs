//! Error taxonomy for the bridge.

use crate::status::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the engine refuses to construct an optimizer. The
    /// native layer reports only a null handle, so the two causes are not
    /// distinguished.
    #[error("invalid algorithm or dimension")]
    InvalidAlgorithmOrDimension,

    /// Returned when a vector argument does not match the optimizer's
    /// dimension.
    #[error("dimension mismatch: expected {expected} values but got {got}")]
    DimensionMismatch {
        /// The optimizer dimension.
        expected: usize,
        /// The length of the supplied sequence.
        got: usize,
    },

    /// Returned when a tolerance vector does not match a vector constraint's
    /// component count.
    #[error(
        "tolerance count mismatch: constraint has {expected} components but got {got} tolerances"
    )]
    ToleranceCountMismatch {
        /// The constraint's component count.
        expected: usize,
        /// The number of tolerances supplied.
        got: usize,
    },

    /// Returned when the engine rejects a callback installation, for example
    /// a nonlinear constraint on an algorithm without constraint support.
    /// The callback stays registered to the handle and is released at
    /// destroy time.
    #[error("engine rejected callback installation: {0}")]
    CallbackRejected(Status),

    /// Returned when the engine rejects a configuration value.
    #[error("engine rejected configuration value: {0}")]
    ConfigurationRejected(Status),

    /// Returned for any operation on a handle that no longer has an engine
    /// instance behind it: destroyed explicitly, or produced by a failed
    /// duplication.
    #[error("optimizer used after destroy")]
    UseAfterDestroy,

    /// The run failed inside the engine for an unspecified reason.
    #[error("generic engine failure")]
    Failure,

    /// The run was rejected because of invalid arguments, for example a
    /// missing objective or a global algorithm without finite bounds.
    #[error("invalid arguments")]
    InvalidArgs,

    /// The engine ran out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// The run halted because roundoff errors limited progress; the best
    /// point reached may still be useful.
    #[error("halted because roundoff errors limited progress")]
    RoundoffLimited,

    /// The run halted because of a forced stop.
    #[error("halted because of a forced stop")]
    ForcedStop,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// The error for a terminal run status, or `None` when the status is an
    /// ordinary stopping condition.
    pub(crate) fn from_run_status(status: Status) -> Option<Self> {
        match status {
            Status::Failure => Some(Self::Failure),
            Status::InvalidArgs => Some(Self::InvalidArgs),
            Status::OutOfMemory => Some(Self::OutOfMemory),
            Status::RoundoffLimited => Some(Self::RoundoffLimited),
            Status::ForcedStop => Some(Self::ForcedStop),
            _ => None,
        }
    }
}
