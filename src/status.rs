//! Terminal run statuses.

use core::ffi::c_int;

use nonlin_engine::raw;

/// The terminal status of an optimization run, as cached on the handle
/// after each run.
///
/// Positive engine codes (tolerance reached, stop value reached, limits
/// reached, plain success) are ordinary results; negative codes surface as
/// [`Error`](crate::Error) values from
/// [`Optimizer::optimize`](crate::Optimizer::optimize) but are still cached
/// here. The `Display` form uses the engine's conventional
/// SCREAMING_SNAKE names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// No run has happened on this handle yet.
    NotRun,
    /// Generic success.
    Success,
    /// The objective reached the configured stop value.
    StopvalReached,
    /// Successive objective values were within the f tolerance.
    FtolReached,
    /// Successive iterates were within the x tolerance.
    XtolReached,
    /// The evaluation budget was exhausted.
    MaxevalReached,
    /// The time budget was exhausted.
    MaxtimeReached,
    /// Generic engine failure.
    Failure,
    /// Invalid arguments reached the engine.
    InvalidArgs,
    /// The engine ran out of memory.
    OutOfMemory,
    /// Roundoff errors limited progress.
    RoundoffLimited,
    /// The run was stopped by the force-stop flag.
    ForcedStop,
}

impl Status {
    pub(crate) fn from_raw(code: c_int) -> Self {
        match code {
            raw::SUCCESS => Self::Success,
            raw::STOPVAL_REACHED => Self::StopvalReached,
            raw::FTOL_REACHED => Self::FtolReached,
            raw::XTOL_REACHED => Self::XtolReached,
            raw::MAXEVAL_REACHED => Self::MaxevalReached,
            raw::MAXTIME_REACHED => Self::MaxtimeReached,
            raw::INVALID_ARGS => Self::InvalidArgs,
            raw::OUT_OF_MEMORY => Self::OutOfMemory,
            raw::ROUNDOFF_LIMITED => Self::RoundoffLimited,
            raw::FORCED_STOP => Self::ForcedStop,
            _ => Self::Failure,
        }
    }

    /// Whether this status is an ordinary stopping condition rather than a
    /// failure. [`Status::NotRun`] is neither and returns `false`.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::StopvalReached
                | Self::FtolReached
                | Self::XtolReached
                | Self::MaxevalReached
                | Self::MaxtimeReached
        )
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::NotRun => "NOT_RUN",
            Self::Success => "SUCCESS",
            Self::StopvalReached => "STOPVAL_REACHED",
            Self::FtolReached => "FTOL_REACHED",
            Self::XtolReached => "XTOL_REACHED",
            Self::MaxevalReached => "MAXEVAL_REACHED",
            Self::MaxtimeReached => "MAXTIME_REACHED",
            Self::Failure => "FAILURE",
            Self::InvalidArgs => "INVALID_ARGS",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::RoundoffLimited => "ROUNDOFF_LIMITED",
            Self::ForcedStop => "FORCED_STOP",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_map_to_statuses() {
        assert_eq!(Status::from_raw(raw::XTOL_REACHED), Status::XtolReached);
        assert_eq!(Status::from_raw(raw::FORCED_STOP), Status::ForcedStop);
        assert_eq!(Status::from_raw(-99), Status::Failure);
    }

    #[test]
    fn display_uses_engine_conventions() {
        assert_eq!(Status::XtolReached.to_string(), "XTOL_REACHED");
        assert_eq!(Status::NotRun.to_string(), "NOT_RUN");
    }

    #[test]
    fn success_classification() {
        assert!(Status::MaxevalReached.is_success());
        assert!(!Status::ForcedStop.is_success());
        assert!(!Status::NotRun.is_success());
    }
}
