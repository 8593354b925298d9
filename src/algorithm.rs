//! Algorithm identifiers.

use core::ffi::{c_uint, CStr};

use nonlin_engine::raw;

/// The engine backends.
///
/// Construction validates the identifier against this set, so an
/// [`Optimizer`](crate::Optimizer) always carries a known algorithm;
/// whether a given *feature* (nonlinear constraints, finite bounds,
/// gradients) is supported by the algorithm is reported by the engine when
/// the feature is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// Nelder-Mead simplex: local, derivative-free.
    NelderMead,
    /// Limited-memory BFGS: local, derivative-based. The objective receives
    /// a gradient buffer to fill on every evaluation.
    Lbfgs,
    /// Controlled random search: global, population-based. Requires finite
    /// bounds; seed via [`srand`](crate::srand) for reproducible runs.
    Crs,
    /// Augmented Lagrangian: supports inequality and equality constraints,
    /// delegating the inner search to the configured local optimizer.
    Auglag,
}

impl Algorithm {
    pub(crate) fn raw(self) -> c_uint {
        match self {
            Self::NelderMead => raw::ALG_NELDERMEAD,
            Self::Lbfgs => raw::ALG_LBFGS,
            Self::Crs => raw::ALG_CRS,
            Self::Auglag => raw::ALG_AUGLAG,
        }
    }

    /// The engine's human-readable name for this algorithm.
    ///
    /// # Examples
    ///
    /// ```
    /// use nonlin::Algorithm;
    ///
    /// assert!(Algorithm::Auglag.name().contains("augmented Lagrangian"));
    /// ```
    #[must_use]
    pub fn name(self) -> &'static str {
        // SAFETY: the engine returns a static nul-terminated string.
        let name = unsafe { CStr::from_ptr(raw::algorithm_name(self.raw())) };
        name.to_str().unwrap_or("unknown")
    }
}

impl core::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
