#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]

//! Safe, handle-based interface to the `nonlin` nonlinear-optimization
//! engine.
//!
//! The engine ([`nonlin-engine`](nonlin_engine)) is reached through a
//! C-compatible opaque-handle contract: every callback crosses the boundary
//! as a fixed-signature `extern "C"` function pointer plus a single opaque
//! context word. This crate provides the machinery that makes arbitrary
//! Rust closures usable through that contract, and ties their lifetime to
//! the optimizer that installed them:
//!
//! - a process-wide **callback registry** handing out process-unique tokens
//!   for objective and constraint closures,
//! - fixed **trampolines** that resolve a token back to the right closure at
//!   call time,
//! - the [`Optimizer`] handle, which owns one engine instance plus every
//!   token it registered, and releases both on (idempotent) destruction,
//!   with `Drop` as the safety net and `Clone` as deep duplication.
//!
//! # Getting Started
//!
//! Minimize a function in a few lines:
//!
//! ```
//! use nonlin::{Algorithm, Optimizer};
//!
//! let mut opt = Optimizer::new(Algorithm::NelderMead, 2)?;
//! opt.set_min_objective(|x, _grad| (x[0] - 3.0).powi(2) + x[1] * x[1])?;
//! opt.set_xtol_rel(1e-8)?;
//! let (x, value) = opt.optimize(&[0.0, 0.0])?;
//! assert!((x[0] - 3.0).abs() < 1e-3);
//! assert!(value < 1e-5);
//! # Ok::<(), nonlin::Error>(())
//! ```
//!
//! Constrained problems install constraint closures the same way; see
//! [`Optimizer::add_inequality_constraint`] and friends. Derivative-based
//! algorithms pass `Some(gradient)` to the objective, which must fill it in
//! place.
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Optimizer`] | One engine instance plus the callbacks it owns; the whole configuration and run surface. |
//! | [`Algorithm`] | Which engine backend drives the run. |
//! | [`Status`] | Terminal status of the most recent run, success or failure. |
//! | [`ForceStopSignal`] | Cloneable token for cancelling a run from inside a callback. |
//!
//! # Threading
//!
//! Independent optimizers may run concurrently on separate threads; they
//! meet only at the registry lock, which is held for map operations, never
//! across a callback body. A single [`Optimizer`] is not for concurrent
//! use — Rust's borrow rules enforce what the engine requires anyway.
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on [`Algorithm`] and [`Status`] | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at registry and lifecycle boundaries | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

mod algorithm;
mod error;
mod opt;
mod registry;
mod status;
mod trampoline;

pub use algorithm::Algorithm;
pub use error::{Error, Result};
pub use opt::{ForceStopSignal, Optimizer};
pub use status::Status;

/// Engine version, formatted as `"major.minor.bugfix"`.
///
/// # Examples
///
/// ```
/// assert_eq!(nonlin::version(), "0.1.0");
/// ```
#[must_use]
pub fn version() -> String {
    let (mut major, mut minor, mut bugfix) = (0, 0, 0);
    // SAFETY: all three out-pointers are valid for writes.
    unsafe { nonlin_engine::raw::version(&mut major, &mut minor, &mut bugfix) };
    format!("{major}.{minor}.{bugfix}")
}

/// Seeds the engine's random stream. Runs of stochastic algorithms with the
/// same seed and configuration are reproducible.
pub fn srand(seed: u64) {
    nonlin_engine::raw::srand(seed);
}

/// Re-seeds the engine's random stream from the system clock.
pub fn srand_time() {
    nonlin_engine::raw::srand_time();
}
