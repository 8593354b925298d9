//! The optimizer handle: one engine instance plus the callbacks it owns.

use core::ffi::{c_int, c_uint, c_void};
use core::fmt;
use core::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use nonlin_engine::raw;
use parking_lot::Mutex;

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};
use crate::registry::{self, Callback, SharedCallback, Token};
use crate::status::Status;
use crate::trampoline;

/// Engine handle smuggled into an installation wrapper.
#[derive(Clone, Copy)]
struct EnginePtr(*mut raw::RawOpt);

// SAFETY: the pointer is only dereferenced from inside a callback invoked
// during the owning optimizer's run, on the thread driving that run, and
// only through the engine's shared-access force-stop entry point.
unsafe impl Send for EnginePtr {}

/// Where an installed callback was wired into the engine. Replayed verbatim
/// when the optimizer is duplicated.
#[derive(Clone)]
enum Slot {
    MinObjective,
    MaxObjective,
    Inequality { tol: f64 },
    Equality { tol: f64 },
    InequalityM { m: usize, tol: Vec<f64> },
    EqualityM { m: usize, tol: Vec<f64> },
}

impl Slot {
    fn is_inequality(&self) -> bool {
        matches!(self, Self::Inequality { .. } | Self::InequalityM { .. })
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Equality { .. } | Self::EqualityM { .. })
    }
}

/// One registry token owned by an optimizer, with everything needed to
/// replay the installation on a duplicate.
struct OwnedCallback {
    token: Token,
    body: SharedCallback,
    slot: Slot,
}

/// Cloneable token for requesting a stop from inside a callback.
///
/// An installed closure cannot capture the [`Optimizer`] itself — the
/// handle is exclusively borrowed for the whole blocking run — so in-run
/// cancellation goes through this signal instead: raising it marks the
/// optimizer's stop flag, which is forwarded to the engine when the current
/// callback returns. The engine then terminates the run, which surfaces as
/// [`Error::ForcedStop`].
///
/// Raising the signal when no run is in flight is harmless; the flag is
/// also readable and clearable through
/// [`Optimizer::set_force_stop`]/[`Optimizer::force_stop_value`].
#[derive(Clone, Debug)]
pub struct ForceStopSignal {
    flag: Arc<AtomicI32>,
}

impl ForceStopSignal {
    /// Requests a stop with the conventional flag value `1`.
    pub fn stop(&self) {
        self.stop_with(1);
    }

    /// Requests a stop with a caller-chosen nonzero flag value.
    pub fn stop_with(&self, val: i32) {
        self.flag.store(val, Ordering::SeqCst);
    }
}

/// Builds the registry entry for one installation: the shared closure body
/// plus the stop-flag forwarding that makes [`ForceStopSignal`] work.
///
/// The body is shared (duplicates reuse it), but the entry is built per
/// installation so it captures the installing optimizer's own engine
/// pointer and stop flag.
fn wrap_entry(body: &SharedCallback, flag: &Arc<AtomicI32>, engine: EnginePtr) -> SharedCallback {
    let shared = body.clone();
    let flag = flag.clone();
    let is_scalar = matches!(&*body.lock(), Callback::Scalar(_));
    let forward = move || {
        // Bind the whole `EnginePtr` so the closure captures the `Send`
        // wrapper rather than its bare `*mut RawOpt` field (2021 disjoint
        // closure capture would otherwise capture the non-`Send` field).
        let engine = engine;
        let pending = flag.load(Ordering::SeqCst);
        if pending != 0 {
            // SAFETY: only reachable from a callback invoked during the
            // owning optimizer's run, so the engine instance is alive, and
            // force-stop takes shared access by contract.
            unsafe { raw::set_force_stop(engine.0, pending) };
        }
    };
    if is_scalar {
        Arc::new(Mutex::new(Callback::Scalar(Box::new(
            move |x: &[f64], grad: Option<&mut [f64]>| -> f64 {
                let value = match &mut *shared.lock() {
                    Callback::Scalar(f) => f(x, grad),
                    Callback::Vector(_) => unreachable!("registered shape cannot change"),
                };
                forward();
                value
            },
        ))))
    } else {
        Arc::new(Mutex::new(Callback::Vector(Box::new(
            move |result: &mut [f64], x: &[f64], grad: Option<&mut [f64]>| {
                match &mut *shared.lock() {
                    Callback::Vector(f) => f(result, x, grad),
                    Callback::Scalar(_) => unreachable!("registered shape cannot change"),
                }
                forward();
            },
        ))))
    }
}

/// A handle to one engine instance.
///
/// The handle owns the instance exclusively, plus a token for every
/// callback it registered (objective and constraints). Destroying the
/// handle — explicitly via [`destroy`](Self::destroy) or implicitly on drop
/// — evicts those tokens and releases the instance; both paths are
/// idempotent, so the safety net and an explicit call can never double
/// free.
///
/// A handle may move between threads, but is not for concurrent use: the
/// run blocks the calling thread and the engine instance is single
/// threaded. Independent handles on different threads only share the
/// registry lock.
pub struct Optimizer {
    raw: *mut raw::RawOpt,
    algorithm: Algorithm,
    dimension: usize,
    callbacks: Vec<OwnedCallback>,
    stop_flag: Arc<AtomicI32>,
    last_status: Status,
}

// SAFETY: the engine instance is exclusively owned and has no thread
// affinity; installed closures are required to be `Send`. The type is not
// `Sync` — concurrent use of one handle is not supported.
unsafe impl Send for Optimizer {}

impl Optimizer {
    /// Creates an optimizer for `algorithm` over `dimension` variables.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAlgorithmOrDimension`] when the engine refuses the
    /// pair; the native layer does not report which of the two was wrong.
    ///
    /// # Examples
    ///
    /// ```
    /// use nonlin::{Algorithm, Optimizer};
    ///
    /// let opt = Optimizer::new(Algorithm::Lbfgs, 3)?;
    /// assert_eq!(opt.dimension(), 3);
    /// assert_eq!(opt.algorithm(), Algorithm::Lbfgs);
    /// # Ok::<(), nonlin::Error>(())
    /// ```
    pub fn new(algorithm: Algorithm, dimension: usize) -> Result<Self> {
        let raw = raw::create(algorithm.raw(), dimension as c_uint);
        if raw.is_null() {
            return Err(Error::InvalidAlgorithmOrDimension);
        }
        trace_debug!(algorithm = ?algorithm, dimension, "optimizer created");
        Ok(Self {
            raw,
            algorithm,
            dimension,
            callbacks: Vec::new(),
            stop_flag: Arc::new(AtomicI32::new(0)),
            last_status: Status::NotRun,
        })
    }

    /// The algorithm this handle was constructed with.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The engine's human-readable name for the algorithm.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm.name()
    }

    /// The problem dimension, fixed at construction.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether the handle still has an engine instance behind it. `false`
    /// after [`destroy`](Self::destroy), and for the result of a
    /// duplication whose engine copy failed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.raw.is_null()
    }

    /// Terminal status of the most recent run; [`Status::NotRun`] before
    /// the first one.
    #[must_use]
    pub fn last_status(&self) -> Status {
        self.last_status
    }

    fn raw_handle(&self) -> Result<*mut raw::RawOpt> {
        if self.raw.is_null() {
            Err(Error::UseAfterDestroy)
        } else {
            Ok(self.raw)
        }
    }

    fn config_status(code: c_int) -> Result<()> {
        let status = Status::from_raw(code);
        if status == Status::Success {
            Ok(())
        } else {
            Err(Error::ConfigurationRejected(status))
        }
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len == self.dimension {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: len,
            })
        }
    }

    /// Registers `body`, wires it into the engine at `slot`, and records the
    /// token on this handle.
    ///
    /// The token is recorded even when the engine rejects the installation:
    /// the engine may have partially accepted it, so the registration stays
    /// owned and is released at destroy time rather than rolled back.
    fn install_shared(&mut self, body: SharedCallback, slot: Slot) -> Result<()> {
        let h = self.raw_handle()?;
        let entry = wrap_entry(&body, &self.stop_flag, EnginePtr(h));
        let token = registry::register(entry);
        let ctx = token.context() as *mut c_void;
        // SAFETY: `h` is live; the trampolines match the engine's callback
        // signatures and `ctx` is the token of the entry registered above.
        let code = unsafe {
            match &slot {
                Slot::MinObjective => raw::set_min_objective(h, trampoline::scalar, ctx),
                Slot::MaxObjective => raw::set_max_objective(h, trampoline::scalar, ctx),
                Slot::Inequality { tol } => {
                    raw::add_inequality_constraint(h, trampoline::scalar, ctx, *tol)
                }
                Slot::Equality { tol } => {
                    raw::add_equality_constraint(h, trampoline::scalar, ctx, *tol)
                }
                Slot::InequalityM { m, tol } => raw::add_inequality_mconstraint(
                    h,
                    *m as c_uint,
                    trampoline::vector,
                    ctx,
                    tol.as_ptr(),
                ),
                Slot::EqualityM { m, tol } => raw::add_equality_mconstraint(
                    h,
                    *m as c_uint,
                    trampoline::vector,
                    ctx,
                    tol.as_ptr(),
                ),
            }
        };
        self.callbacks.push(OwnedCallback { token, body, slot });
        let status = Status::from_raw(code);
        if status == Status::Success {
            Ok(())
        } else {
            Err(Error::CallbackRejected(status))
        }
    }

    /// Installs `f` as the objective to minimize.
    ///
    /// The closure receives the point and, when the algorithm is
    /// derivative-based, `Some(gradient)` to fill in place (length =
    /// dimension). Installing a new objective replaces the previous one.
    ///
    /// # Errors
    ///
    /// [`Error::CallbackRejected`] when the engine refuses the
    /// installation, and [`Error::UseAfterDestroy`] on a destroyed handle.
    pub fn set_min_objective<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static,
    {
        self.install_shared(
            Arc::new(Mutex::new(Callback::Scalar(Box::new(f)))),
            Slot::MinObjective,
        )
    }

    /// Installs `f` as the objective to maximize.
    pub fn set_max_objective<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static,
    {
        self.install_shared(
            Arc::new(Mutex::new(Callback::Scalar(Box::new(f)))),
            Slot::MaxObjective,
        )
    }

    /// Adds the inequality constraint `f(x) <= 0`, with `tol` as the
    /// satisfaction tolerance.
    ///
    /// # Errors
    ///
    /// [`Error::CallbackRejected`] when the active algorithm does not
    /// support nonlinear constraints (the registration still lands on the
    /// handle and is cleaned up at destroy time).
    pub fn add_inequality_constraint<F>(&mut self, f: F, tol: f64) -> Result<()>
    where
        F: FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static,
    {
        self.install_shared(
            Arc::new(Mutex::new(Callback::Scalar(Box::new(f)))),
            Slot::Inequality { tol },
        )
    }

    /// Adds the equality constraint `f(x) = 0`, with `tol` as the
    /// satisfaction tolerance.
    pub fn add_equality_constraint<F>(&mut self, f: F, tol: f64) -> Result<()>
    where
        F: FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static,
    {
        self.install_shared(
            Arc::new(Mutex::new(Callback::Scalar(Box::new(f)))),
            Slot::Equality { tol },
        )
    }

    /// Adds a vector-valued inequality constraint with `m` components,
    /// `f_i(x) <= 0` for each.
    ///
    /// The closure receives `(results, x, gradient)`: `results` has length
    /// `m`, and `gradient`, when present, is the `m x dimension` Jacobian in
    /// row-major order. `tol` supplies one satisfaction tolerance per
    /// component.
    ///
    /// # Errors
    ///
    /// [`Error::ToleranceCountMismatch`] when `tol.len() != m`, raised
    /// before anything is registered.
    pub fn add_inequality_mconstraint<F>(&mut self, m: usize, f: F, tol: &[f64]) -> Result<()>
    where
        F: FnMut(&mut [f64], &[f64], Option<&mut [f64]>) + Send + 'static,
    {
        if tol.len() != m {
            return Err(Error::ToleranceCountMismatch {
                expected: m,
                got: tol.len(),
            });
        }
        self.install_shared(
            Arc::new(Mutex::new(Callback::Vector(Box::new(f)))),
            Slot::InequalityM {
                m,
                tol: tol.to_vec(),
            },
        )
    }

    /// Adds a vector-valued equality constraint with `m` components.
    pub fn add_equality_mconstraint<F>(&mut self, m: usize, f: F, tol: &[f64]) -> Result<()>
    where
        F: FnMut(&mut [f64], &[f64], Option<&mut [f64]>) + Send + 'static,
    {
        if tol.len() != m {
            return Err(Error::ToleranceCountMismatch {
                expected: m,
                got: tol.len(),
            });
        }
        self.install_shared(
            Arc::new(Mutex::new(Callback::Vector(Box::new(f)))),
            Slot::EqualityM {
                m,
                tol: tol.to_vec(),
            },
        )
    }

    /// Drops every inequality constraint, both from the engine and from the
    /// registry; the objective and equality constraints are untouched.
    pub fn remove_inequality_constraints(&mut self) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        let code = unsafe { raw::remove_inequality_constraints(h) };
        self.callbacks.retain(|cb| {
            if cb.slot.is_inequality() {
                registry::evict(cb.token);
                false
            } else {
                true
            }
        });
        Self::config_status(code)
    }

    /// Drops every equality constraint; the objective and inequality
    /// constraints are untouched.
    pub fn remove_equality_constraints(&mut self) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        let code = unsafe { raw::remove_equality_constraints(h) };
        self.callbacks.retain(|cb| {
            if cb.slot.is_equality() {
                registry::evict(cb.token);
                false
            } else {
                true
            }
        });
        Self::config_status(code)
    }

    /// Sets per-dimension lower bounds.
    pub fn set_lower_bounds(&mut self, bounds: &[f64]) -> Result<()> {
        let h = self.raw_handle()?;
        self.check_dimension(bounds.len())?;
        // SAFETY: `h` is live and `bounds` covers the dimension.
        Self::config_status(unsafe { raw::set_lower_bounds(h, bounds.as_ptr()) })
    }

    /// Broadcasts a single lower bound to every dimension.
    pub fn set_lower_bounds1(&mut self, bound: f64) -> Result<()> {
        self.set_lower_bounds(&vec![bound; self.dimension])
    }

    /// The current lower bounds.
    pub fn lower_bounds(&self) -> Result<Vec<f64>> {
        let h = self.raw_handle()?;
        let mut out = vec![0.0; self.dimension];
        // SAFETY: `h` is live and `out` covers the dimension.
        Self::config_status(unsafe { raw::get_lower_bounds(h, out.as_mut_ptr()) })?;
        Ok(out)
    }

    /// Sets per-dimension upper bounds.
    pub fn set_upper_bounds(&mut self, bounds: &[f64]) -> Result<()> {
        let h = self.raw_handle()?;
        self.check_dimension(bounds.len())?;
        // SAFETY: `h` is live and `bounds` covers the dimension.
        Self::config_status(unsafe { raw::set_upper_bounds(h, bounds.as_ptr()) })
    }

    /// Broadcasts a single upper bound to every dimension.
    pub fn set_upper_bounds1(&mut self, bound: f64) -> Result<()> {
        self.set_upper_bounds(&vec![bound; self.dimension])
    }

    /// The current upper bounds.
    pub fn upper_bounds(&self) -> Result<Vec<f64>> {
        let h = self.raw_handle()?;
        let mut out = vec![0.0; self.dimension];
        // SAFETY: `h` is live and `out` covers the dimension.
        Self::config_status(unsafe { raw::get_upper_bounds(h, out.as_mut_ptr()) })?;
        Ok(out)
    }

    /// Stop when the objective reaches this value.
    pub fn set_stopval(&mut self, stopval: f64) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_stopval(h, stopval) })
    }

    /// The current stop value.
    pub fn stopval(&self) -> Result<f64> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_stopval(self.raw_handle()?) })
    }

    /// Stop when successive objective values are within this relative
    /// tolerance.
    pub fn set_ftol_rel(&mut self, tol: f64) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_ftol_rel(h, tol) })
    }

    /// The current relative f tolerance.
    pub fn ftol_rel(&self) -> Result<f64> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_ftol_rel(self.raw_handle()?) })
    }

    /// Stop when successive objective values are within this absolute
    /// tolerance.
    pub fn set_ftol_abs(&mut self, tol: f64) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_ftol_abs(h, tol) })
    }

    /// The current absolute f tolerance.
    pub fn ftol_abs(&self) -> Result<f64> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_ftol_abs(self.raw_handle()?) })
    }

    /// Stop when successive iterates are within this relative tolerance.
    pub fn set_xtol_rel(&mut self, tol: f64) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_xtol_rel(h, tol) })
    }

    /// The current relative x tolerance.
    pub fn xtol_rel(&self) -> Result<f64> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_xtol_rel(self.raw_handle()?) })
    }

    /// Sets per-dimension absolute x tolerances.
    pub fn set_xtol_abs(&mut self, tol: &[f64]) -> Result<()> {
        let h = self.raw_handle()?;
        self.check_dimension(tol.len())?;
        // SAFETY: `h` is live and `tol` covers the dimension.
        Self::config_status(unsafe { raw::set_xtol_abs(h, tol.as_ptr()) })
    }

    /// Broadcasts a single absolute x tolerance to every dimension.
    pub fn set_xtol_abs1(&mut self, tol: f64) -> Result<()> {
        self.set_xtol_abs(&vec![tol; self.dimension])
    }

    /// The current per-dimension absolute x tolerances.
    pub fn xtol_abs(&self) -> Result<Vec<f64>> {
        let h = self.raw_handle()?;
        let mut out = vec![0.0; self.dimension];
        // SAFETY: `h` is live and `out` covers the dimension.
        Self::config_status(unsafe { raw::get_xtol_abs(h, out.as_mut_ptr()) })?;
        Ok(out)
    }

    /// Caps the number of objective evaluations; zero or negative means
    /// unlimited.
    pub fn set_maxeval(&mut self, maxeval: i32) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_maxeval(h, maxeval) })
    }

    /// The current evaluation cap.
    pub fn maxeval(&self) -> Result<i32> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_maxeval(self.raw_handle()?) })
    }

    /// Caps the run's wall-clock time in seconds; zero or negative means
    /// unlimited.
    pub fn set_maxtime(&mut self, maxtime: f64) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_maxtime(h, maxtime) })
    }

    /// The current time cap in seconds.
    pub fn maxtime(&self) -> Result<f64> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_maxtime(self.raw_handle()?) })
    }

    /// Sets the population size for population-based algorithms; zero keeps
    /// the engine's heuristic default.
    pub fn set_population(&mut self, population: u32) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_population(h, population) })
    }

    /// The configured population size.
    pub fn population(&self) -> Result<u32> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_population(self.raw_handle()?) })
    }

    /// Sets the vector storage (history length) for limited-memory
    /// algorithms; zero keeps the engine default.
    pub fn set_vector_storage(&mut self, m: u32) -> Result<()> {
        let h = self.raw_handle()?;
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_vector_storage(h, m) })
    }

    /// The configured vector storage.
    pub fn vector_storage(&self) -> Result<u32> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_vector_storage(self.raw_handle()?) })
    }

    /// Sets an explicit per-dimension initial step.
    pub fn set_initial_step(&mut self, dx: &[f64]) -> Result<()> {
        let h = self.raw_handle()?;
        self.check_dimension(dx.len())?;
        // SAFETY: `h` is live and `dx` covers the dimension.
        Self::config_status(unsafe { raw::set_initial_step(h, dx.as_ptr()) })
    }

    /// Broadcasts a single initial step to every dimension.
    pub fn set_initial_step1(&mut self, dx: f64) -> Result<()> {
        self.set_initial_step(&vec![dx; self.dimension])
    }

    /// Computes and stores the engine's default step for a run starting at
    /// `x`.
    pub fn set_default_initial_step(&mut self, x: &[f64]) -> Result<()> {
        let h = self.raw_handle()?;
        self.check_dimension(x.len())?;
        // SAFETY: `h` is live and `x` covers the dimension.
        Self::config_status(unsafe { raw::set_default_initial_step(h, x.as_ptr()) })
    }

    /// The step a run from the origin would use, as `(probe_point, step)`.
    pub fn initial_step(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let h = self.raw_handle()?;
        let x = vec![0.0; self.dimension];
        let mut dx = vec![0.0; self.dimension];
        // SAFETY: `h` is live; `x` and `dx` cover the dimension.
        Self::config_status(unsafe { raw::get_initial_step(h, x.as_ptr(), dx.as_mut_ptr()) })?;
        Ok((x, dx))
    }

    /// Sets the force-stop flag: nonzero stops the next (or current) run,
    /// zero clears a previous request. The flag is not reset by a run, so a
    /// stopped handle must be cleared before it can run again.
    pub fn set_force_stop(&mut self, stop: i32) -> Result<()> {
        let h = self.raw_handle()?;
        self.stop_flag.store(stop, Ordering::SeqCst);
        // SAFETY: `h` is live.
        Self::config_status(unsafe { raw::set_force_stop(h, stop) })
    }

    /// Requests a forced stop, equivalent to `set_force_stop(1)`.
    pub fn force_stop(&mut self) -> Result<()> {
        self.set_force_stop(1)
    }

    /// The current force-stop flag value.
    pub fn force_stop_value(&self) -> Result<i32> {
        // SAFETY: the handle is live.
        Ok(unsafe { raw::get_force_stop(self.raw_handle()?) })
    }

    /// A cloneable signal for stopping a run from inside a callback.
    ///
    /// # Examples
    ///
    /// ```
    /// use nonlin::{Algorithm, Error, Optimizer};
    ///
    /// let mut opt = Optimizer::new(Algorithm::NelderMead, 1)?;
    /// let stop = opt.force_stop_signal();
    /// let mut evals = 0u32;
    /// opt.set_min_objective(move |x, _grad| {
    ///     evals += 1;
    ///     if evals >= 3 {
    ///         stop.stop();
    ///     }
    ///     x[0] * x[0]
    /// })?;
    /// assert!(matches!(opt.optimize(&[10.0]), Err(Error::ForcedStop)));
    /// # Ok::<(), nonlin::Error>(())
    /// ```
    #[must_use]
    pub fn force_stop_signal(&self) -> ForceStopSignal {
        ForceStopSignal {
            flag: self.stop_flag.clone(),
        }
    }

    /// Records `local` as the subordinate optimizer for nested local
    /// searches; only its algorithm and tolerances are consulted.
    ///
    /// The reference is non-owning at the engine layer: `local` must stay
    /// alive (not destroyed) for as long as this optimizer may run, and the
    /// obligation extends to duplicates of this optimizer. Nothing enforces
    /// it internally.
    pub fn set_local_optimizer(&mut self, local: &Optimizer) -> Result<()> {
        let h = self.raw_handle()?;
        let l = local.raw_handle()?;
        // SAFETY: both handles are live; the engine stores `l` without
        // taking ownership.
        Self::config_status(unsafe { raw::set_local_optimizer(h, l) })
    }

    /// Runs the optimization from `init`, blocking the calling thread until
    /// the engine terminates.
    ///
    /// Returns the (possibly only partially improved) best point and value
    /// for every ordinary stopping condition — tolerance reached, stop
    /// value reached, evaluation/time limit, plain success. The terminal
    /// status is cached and readable via [`last_status`](Self::last_status)
    /// either way.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] before any engine call when
    /// `init.len() != dimension`; otherwise the run-failure classification
    /// of the engine's terminal status: [`Error::InvalidArgs`],
    /// [`Error::OutOfMemory`], [`Error::Failure`],
    /// [`Error::RoundoffLimited`], or [`Error::ForcedStop`].
    pub fn optimize(&mut self, init: &[f64]) -> Result<(Vec<f64>, f64)> {
        let h = self.raw_handle()?;
        self.check_dimension(init.len())?;
        let mut x = init.to_vec();
        let mut value = f64::NAN;
        trace_info!(algorithm = ?self.algorithm, dimension = self.dimension, "run started");
        // SAFETY: `h` is live, `x` covers the dimension, and the handle is
        // exclusively borrowed for the duration of the blocking run.
        let code = unsafe { raw::optimize(h, x.as_mut_ptr(), &mut value) };
        let status = Status::from_raw(code);
        self.last_status = status;
        trace_info!(%status, "run finished");
        match Error::from_run_status(status) {
            Some(err) => Err(err),
            None => Ok((x, value)),
        }
    }

    /// Destroys the handle: every owned callback token is evicted from the
    /// registry, then the engine instance is released. Calling it again (or
    /// dropping afterwards) is a no-op.
    pub fn destroy(&mut self) {
        if self.raw.is_null() {
            return;
        }
        for cb in self.callbacks.drain(..) {
            registry::evict(cb.token);
        }
        // SAFETY: `self.raw` is live and exclusively owned; it is nulled
        // right after so no second release can happen.
        unsafe { raw::destroy(self.raw) };
        self.raw = core::ptr::null_mut();
        trace_debug!(algorithm = ?self.algorithm, "optimizer destroyed");
    }
}

impl Drop for Optimizer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Clone for Optimizer {
    /// Duplicates the optimizer: a fresh engine instance plus fresh
    /// registry entries for every installed callback, so the two handles
    /// share no tokens (the closure bodies themselves are shared).
    ///
    /// When engine duplication fails the result is an explicitly invalid
    /// handle: [`is_valid`](Self::is_valid) reports `false` and every
    /// operation on it returns [`Error::UseAfterDestroy`].
    fn clone(&self) -> Self {
        let dup_raw = if self.raw.is_null() {
            core::ptr::null_mut()
        } else {
            // SAFETY: `self.raw` is live.
            unsafe { raw::copy(self.raw) }
        };
        let mut dup = Self {
            raw: dup_raw,
            algorithm: self.algorithm,
            dimension: self.dimension,
            callbacks: Vec::new(),
            stop_flag: Arc::new(AtomicI32::new(0)),
            last_status: Status::NotRun,
        };
        if dup_raw.is_null() {
            return dup;
        }
        // The engine duplicate still carries the source's constraint
        // registrations, which point at the source's tokens; clear them and
        // replay every installation with tokens of the duplicate's own.
        // SAFETY: `dup_raw` is live.
        unsafe {
            raw::remove_inequality_constraints(dup_raw);
            raw::remove_equality_constraints(dup_raw);
        }
        for cb in &self.callbacks {
            if dup.install_shared(cb.body.clone(), cb.slot.clone()).is_err() {
                dup.destroy();
                return dup;
            }
        }
        trace_debug!(algorithm = ?self.algorithm, "optimizer duplicated");
        dup
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("algorithm", &self.algorithm)
            .field("dimension", &self.dimension)
            .field("installed_callbacks", &self.callbacks.len())
            .field("last_status", &self.last_status)
            .field("valid", &self.is_valid())
            .finish()
    }
}
