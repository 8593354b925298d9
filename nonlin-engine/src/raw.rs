//! The engine's public contract, shaped like a native C library.
//!
//! Instances are reached through an opaque `*mut RawOpt`. Callbacks are
//! fixed-signature `extern "C"` function pointers paired with a single
//! opaque context word (`data`); the engine passes that exact word back,
//! unchanged, on every invocation. All entry points that dereference a
//! handle are `unsafe` — the caller guarantees the pointer came from
//! [`create`]/[`copy`] and has not been destroyed.
//!
//! [`optimize`] and the force-stop accessors take shared access only, so a
//! callback running inside an optimization may raise the stop flag on the
//! very instance being run. Every other setter requires that no run is in
//! flight on the instance.

use core::ffi::{c_char, c_double, c_int, c_uint, c_void};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::algorithms;
use crate::opt::{AlgorithmId, Constraint};

pub use crate::opt::RawOpt;

/// Scalar callback: returns `f(x)` and, when `grad` is non-null, writes the
/// `n` gradient components in place.
pub type ScalarFn = unsafe extern "C" fn(
    n: c_uint,
    x: *const c_double,
    grad: *mut c_double,
    data: *mut c_void,
) -> c_double;

/// Vector callback: writes `m` component values into `result` and, when
/// `grad` is non-null, the `m × n` row-major Jacobian.
pub type VectorFn = unsafe extern "C" fn(
    m: c_uint,
    result: *mut c_double,
    n: c_uint,
    x: *const c_double,
    grad: *mut c_double,
    data: *mut c_void,
);

pub const FAILURE: c_int = -1;
pub const INVALID_ARGS: c_int = -2;
pub const OUT_OF_MEMORY: c_int = -3;
pub const ROUNDOFF_LIMITED: c_int = -4;
pub const FORCED_STOP: c_int = -5;
pub const SUCCESS: c_int = 1;
pub const STOPVAL_REACHED: c_int = 2;
pub const FTOL_REACHED: c_int = 3;
pub const XTOL_REACHED: c_int = 4;
pub const MAXEVAL_REACHED: c_int = 5;
pub const MAXTIME_REACHED: c_int = 6;

pub const ALG_NELDERMEAD: c_uint = 0;
pub const ALG_LBFGS: c_uint = 1;
pub const ALG_CRS: c_uint = 2;
pub const ALG_AUGLAG: c_uint = 3;
/// One past the last valid algorithm identifier.
pub const NUM_ALGORITHMS: c_uint = 4;

const VERSION: (c_int, c_int, c_int) = (0, 1, 0);

static SEED: AtomicU64 = AtomicU64::new(0);
static SEEDED: AtomicBool = AtomicBool::new(false);

/// Allocates an instance for `algorithm` over `dim` variables. Returns null
/// when the algorithm identifier is unknown.
pub extern "C" fn create(algorithm: c_uint, dim: c_uint) -> *mut RawOpt {
    match AlgorithmId::from_raw(algorithm) {
        Some(alg) => Box::into_raw(Box::new(RawOpt::new(alg, dim as usize))),
        None => core::ptr::null_mut(),
    }
}

/// Releases an instance. Null is ignored.
///
/// # Safety
/// `h` must have come from [`create`] or [`copy`] and not been destroyed.
pub unsafe extern "C" fn destroy(h: *mut RawOpt) {
    if !h.is_null() {
        // SAFETY: ownership is returned to the box and dropped exactly once.
        drop(unsafe { Box::from_raw(h) });
    }
}

/// Duplicates an instance, including its configuration and callback
/// registrations (context words and all). Returns null for a null source.
///
/// # Safety
/// `h` must be a live instance pointer or null.
pub unsafe extern "C" fn copy(h: *const RawOpt) -> *mut RawOpt {
    if h.is_null() {
        return core::ptr::null_mut();
    }
    // SAFETY: `h` is live per the contract.
    Box::into_raw(Box::new(unsafe { (*h).duplicate() }))
}

macro_rules! check_handle {
    ($h:expr) => {
        if $h.is_null() {
            return INVALID_ARGS;
        }
    };
}

/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn set_min_objective(h: *mut RawOpt, f: ScalarFn, data: *mut c_void) -> c_int {
    check_handle!(h);
    let opt = unsafe { &mut *h };
    opt.objective = Some((f, data));
    opt.maximize = false;
    SUCCESS
}

/// Installs a maximization objective. A still-default stop value is flipped
/// from `-inf` to `+inf` so it stays disabled under the new orientation.
///
/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn set_max_objective(h: *mut RawOpt, f: ScalarFn, data: *mut c_void) -> c_int {
    check_handle!(h);
    let opt = unsafe { &mut *h };
    opt.objective = Some((f, data));
    opt.maximize = true;
    if opt.stopval == f64::NEG_INFINITY {
        opt.stopval = f64::INFINITY;
    }
    SUCCESS
}

fn add_scalar_constraint(
    opt: &mut RawOpt,
    equality: bool,
    f: ScalarFn,
    data: *mut c_void,
    tol: c_double,
) -> c_int {
    if !opt.algorithm.supports_constraints() || tol < 0.0 || tol.is_nan() {
        return INVALID_ARGS;
    }
    let c = Constraint::Scalar { f, data, tol };
    if equality {
        opt.equality.push(c);
    } else {
        opt.inequality.push(c);
    }
    SUCCESS
}

/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn add_inequality_constraint(
    h: *mut RawOpt,
    f: ScalarFn,
    data: *mut c_void,
    tol: c_double,
) -> c_int {
    check_handle!(h);
    add_scalar_constraint(unsafe { &mut *h }, false, f, data, tol)
}

/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn add_equality_constraint(
    h: *mut RawOpt,
    f: ScalarFn,
    data: *mut c_void,
    tol: c_double,
) -> c_int {
    check_handle!(h);
    add_scalar_constraint(unsafe { &mut *h }, true, f, data, tol)
}

unsafe fn add_vector_constraint(
    opt: &mut RawOpt,
    equality: bool,
    m: c_uint,
    f: VectorFn,
    data: *mut c_void,
    tol: *const c_double,
) -> c_int {
    if !opt.algorithm.supports_constraints() || m == 0 {
        return INVALID_ARGS;
    }
    let m = m as usize;
    let tol = if tol.is_null() {
        vec![0.0; m]
    } else {
        // SAFETY: a non-null `tol` points at `m` readable values.
        unsafe { core::slice::from_raw_parts(tol, m) }.to_vec()
    };
    if tol.iter().any(|t| *t < 0.0 || t.is_nan()) {
        return INVALID_ARGS;
    }
    let c = Constraint::Vector { f, data, m, tol };
    if equality {
        opt.equality.push(c);
    } else {
        opt.inequality.push(c);
    }
    SUCCESS
}

/// # Safety
/// `h` must be a live instance pointer; `tol`, when non-null, must point at
/// `m` readable values.
pub unsafe extern "C" fn add_inequality_mconstraint(
    h: *mut RawOpt,
    m: c_uint,
    f: VectorFn,
    data: *mut c_void,
    tol: *const c_double,
) -> c_int {
    check_handle!(h);
    unsafe { add_vector_constraint(&mut *h, false, m, f, data, tol) }
}

/// # Safety
/// `h` must be a live instance pointer; `tol`, when non-null, must point at
/// `m` readable values.
pub unsafe extern "C" fn add_equality_mconstraint(
    h: *mut RawOpt,
    m: c_uint,
    f: VectorFn,
    data: *mut c_void,
    tol: *const c_double,
) -> c_int {
    check_handle!(h);
    unsafe { add_vector_constraint(&mut *h, true, m, f, data, tol) }
}

/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn remove_inequality_constraints(h: *mut RawOpt) -> c_int {
    check_handle!(h);
    unsafe { &mut *h }.inequality.clear();
    SUCCESS
}

/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn remove_equality_constraints(h: *mut RawOpt) -> c_int {
    check_handle!(h);
    unsafe { &mut *h }.equality.clear();
    SUCCESS
}

macro_rules! vector_setter {
    ($(#[$doc:meta])* $set:ident, $get:ident, $field:ident) => {
        $(#[$doc])*
        /// # Safety
        /// `h` must be a live instance pointer; the value pointer must cover
        /// the instance dimension.
        pub unsafe extern "C" fn $set(h: *mut RawOpt, v: *const c_double) -> c_int {
            check_handle!(h);
            check_handle!(v);
            let opt = unsafe { &mut *h };
            // SAFETY: `v` points at `dim` readable values per the contract.
            let vs = unsafe { core::slice::from_raw_parts(v, opt.dim) };
            opt.$field.copy_from_slice(vs);
            SUCCESS
        }

        /// # Safety
        /// `h` must be a live instance pointer; the value pointer must cover
        /// the instance dimension.
        pub unsafe extern "C" fn $get(h: *const RawOpt, v: *mut c_double) -> c_int {
            check_handle!(h);
            check_handle!(v);
            let opt = unsafe { &*h };
            // SAFETY: `v` points at `dim` writable values per the contract.
            unsafe { core::slice::from_raw_parts_mut(v, opt.dim) }.copy_from_slice(&opt.$field);
            SUCCESS
        }
    };
}

vector_setter!(
    /// Sets the per-dimension lower bounds.
    set_lower_bounds,
    get_lower_bounds,
    lb
);
vector_setter!(
    /// Sets the per-dimension upper bounds.
    set_upper_bounds,
    get_upper_bounds,
    ub
);
vector_setter!(
    /// Sets the per-dimension absolute x tolerances.
    set_xtol_abs,
    get_xtol_abs,
    xtol_abs
);

macro_rules! scalar_setter {
    ($set:ident, $get:ident, $field:ident, $ty:ty, $default:expr) => {
        /// # Safety
        /// `h` must be a live instance pointer.
        pub unsafe extern "C" fn $set(h: *mut RawOpt, v: $ty) -> c_int {
            check_handle!(h);
            unsafe { &mut *h }.$field = v;
            SUCCESS
        }

        /// # Safety
        /// `h` must be a live instance pointer or null.
        pub unsafe extern "C" fn $get(h: *const RawOpt) -> $ty {
            if h.is_null() {
                return $default;
            }
            unsafe { &*h }.$field
        }
    };
}

scalar_setter!(set_stopval, get_stopval, stopval, c_double, f64::NEG_INFINITY);
scalar_setter!(set_ftol_rel, get_ftol_rel, ftol_rel, c_double, 0.0);
scalar_setter!(set_ftol_abs, get_ftol_abs, ftol_abs, c_double, 0.0);
scalar_setter!(set_xtol_rel, get_xtol_rel, xtol_rel, c_double, 0.0);
scalar_setter!(set_maxeval, get_maxeval, maxeval, c_int, 0);
scalar_setter!(set_maxtime, get_maxtime, maxtime, c_double, 0.0);
scalar_setter!(set_population, get_population, population, c_uint, 0);
scalar_setter!(set_vector_storage, get_vector_storage, vector_storage, c_uint, 0);

/// Sets an explicit per-dimension initial step; a null pointer reverts to
/// the built-in default.
///
/// # Safety
/// `h` must be a live instance pointer; `dx`, when non-null, must point at
/// `dim` readable values.
pub unsafe extern "C" fn set_initial_step(h: *mut RawOpt, dx: *const c_double) -> c_int {
    check_handle!(h);
    let opt = unsafe { &mut *h };
    if dx.is_null() {
        opt.initial_step = None;
        return SUCCESS;
    }
    // SAFETY: non-null `dx` covers `dim` values.
    let step = unsafe { core::slice::from_raw_parts(dx, opt.dim) };
    if step.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
        return INVALID_ARGS;
    }
    opt.initial_step = Some(step.to_vec());
    SUCCESS
}

/// Computes and stores the default step for a run starting at `x`.
///
/// # Safety
/// `h` must be a live instance pointer; `x` must point at `dim` readable
/// values.
pub unsafe extern "C" fn set_default_initial_step(h: *mut RawOpt, x: *const c_double) -> c_int {
    check_handle!(h);
    check_handle!(x);
    let opt = unsafe { &mut *h };
    // SAFETY: `x` covers `dim` values.
    let xs = unsafe { core::slice::from_raw_parts(x, opt.dim) };
    opt.initial_step = Some(opt.default_step(xs));
    SUCCESS
}

/// Writes the step a run starting at `x` would use into `dx`.
///
/// # Safety
/// `h` must be a live instance pointer; `x` and `dx` must point at `dim`
/// readable/writable values respectively.
pub unsafe extern "C" fn get_initial_step(
    h: *const RawOpt,
    x: *const c_double,
    dx: *mut c_double,
) -> c_int {
    check_handle!(h);
    check_handle!(x);
    check_handle!(dx);
    let opt = unsafe { &*h };
    // SAFETY: `x` and `dx` both cover `dim` values.
    let xs = unsafe { core::slice::from_raw_parts(x, opt.dim) };
    let step = opt.effective_step(xs);
    unsafe { core::slice::from_raw_parts_mut(dx, opt.dim) }.copy_from_slice(&step);
    SUCCESS
}

/// Raises (or clears) the stop flag. Shared access: may be called while a
/// run is in flight on the same instance.
///
/// # Safety
/// `h` must be a live instance pointer.
pub unsafe extern "C" fn set_force_stop(h: *const RawOpt, val: c_int) -> c_int {
    check_handle!(h);
    unsafe { &*h }.force_stop.store(val, Ordering::SeqCst);
    SUCCESS
}

/// # Safety
/// `h` must be a live instance pointer or null.
pub unsafe extern "C" fn get_force_stop(h: *const RawOpt) -> c_int {
    if h.is_null() {
        return 0;
    }
    unsafe { &*h }.force_stop.load(Ordering::SeqCst)
}

/// Records a non-owning reference to a subordinate optimizer whose
/// algorithm and tolerances drive nested local searches. Passing null
/// clears the reference. The referenced instance must stay alive for as
/// long as `h` may run — that is the caller's obligation.
///
/// # Safety
/// `h` must be a live instance pointer; `local` must be live or null.
pub unsafe extern "C" fn set_local_optimizer(h: *mut RawOpt, local: *const RawOpt) -> c_int {
    check_handle!(h);
    let opt = unsafe { &mut *h };
    if local.is_null() {
        opt.local_opt = core::ptr::null();
        return SUCCESS;
    }
    if core::ptr::eq(h as *const RawOpt, local) {
        return INVALID_ARGS;
    }
    // SAFETY: `local` is live per the contract.
    if unsafe { &*local }.dim != opt.dim {
        return INVALID_ARGS;
    }
    opt.local_opt = local;
    SUCCESS
}

/// # Safety
/// `h` must be a live instance pointer or null.
pub unsafe extern "C" fn get_algorithm(h: *const RawOpt) -> c_uint {
    if h.is_null() {
        return NUM_ALGORITHMS;
    }
    match unsafe { &*h }.algorithm {
        AlgorithmId::NelderMead => ALG_NELDERMEAD,
        AlgorithmId::Lbfgs => ALG_LBFGS,
        AlgorithmId::Crs => ALG_CRS,
        AlgorithmId::Auglag => ALG_AUGLAG,
    }
}

/// # Safety
/// `h` must be a live instance pointer or null.
pub unsafe extern "C" fn get_dimension(h: *const RawOpt) -> c_uint {
    if h.is_null() {
        return 0;
    }
    unsafe { &*h }.dim as c_uint
}

/// Static, nul-terminated human-readable algorithm name.
pub extern "C" fn algorithm_name(algorithm: c_uint) -> *const c_char {
    let bytes: &'static [u8] = match AlgorithmId::from_raw(algorithm) {
        Some(alg) => alg.name(),
        None => b"UNKNOWN ALGORITHM\0",
    };
    bytes.as_ptr().cast()
}

/// Seeds the engine-wide random stream; runs of stochastic algorithms with
/// the same seed and configuration are reproducible.
pub extern "C" fn srand(seed: u64) {
    SEED.store(seed, Ordering::SeqCst);
    SEEDED.store(true, Ordering::SeqCst);
}

/// Re-seeds the engine-wide random stream from the system clock.
pub extern "C" fn srand_time() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0x9e37_79b9_7f4a_7c15);
    srand(nanos);
}

pub(crate) fn make_rng() -> fastrand::Rng {
    if SEEDED.load(Ordering::SeqCst) {
        fastrand::Rng::with_seed(SEED.load(Ordering::SeqCst))
    } else {
        fastrand::Rng::new()
    }
}

/// Writes the engine version triple.
///
/// # Safety
/// All three pointers must be writable.
pub unsafe extern "C" fn version(major: *mut c_int, minor: *mut c_int, bugfix: *mut c_int) {
    // SAFETY: the pointers are writable per the contract.
    unsafe {
        *major = VERSION.0;
        *minor = VERSION.1;
        *bugfix = VERSION.2;
    }
}

/// Runs the optimization. `x` is the in/out point buffer of length `dim`;
/// the terminal objective value lands in `opt_f`. Takes shared access so
/// callbacks may raise the force-stop flag mid-run.
///
/// # Safety
/// `h` must be a live instance pointer; `x` must cover `dim` read/write
/// values; `opt_f` must be writable. No other thread may mutate the
/// instance during the run.
pub unsafe extern "C" fn optimize(
    h: *const RawOpt,
    x: *mut c_double,
    opt_f: *mut c_double,
) -> c_int {
    check_handle!(h);
    check_handle!(x);
    check_handle!(opt_f);
    let opt = unsafe { &*h };
    // SAFETY: `x` covers `dim` values per the contract.
    let xs = unsafe { core::slice::from_raw_parts_mut(x, opt.dim) };
    let mut fval = f64::NAN;
    let code = algorithms::run(opt, xs, &mut fval);
    // SAFETY: `opt_f` is writable per the contract.
    unsafe { *opt_f = fval };
    code
}
