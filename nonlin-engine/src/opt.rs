//! Engine-side optimizer instance state.
//!
//! A [`RawOpt`] is what hides behind the opaque pointer handed out by
//! [`raw::create`](crate::raw::create). Mutating entry points take exclusive
//! access; [`raw::optimize`](crate::raw::optimize) and the force-stop calls
//! take shared access only, so a callback may request a stop while a run is
//! in flight on the same instance.

use core::ffi::{c_uint, c_void};
use core::sync::atomic::{AtomicI32, Ordering};

use crate::raw::{ScalarFn, VectorFn};

/// Identifiers for the bundled backends, in raw-id order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AlgorithmId {
    NelderMead,
    Lbfgs,
    Crs,
    Auglag,
}

impl AlgorithmId {
    pub(crate) fn from_raw(id: c_uint) -> Option<Self> {
        match id {
            0 => Some(Self::NelderMead),
            1 => Some(Self::Lbfgs),
            2 => Some(Self::Crs),
            3 => Some(Self::Auglag),
            _ => None,
        }
    }

    /// Human-readable name, nul-terminated for the C-style accessor.
    pub(crate) fn name(self) -> &'static [u8] {
        match self {
            Self::NelderMead => b"Nelder-Mead simplex (local, derivative-free)\0",
            Self::Lbfgs => b"limited-memory BFGS (local, derivative-based)\0",
            Self::Crs => b"controlled random search (global, population-based)\0",
            Self::Auglag => b"augmented Lagrangian method (local, constraint-capable)\0",
        }
    }

    pub(crate) fn supports_constraints(self) -> bool {
        matches!(self, Self::Auglag)
    }

    pub(crate) fn needs_finite_bounds(self) -> bool {
        matches!(self, Self::Crs)
    }
}

/// A registered constraint: one scalar component, or `m` vector components
/// evaluated through a single callback.
pub(crate) enum Constraint {
    Scalar {
        f: ScalarFn,
        data: *mut c_void,
        tol: f64,
    },
    Vector {
        f: VectorFn,
        data: *mut c_void,
        m: usize,
        tol: Vec<f64>,
    },
}

impl Constraint {
    pub(crate) fn count(&self) -> usize {
        match self {
            Self::Scalar { .. } => 1,
            Self::Vector { m, .. } => *m,
        }
    }

    /// Per-component satisfaction tolerances.
    pub(crate) fn tolerances(&self) -> Vec<f64> {
        match self {
            Self::Scalar { tol, .. } => vec![*tol],
            Self::Vector { tol, .. } => tol.clone(),
        }
    }

    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Scalar { f, data, tol } => Self::Scalar {
                f: *f,
                data: *data,
                tol: *tol,
            },
            Self::Vector { f, data, m, tol } => Self::Vector {
                f: *f,
                data: *data,
                m: *m,
                tol: tol.clone(),
            },
        }
    }
}

/// One engine instance. Opaque to consumers.
pub struct RawOpt {
    pub(crate) algorithm: AlgorithmId,
    pub(crate) dim: usize,
    pub(crate) lb: Vec<f64>,
    pub(crate) ub: Vec<f64>,
    pub(crate) objective: Option<(ScalarFn, *mut c_void)>,
    pub(crate) maximize: bool,
    pub(crate) inequality: Vec<Constraint>,
    pub(crate) equality: Vec<Constraint>,
    pub(crate) stopval: f64,
    pub(crate) ftol_rel: f64,
    pub(crate) ftol_abs: f64,
    pub(crate) xtol_rel: f64,
    pub(crate) xtol_abs: Vec<f64>,
    pub(crate) maxeval: i32,
    pub(crate) maxtime: f64,
    pub(crate) population: u32,
    pub(crate) vector_storage: u32,
    pub(crate) initial_step: Option<Vec<f64>>,
    pub(crate) force_stop: AtomicI32,
    /// Non-owning reference to a subordinate optimizer. The caller keeps it
    /// alive for as long as this instance may run.
    pub(crate) local_opt: *const RawOpt,
}

impl RawOpt {
    pub(crate) fn new(algorithm: AlgorithmId, dim: usize) -> Self {
        Self {
            algorithm,
            dim,
            lb: vec![f64::NEG_INFINITY; dim],
            ub: vec![f64::INFINITY; dim],
            objective: None,
            maximize: false,
            inequality: Vec::new(),
            equality: Vec::new(),
            stopval: f64::NEG_INFINITY,
            ftol_rel: 0.0,
            ftol_abs: 0.0,
            xtol_rel: 0.0,
            xtol_abs: vec![0.0; dim],
            maxeval: 0,
            maxtime: 0.0,
            population: 0,
            vector_storage: 0,
            initial_step: None,
            force_stop: AtomicI32::new(0),
            local_opt: core::ptr::null(),
        }
    }

    /// Structural duplicate, including callback registrations and their
    /// context words. The consumer is expected to re-point those contexts if
    /// it manages callback identity itself.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            algorithm: self.algorithm,
            dim: self.dim,
            lb: self.lb.clone(),
            ub: self.ub.clone(),
            objective: self.objective,
            maximize: self.maximize,
            inequality: self.inequality.iter().map(Constraint::duplicate).collect(),
            equality: self.equality.iter().map(Constraint::duplicate).collect(),
            stopval: self.stopval,
            ftol_rel: self.ftol_rel,
            ftol_abs: self.ftol_abs,
            xtol_rel: self.xtol_rel,
            xtol_abs: self.xtol_abs.clone(),
            maxeval: self.maxeval,
            maxtime: self.maxtime,
            population: self.population,
            vector_storage: self.vector_storage,
            initial_step: self.initial_step.clone(),
            force_stop: AtomicI32::new(self.force_stop.load(Ordering::SeqCst)),
            local_opt: self.local_opt,
        }
    }

    pub(crate) fn bounds_valid(&self) -> bool {
        self.lb.iter().zip(&self.ub).all(|(l, u)| l <= u)
    }

    pub(crate) fn bounds_finite(&self) -> bool {
        self.lb.iter().chain(&self.ub).all(|b| b.is_finite())
    }

    pub(crate) fn clamp(&self, x: &mut [f64]) {
        for i in 0..self.dim.min(x.len()) {
            x[i] = x[i].clamp(self.lb[i], self.ub[i]);
        }
    }

    /// Default per-dimension step around `x`: a quarter of the box where the
    /// box is finite, otherwise the magnitude of the coordinate, with `1.0`
    /// as the last resort.
    pub(crate) fn default_step(&self, x: &[f64]) -> Vec<f64> {
        (0..self.dim)
            .map(|i| {
                if self.lb[i].is_finite() && self.ub[i].is_finite() && self.ub[i] > self.lb[i] {
                    0.25 * (self.ub[i] - self.lb[i])
                } else {
                    match x.get(i) {
                        Some(&v) if v != 0.0 && v.is_finite() => v.abs(),
                        _ => 1.0,
                    }
                }
            })
            .collect()
    }

    /// The step the next run would use from `x`.
    pub(crate) fn effective_step(&self, x: &[f64]) -> Vec<f64> {
        match &self.initial_step {
            Some(dx) => dx.clone(),
            None => self.default_step(x),
        }
    }

    /// `f` is the objective value in the caller's orientation.
    pub(crate) fn stopval_reached(&self, f: f64) -> bool {
        if self.maximize {
            f >= self.stopval
        } else {
            f <= self.stopval
        }
    }
}

/// The tolerance set a minimization loop converges against.
#[derive(Clone)]
pub(crate) struct Tolerances {
    pub(crate) xtol_rel: f64,
    pub(crate) xtol_abs: Vec<f64>,
    pub(crate) ftol_rel: f64,
    pub(crate) ftol_abs: f64,
}

impl Tolerances {
    pub(crate) fn of(opt: &RawOpt) -> Self {
        Self {
            xtol_rel: opt.xtol_rel,
            xtol_abs: opt.xtol_abs.clone(),
            ftol_rel: opt.ftol_rel,
            ftol_abs: opt.ftol_abs,
        }
    }

    /// Uniformly tightened copy, used for inner loops that must resolve
    /// finer than the loop judging convergence around them.
    pub(crate) fn scaled(mut self, k: f64) -> Self {
        self.xtol_rel *= k;
        self.ftol_rel *= k;
        self.ftol_abs *= k;
        for t in &mut self.xtol_abs {
            *t *= k;
        }
        self
    }

    pub(crate) fn is_unset(&self) -> bool {
        self.xtol_rel <= 0.0
            && self.ftol_rel <= 0.0
            && self.ftol_abs <= 0.0
            && self.xtol_abs.iter().all(|&t| t <= 0.0)
    }

    pub(crate) fn x_converged(&self, old: &[f64], new: &[f64]) -> bool {
        let mut abs_any = false;
        let mut abs_ok = true;
        let mut dist_sq = 0.0;
        let mut norm_sq = 0.0;
        for i in 0..old.len() {
            let d = (new[i] - old[i]).abs();
            dist_sq += d * d;
            norm_sq += new[i] * new[i];
            let tol = self.xtol_abs.get(i).copied().unwrap_or(0.0);
            if tol > 0.0 {
                abs_any = true;
                if d > tol {
                    abs_ok = false;
                }
            } else if d > 0.0 {
                abs_ok = false;
            }
        }
        if abs_any && abs_ok {
            return true;
        }
        // Measured against 1 + |x| so the criterion stays reachable when
        // the iterates approach the origin.
        self.xtol_rel > 0.0 && dist_sq.sqrt() <= self.xtol_rel * (1.0 + norm_sq.sqrt())
    }

    pub(crate) fn f_converged(&self, old: f64, new: f64) -> bool {
        let df = (new - old).abs();
        (self.ftol_abs > 0.0 && df <= self.ftol_abs)
            || (self.ftol_rel > 0.0 && df <= self.ftol_rel * new.abs().max(old.abs()))
    }
}
