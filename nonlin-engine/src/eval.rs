//! Objective/constraint evaluation with stopping bookkeeping.
//!
//! Every objective call flows through [`Evaluator::objective`], which is
//! where evaluation counting, the wall-clock budget, the stop value, and the
//! force-stop flag are enforced. Constraint callbacks are free: only
//! objective evaluations count, so a run's evaluation count is reproducible
//! across identical configurations.

use core::ffi::{c_uint, c_void};
use core::sync::atomic::Ordering;
use std::time::Instant;

use crate::opt::{Constraint, RawOpt};
use crate::raw::{self, ScalarFn};

/// Why a run was cut short from inside an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Halt {
    ForcedStop,
    Maxeval,
    Maxtime,
    Stopval,
}

impl Halt {
    pub(crate) fn code(self) -> core::ffi::c_int {
        match self {
            Self::ForcedStop => raw::FORCED_STOP,
            Self::Maxeval => raw::MAXEVAL_REACHED,
            Self::Maxtime => raw::MAXTIME_REACHED,
            Self::Stopval => raw::STOPVAL_REACHED,
        }
    }
}

pub(crate) struct Evaluator<'a> {
    opt: &'a RawOpt,
    obj: (ScalarFn, *mut c_void),
    sign: f64,
    start: Instant,
    pub(crate) neval: u32,
    /// Best point seen so far, in internal (minimization) scale.
    pub(crate) best: Option<(Vec<f64>, f64)>,
    /// The evaluation that tripped the stop value, if any.
    pub(crate) stop_hit: Option<(Vec<f64>, f64)>,
}

impl<'a> Evaluator<'a> {
    /// `None` when no objective has been installed.
    pub(crate) fn new(opt: &'a RawOpt) -> Option<Self> {
        let obj = opt.objective?;
        Some(Self {
            opt,
            obj,
            sign: if opt.maximize { -1.0 } else { 1.0 },
            start: Instant::now(),
            neval: 0,
            best: None,
            stop_hit: None,
        })
    }

    /// Maps an internal value back to the caller's orientation.
    pub(crate) fn report(&self, v: f64) -> f64 {
        self.sign * v
    }

    fn check(&self) -> Result<(), Halt> {
        if self.opt.force_stop.load(Ordering::SeqCst) != 0 {
            return Err(Halt::ForcedStop);
        }
        if self.opt.maxeval > 0 && self.neval >= self.opt.maxeval as u32 {
            return Err(Halt::Maxeval);
        }
        if self.opt.maxtime > 0.0 && self.start.elapsed().as_secs_f64() >= self.opt.maxtime {
            return Err(Halt::Maxtime);
        }
        Ok(())
    }

    /// Evaluates the objective at `x`, filling `grad` when present.
    ///
    /// Returns the value in internal scale: for a maximization problem the
    /// sign of both the value and the gradient is flipped, so every backend
    /// minimizes unconditionally.
    pub(crate) fn objective(
        &mut self,
        x: &[f64],
        mut grad: Option<&mut [f64]>,
    ) -> Result<f64, Halt> {
        self.check()?;
        let grad_ptr = match grad.as_mut() {
            Some(g) => g.as_mut_ptr(),
            None => core::ptr::null_mut(),
        };
        // SAFETY: the callback contract in `raw` promises `x` is read-only
        // with `dim` elements and `grad`, when non-null, is writable with
        // `dim` elements; both slices satisfy that here.
        let f = unsafe { (self.obj.0)(self.opt.dim as c_uint, x.as_ptr(), grad_ptr, self.obj.1) };
        self.neval += 1;
        if self.sign < 0.0 {
            if let Some(g) = grad.as_mut() {
                for v in g.iter_mut() {
                    *v = -*v;
                }
            }
        }
        let v = self.sign * f;
        let improved = match &self.best {
            Some((_, b)) => v < *b,
            None => true,
        };
        if improved {
            self.best = Some((x.to_vec(), v));
        }
        if self.opt.stopval_reached(f) {
            self.stop_hit = Some((x.to_vec(), v));
            return Err(Halt::Stopval);
        }
        Ok(v)
    }

    /// Evaluates one constraint registration, appending its component values
    /// to `out`. `grad`, when present, must hold `count * dim` elements for
    /// a vector constraint or `dim` for a scalar one.
    pub(crate) fn constraint(
        &mut self,
        c: &Constraint,
        x: &[f64],
        out: &mut Vec<f64>,
        mut grad: Option<&mut [f64]>,
    ) {
        let n = self.opt.dim as c_uint;
        let grad_ptr = match grad.as_mut() {
            Some(g) => g.as_mut_ptr(),
            None => core::ptr::null_mut(),
        };
        match c {
            Constraint::Scalar { f, data, .. } => {
                // SAFETY: same buffer contract as the objective callback.
                out.push(unsafe { f(n, x.as_ptr(), grad_ptr, *data) });
            }
            Constraint::Vector { f, data, m, .. } => {
                let offset = out.len();
                out.resize(offset + m, 0.0);
                // SAFETY: `result` points at `m` writable elements and
                // `grad`, when non-null, at `m * dim` writable elements.
                unsafe {
                    f(
                        *m as c_uint,
                        out[offset..].as_mut_ptr(),
                        n,
                        x.as_ptr(),
                        grad_ptr,
                        *data,
                    );
                }
            }
        }
    }
}
