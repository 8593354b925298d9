//! Backend dispatch.
//!
//! [`run`] owns everything the backends share: argument validation, start
//! point clamping, evaluator construction, and the translation of a
//! mid-evaluation [`Halt`] into a terminal status plus a best-effort result
//! point.

mod auglag;
mod crs;
mod lbfgs;
mod neldermead;

use core::ffi::c_int;

use crate::eval::{Evaluator, Halt};
use crate::opt::{AlgorithmId, RawOpt, Tolerances};
use crate::raw;

pub(crate) fn run(opt: &RawOpt, x: &mut [f64], fval: &mut f64) -> c_int {
    if !opt.bounds_valid() {
        return raw::INVALID_ARGS;
    }
    if opt.algorithm.needs_finite_bounds() && !opt.bounds_finite() {
        return raw::INVALID_ARGS;
    }
    let Some(mut ev) = Evaluator::new(opt) else {
        return raw::INVALID_ARGS;
    };
    opt.clamp(x);

    let result = if opt.dim == 0 {
        ev.objective(x, None).map(|v| (v, raw::SUCCESS))
    } else {
        match opt.algorithm {
            AlgorithmId::NelderMead => {
                let tol = Tolerances::of(opt);
                let step = opt.effective_step(x);
                let mut obj = |p: &[f64], g: Option<&mut [f64]>| ev.objective(p, g);
                neldermead::minimize(&mut obj, x, &step, &opt.lb, &opt.ub, &tol)
            }
            AlgorithmId::Lbfgs => {
                let tol = Tolerances::of(opt);
                let storage = opt.vector_storage as usize;
                let mut obj = |p: &[f64], g: Option<&mut [f64]>| ev.objective(p, g);
                lbfgs::minimize(&mut obj, x, storage, &opt.lb, &opt.ub, &tol)
            }
            AlgorithmId::Crs => {
                let tol = Tolerances::of(opt);
                let pop = if opt.population > 0 {
                    opt.population as usize
                } else {
                    10 * (opt.dim + 1)
                };
                let pop = pop.max(opt.dim + 2);
                let mut rng = raw::make_rng();
                let mut obj = |p: &[f64], g: Option<&mut [f64]>| ev.objective(p, g);
                crs::minimize(&mut obj, x, &opt.lb, &opt.ub, pop, &mut rng, &tol)
            }
            AlgorithmId::Auglag => auglag::minimize(opt, &mut ev, x),
        }
    };

    match result {
        Ok((v, code)) => {
            *fval = ev.report(v);
            code
        }
        Err(halt) => finish(halt, &ev, x, fval),
    }
}

fn finish(halt: Halt, ev: &Evaluator<'_>, x: &mut [f64], fval: &mut f64) -> c_int {
    match halt {
        Halt::Stopval => {
            if let Some((sx, sv)) = &ev.stop_hit {
                x.copy_from_slice(sx);
                *fval = ev.report(*sv);
            }
        }
        Halt::Maxeval | Halt::Maxtime => {
            if let Some((bx, bv)) = &ev.best {
                x.copy_from_slice(bx);
                *fval = ev.report(*bv);
            }
        }
        Halt::ForcedStop => {
            *fval = f64::NAN;
        }
    }
    halt.code()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
