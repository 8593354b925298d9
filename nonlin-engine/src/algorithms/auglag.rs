//! Augmented-Lagrangian outer loop (PHR form).
//!
//! Each outer iteration minimizes the merit function with a subordinate
//! local solver, then updates the multipliers from the constraint values at
//! the inner solution and tightens the penalty when feasibility stalls. The
//! subordinate solver is taken from the instance's local-optimizer
//! reference when one is set (algorithm and tolerances only), falling back
//! to an internal Nelder-Mead.

use core::ffi::c_int;

use super::{lbfgs, neldermead};
use crate::eval::{Evaluator, Halt};
use crate::opt::{AlgorithmId, RawOpt, Tolerances};
use crate::raw;

const RHO_INIT: f64 = 10.0;
const RHO_GROW: f64 = 2.0;
const RHO_MAX: f64 = 1e10;
/// Feasibility floor applied when a constraint was registered with a zero
/// tolerance, so the outer loop has a reachable target.
const FEAS_FLOOR: f64 = 1e-6;
/// Progress ratio: the penalty grows unless the violation shrank to a
/// quarter of the previous outer iteration's.
const PROGRESS: f64 = 0.25;

pub(crate) fn minimize(
    opt: &RawOpt,
    ev: &mut Evaluator<'_>,
    x: &mut [f64],
) -> Result<(f64, c_int), Halt> {
    let n = opt.dim;
    let n_ineq: usize = opt.inequality.iter().map(|c| c.count()).sum();
    let n_eq: usize = opt.equality.iter().map(|c| c.count()).sum();

    // SAFETY: the local-optimizer reference is non-owning; keeping it alive
    // for the duration of this run is the caller's obligation.
    let local = unsafe { opt.local_opt.as_ref() };
    let (inner_alg, local_tol, inner_storage) = match local {
        Some(l) if l.dim == n => {
            let alg = match l.algorithm {
                AlgorithmId::Lbfgs => AlgorithmId::Lbfgs,
                _ => AlgorithmId::NelderMead,
            };
            (alg, Some(Tolerances::of(l)), l.vector_storage as usize)
        }
        _ => (
            AlgorithmId::NelderMead,
            None,
            opt.vector_storage as usize,
        ),
    };
    // The inner loop must resolve finer than the outer convergence check,
    // or consecutive inner solutions can hover at the outer threshold.
    let mut inner_tol = match local_tol {
        Some(t) if !t.is_unset() => t,
        _ => Tolerances::of(opt).scaled(0.1),
    };
    if inner_tol.is_unset() {
        inner_tol.xtol_rel = 1e-8;
    }
    let outer_tol = Tolerances::of(opt);
    let step = opt.effective_step(x);

    let feas_tol: Vec<f64> = opt
        .inequality
        .iter()
        .chain(&opt.equality)
        .flat_map(|c| c.tolerances())
        .map(|t| t.max(FEAS_FLOOR))
        .collect();

    let mut lam = vec![0.0; n_ineq];
    let mut mu = vec![0.0; n_eq];
    let mut rho = RHO_INIT;
    let mut prev_viol = f64::INFINITY;
    let mut prev_fobj = f64::NAN;

    loop {
        let x_prev = x.to_vec();
        let (merit_val, merit_code) = {
            let mut merit = |p: &[f64], mut gout: Option<&mut [f64]>| -> Result<f64, Halt> {
                let mut val = ev.objective(p, gout.as_deref_mut())?;
                let mut ci = Vec::with_capacity(n_ineq);
                let mut k = 0;
                for c in &opt.inequality {
                    let m = c.count();
                    if let Some(g) = gout.as_deref_mut() {
                        let mut cg = vec![0.0; m * n];
                        ev.constraint(c, p, &mut ci, Some(&mut cg));
                        for j in 0..m {
                            let t = lam[k + j] + rho * ci[k + j];
                            if t > 0.0 {
                                for i in 0..n {
                                    g[i] += t * cg[j * n + i];
                                }
                            }
                        }
                    } else {
                        ev.constraint(c, p, &mut ci, None);
                    }
                    k += m;
                }
                for (j, &c) in ci.iter().enumerate() {
                    val += ineq_penalty(c, lam[j], rho);
                }
                let mut ce = Vec::with_capacity(n_eq);
                k = 0;
                for c in &opt.equality {
                    let m = c.count();
                    if let Some(g) = gout.as_deref_mut() {
                        let mut cg = vec![0.0; m * n];
                        ev.constraint(c, p, &mut ce, Some(&mut cg));
                        for j in 0..m {
                            let t = mu[k + j] + rho * ce[k + j];
                            for i in 0..n {
                                g[i] += t * cg[j * n + i];
                            }
                        }
                    } else {
                        ev.constraint(c, p, &mut ce, None);
                    }
                    k += m;
                }
                for (j, &c) in ce.iter().enumerate() {
                    val += mu[j] * c + 0.5 * rho * c * c;
                }
                Ok(val)
            };
            match inner_alg {
                AlgorithmId::Lbfgs => {
                    lbfgs::minimize(&mut merit, x, inner_storage, &opt.lb, &opt.ub, &inner_tol)?
                }
                _ => neldermead::minimize(&mut merit, x, &step, &opt.lb, &opt.ub, &inner_tol)?,
            }
        };

        // Constraint values at the inner solution; constraint callbacks do
        // not count toward the evaluation budget.
        let mut cs = Vec::with_capacity(n_ineq + n_eq);
        for c in opt.inequality.iter().chain(&opt.equality) {
            ev.constraint(c, x, &mut cs, None);
        }
        let (ci, ce) = cs.split_at(n_ineq);

        let mut viol = 0.0f64;
        let mut feasible = true;
        let mut penalty = 0.0;
        for (j, &c) in ci.iter().enumerate() {
            viol = viol.max(c.max(0.0));
            if c > feas_tol[j] {
                feasible = false;
            }
            penalty += ineq_penalty(c, lam[j], rho);
        }
        for (j, &c) in ce.iter().enumerate() {
            viol = viol.max(c.abs());
            if c.abs() > feas_tol[n_ineq + j] {
                feasible = false;
            }
            penalty += mu[j] * c + 0.5 * rho * c * c;
        }
        let fobj = merit_val - penalty;

        let x_conv = outer_tol.x_converged(&x_prev, x);
        let f_conv = !prev_fobj.is_nan() && outer_tol.f_converged(prev_fobj, fobj);
        if feasible && (x_conv || f_conv) {
            let code = if x_conv {
                raw::XTOL_REACHED
            } else {
                raw::FTOL_REACHED
            };
            return Ok((fobj, code));
        }
        if merit_code == raw::FAILURE {
            return Ok((fobj, raw::FAILURE));
        }
        if merit_code == raw::ROUNDOFF_LIMITED && x_conv {
            return Ok((fobj, raw::ROUNDOFF_LIMITED));
        }

        for (j, &c) in ci.iter().enumerate() {
            lam[j] = (lam[j] + rho * c).max(0.0);
        }
        for (j, &c) in ce.iter().enumerate() {
            mu[j] += rho * c;
        }
        if viol > PROGRESS * prev_viol && rho < RHO_MAX {
            rho *= RHO_GROW;
        }
        prev_viol = viol;
        prev_fobj = fobj;
    }
}

/// PHR penalty term for one inequality component `c <= 0`.
fn ineq_penalty(c: f64, lam: f64, rho: f64) -> f64 {
    let t = lam + rho * c;
    if t > 0.0 {
        (t * t - lam * lam) / (2.0 * rho)
    } else {
        -lam * lam / (2.0 * rho)
    }
}
