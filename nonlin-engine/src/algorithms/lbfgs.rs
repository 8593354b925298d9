//! Limited-memory BFGS with Armijo backtracking.
//!
//! Steps are clamped into the bound box before evaluation; the curvature
//! pair is taken from the clamped displacement, which keeps the recursion
//! well defined on the boundary.

use core::ffi::c_int;
use std::collections::VecDeque;

use super::{dot, norm};
use crate::eval::Halt;
use crate::opt::Tolerances;
use crate::raw;

const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_BACKTRACKS: usize = 60;
const GRAD_EPS: f64 = 1e-12;
const CURVATURE_EPS: f64 = 1e-10;
const DEFAULT_STORAGE: usize = 10;

pub(crate) fn minimize<F>(
    f: &mut F,
    x: &mut [f64],
    storage: usize,
    lb: &[f64],
    ub: &[f64],
    tol: &Tolerances,
) -> Result<(f64, c_int), Halt>
where
    F: FnMut(&[f64], Option<&mut [f64]>) -> Result<f64, Halt>,
{
    let n = x.len();
    let m = if storage > 0 { storage } else { DEFAULT_STORAGE };
    let mut g = vec![0.0; n];
    let mut fx = f(x, Some(&mut g))?;
    let mut hist: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(m);

    let mut xt = vec![0.0; n];
    let mut gt = vec![0.0; n];
    loop {
        let gnorm = norm(&g);
        if gnorm <= GRAD_EPS {
            return Ok((fx, raw::SUCCESS));
        }

        let mut d = two_loop(&g, &hist);
        if dot(&d, &g) >= 0.0 {
            // Not a descent direction; fall back to steepest descent.
            d = g.iter().map(|v| -v).collect();
        }

        let mut t = if hist.is_empty() {
            (1.0 / gnorm).min(1.0)
        } else {
            1.0
        };
        let mut accepted = false;
        let mut ft = fx;
        for _ in 0..MAX_BACKTRACKS {
            for i in 0..n {
                xt[i] = (x[i] + t * d[i]).clamp(lb[i], ub[i]);
            }
            let slope: f64 = (0..n).map(|i| (xt[i] - x[i]) * g[i]).sum();
            ft = f(&xt, Some(&mut gt))?;
            if ft <= fx + ARMIJO_C1 * slope {
                accepted = true;
                break;
            }
            t *= BACKTRACK;
        }
        if !accepted {
            return Ok((fx, raw::ROUNDOFF_LIMITED));
        }

        let s: Vec<f64> = (0..n).map(|i| xt[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| gt[i] - g[i]).collect();
        let ys = dot(&y, &s);
        if ys > CURVATURE_EPS * norm(&y) * norm(&s) {
            if hist.len() == m {
                hist.pop_front();
            }
            hist.push_back((s, y, 1.0 / ys));
        }

        let x_conv = tol.x_converged(x, &xt);
        let f_conv = tol.f_converged(fx, ft);
        x.copy_from_slice(&xt);
        g.copy_from_slice(&gt);
        fx = ft;
        if x_conv {
            return Ok((fx, raw::XTOL_REACHED));
        }
        if f_conv {
            return Ok((fx, raw::FTOL_REACHED));
        }
    }
}

/// Two-loop recursion: returns `-H·g` for the implicit inverse Hessian.
fn two_loop(g: &[f64], hist: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(hist.len());
    for (s, y, rho) in hist.iter().rev() {
        let a = rho * dot(s, &q);
        for i in 0..q.len() {
            q[i] -= a * y[i];
        }
        alphas.push(a);
    }
    if let Some((s, y, _)) = hist.back() {
        let gamma = dot(s, y) / dot(y, y);
        for v in q.iter_mut() {
            *v *= gamma;
        }
    }
    for ((s, y, rho), a) in hist.iter().zip(alphas.iter().rev()) {
        let b = rho * dot(y, &q);
        for i in 0..q.len() {
            q[i] += (a - b) * s[i];
        }
    }
    for v in q.iter_mut() {
        *v = -*v;
    }
    q
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn quadratic(x: &[f64], grad: Option<&mut [f64]>) -> Result<f64, Halt> {
        if let Some(g) = grad {
            g[0] = 2.0 * (x[0] - 1.0);
            g[1] = 8.0 * (x[1] + 2.0);
        }
        Ok((x[0] - 1.0).powi(2) + 4.0 * (x[1] + 2.0).powi(2))
    }

    #[test]
    fn converges_on_quadratic() {
        let lb = vec![f64::NEG_INFINITY; 2];
        let ub = vec![f64::INFINITY; 2];
        let tol = Tolerances {
            xtol_rel: 1e-6,
            xtol_abs: vec![0.0; 2],
            ftol_rel: 0.0,
            ftol_abs: 0.0,
        };
        let mut x = vec![5.0, 5.0];
        let mut f = quadratic;
        let (fx, _) = minimize(&mut f, &mut x, 0, &lb, &ub, &tol).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(x[1], -2.0, epsilon = 1e-5);
        assert!(fx < 1e-8);
    }

    #[test]
    fn stops_on_active_bound() {
        let lb = vec![2.0, 2.0];
        let ub = vec![10.0, 10.0];
        let tol = Tolerances {
            xtol_rel: 1e-6,
            xtol_abs: vec![0.0; 2],
            ftol_rel: 0.0,
            ftol_abs: 0.0,
        };
        let mut x = vec![5.0, 5.0];
        let mut f = quadratic;
        let (_, _) = minimize(&mut f, &mut x, 5, &lb, &ub, &tol).unwrap();
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-5);
    }
}
