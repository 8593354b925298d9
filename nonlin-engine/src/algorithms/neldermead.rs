//! Nelder-Mead downhill simplex, with bound handling by clamping.

use core::ffi::c_int;

use crate::eval::Halt;
use crate::opt::Tolerances;
use crate::raw;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimizes `f` starting from `x`, which is updated to the best vertex on
/// every exit path. Convergence is judged between the best and worst
/// vertices of the simplex.
pub(crate) fn minimize<F>(
    f: &mut F,
    x: &mut [f64],
    step: &[f64],
    lb: &[f64],
    ub: &[f64],
    tol: &Tolerances,
) -> Result<(f64, c_int), Halt>
where
    F: FnMut(&[f64], Option<&mut [f64]>) -> Result<f64, Halt>,
{
    let n = x.len();
    let mut verts: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    verts.push(x.to_vec());
    for i in 0..n {
        let mut v = x.to_vec();
        v[i] = (x[i] + step[i]).clamp(lb[i], ub[i]);
        if (v[i] - x[i]).abs() <= 1e-12 * step[i].abs().max(1.0) {
            v[i] = (x[i] - step[i]).clamp(lb[i], ub[i]);
        }
        verts.push(v);
    }
    let mut fvals = Vec::with_capacity(n + 1);
    for v in &verts {
        fvals.push(f(v, None)?);
    }

    loop {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| fvals[a].total_cmp(&fvals[b]));
        let (lo, snd, hi) = (order[0], order[n - 1], order[n]);

        if tol.x_converged(&verts[hi], &verts[lo]) {
            x.copy_from_slice(&verts[lo]);
            return Ok((fvals[lo], raw::XTOL_REACHED));
        }
        if tol.f_converged(fvals[hi], fvals[lo]) {
            x.copy_from_slice(&verts[lo]);
            return Ok((fvals[lo], raw::FTOL_REACHED));
        }

        // Centroid of every vertex but the worst.
        let mut centroid = vec![0.0; n];
        for (k, v) in verts.iter().enumerate() {
            if k == hi {
                continue;
            }
            for i in 0..n {
                centroid[i] += v[i];
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f64;
        }

        let reflected: Vec<f64> = (0..n)
            .map(|i| (centroid[i] + REFLECT * (centroid[i] - verts[hi][i])).clamp(lb[i], ub[i]))
            .collect();
        let fr = f(&reflected, None)?;

        if fr < fvals[lo] {
            let expanded: Vec<f64> = (0..n)
                .map(|i| (centroid[i] + EXPAND * (centroid[i] - verts[hi][i])).clamp(lb[i], ub[i]))
                .collect();
            let fe = f(&expanded, None)?;
            if fe < fr {
                verts[hi] = expanded;
                fvals[hi] = fe;
            } else {
                verts[hi] = reflected;
                fvals[hi] = fr;
            }
        } else if fr < fvals[snd] {
            verts[hi] = reflected;
            fvals[hi] = fr;
        } else {
            // Contract, outside when the reflection helped at all.
            let contracted: Vec<f64> = if fr < fvals[hi] {
                (0..n)
                    .map(|i| centroid[i] + CONTRACT * (reflected[i] - centroid[i]))
                    .collect()
            } else {
                (0..n)
                    .map(|i| centroid[i] - CONTRACT * (centroid[i] - verts[hi][i]))
                    .collect()
            };
            let fc = f(&contracted, None)?;
            if fc < fr.min(fvals[hi]) {
                verts[hi] = contracted;
                fvals[hi] = fc;
            } else {
                for k in 0..=n {
                    if k == lo {
                        continue;
                    }
                    for i in 0..n {
                        verts[k][i] = verts[lo][i] + SHRINK * (verts[k][i] - verts[lo][i]);
                    }
                    fvals[k] = f(&verts[k], None)?;
                }
            }
        }
    }
}
