//! Controlled random search: a population of points inside the (finite)
//! bound box, iteratively replacing the worst member with a reflection
//! through the centroid of a random simplex anchored at the best member.

use core::ffi::c_int;

use crate::eval::Halt;
use crate::opt::Tolerances;
use crate::raw;

pub(crate) fn minimize<F>(
    f: &mut F,
    x: &mut [f64],
    lb: &[f64],
    ub: &[f64],
    population: usize,
    rng: &mut fastrand::Rng,
    tol: &Tolerances,
) -> Result<(f64, c_int), Halt>
where
    F: FnMut(&[f64], Option<&mut [f64]>) -> Result<f64, Halt>,
{
    let n = x.len();
    let mut pts: Vec<Vec<f64>> = Vec::with_capacity(population);
    let mut fs: Vec<f64> = Vec::with_capacity(population);

    pts.push(x.to_vec());
    fs.push(f(x, None)?);
    while pts.len() < population {
        let p: Vec<f64> = (0..n)
            .map(|i| lb[i] + rng.f64() * (ub[i] - lb[i]))
            .collect();
        fs.push(f(&p, None)?);
        pts.push(p);
    }

    loop {
        let mut lo = 0;
        let mut hi = 0;
        for i in 1..population {
            if fs[i] < fs[lo] {
                lo = i;
            }
            if fs[i] > fs[hi] {
                hi = i;
            }
        }

        if tol.x_converged(&pts[hi], &pts[lo]) {
            x.copy_from_slice(&pts[lo]);
            return Ok((fs[lo], raw::XTOL_REACHED));
        }
        if tol.f_converged(fs[hi], fs[lo]) {
            x.copy_from_slice(&pts[lo]);
            return Ok((fs[lo], raw::FTOL_REACHED));
        }

        // Random simplex: the best member plus n distinct others; reflect
        // the last one through the centroid of the rest.
        let mut idx = vec![lo];
        while idx.len() < n + 1 {
            let j = rng.usize(0..population);
            if !idx.contains(&j) {
                idx.push(j);
            }
        }
        let last = idx[n];
        let mut trial = vec![0.0; n];
        for &k in &idx[..n] {
            for i in 0..n {
                trial[i] += pts[k][i];
            }
        }
        for i in 0..n {
            trial[i] = (2.0 * trial[i] / n as f64 - pts[last][i]).clamp(lb[i], ub[i]);
        }
        let ftrial = f(&trial, None)?;
        if ftrial < fs[hi] {
            pts[hi] = trial;
            fs[hi] = ftrial;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improves_on_sphere_within_budget() {
        let lb = vec![-5.0, -5.0];
        let ub = vec![5.0, 5.0];
        let tol = Tolerances {
            xtol_rel: 0.0,
            xtol_abs: vec![0.0; 2],
            ftol_rel: 0.0,
            ftol_abs: 0.0,
        };
        let mut rng = fastrand::Rng::with_seed(42);
        let mut best = f64::INFINITY;
        let mut calls = 0u32;
        let mut f = |x: &[f64], _: Option<&mut [f64]>| {
            calls += 1;
            if calls > 1500 {
                return Err(Halt::Maxeval);
            }
            let v = x[0] * x[0] + x[1] * x[1];
            if v < best {
                best = v;
            }
            Ok(v)
        };
        let mut x = vec![4.0, -4.0];
        let err = minimize(&mut f, &mut x, &lb, &ub, 30, &mut rng, &tol).unwrap_err();
        drop(f);
        assert_eq!(err, Halt::Maxeval);
        assert!(best < 0.1, "expected CRS to close in on the origin, best={best}");
    }
}
