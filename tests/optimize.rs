//! End-to-end optimization runs through the full bridge: registry,
//! trampolines, engine, and status classification.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use nonlin::{Algorithm, Error, Optimizer, Status};

/// The classic constrained tutorial problem: minimize `sqrt(x1)` subject to
/// `(a*x0 + b)^3 - x1 <= 0` for `(a, b) = (2, 0)` and `(-1, 1)`. The
/// optimum is `x = [1/3, 8/27]` with value `sqrt(8/27)`.
fn tutorial_objective(count: &Arc<AtomicUsize>, saw_grad: &Arc<AtomicBool>) -> impl FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static {
    let count = count.clone();
    let saw_grad = saw_grad.clone();
    move |x: &[f64], grad: Option<&mut [f64]>| {
        count.fetch_add(1, Ordering::SeqCst);
        if let Some(g) = grad {
            saw_grad.store(true, Ordering::SeqCst);
            g[0] = 0.0;
            g[1] = 0.5 / x[1].sqrt();
        }
        x[1].sqrt()
    }
}

fn tutorial_constraint(a: f64, b: f64) -> impl FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send + 'static {
    move |x: &[f64], grad: Option<&mut [f64]>| {
        if let Some(g) = grad {
            g[0] = 3.0 * a * (a * x[0] + b).powi(2);
            g[1] = -1.0;
        }
        (a * x[0] + b).powi(3) - x[1]
    }
}

fn run_tutorial_derivative_free() -> (Vec<f64>, f64, Status, usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let saw_grad = Arc::new(AtomicBool::new(false));
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    opt.set_lower_bounds(&[f64::NEG_INFINITY, 0.0]).unwrap();
    opt.set_min_objective(tutorial_objective(&count, &saw_grad)).unwrap();
    opt.add_inequality_constraint(tutorial_constraint(2.0, 0.0), 1e-8).unwrap();
    opt.add_inequality_constraint(tutorial_constraint(-1.0, 1.0), 1e-8).unwrap();
    opt.set_xtol_rel(1e-4).unwrap();
    let (x, value) = opt.optimize(&[1.234, 5.678]).unwrap();
    assert!(!saw_grad.load(Ordering::SeqCst), "derivative-free run must not request gradients");
    (x, value, opt.last_status(), count.load(Ordering::SeqCst))
}

// =============================================================================
// Test: the constrained tutorial problem, derivative-free (AUGLAG)
// =============================================================================

#[test]
fn auglag_solves_the_tutorial_problem() {
    let (x, value, status, count) = run_tutorial_derivative_free();
    assert_eq!(status, Status::XtolReached);
    assert_abs_diff_eq!(x[0], 1.0 / 3.0, epsilon = 5e-3);
    assert_abs_diff_eq!(x[1], 8.0 / 27.0, epsilon = 5e-3);
    assert_abs_diff_eq!(value, (8.0f64 / 27.0).sqrt(), epsilon = 5e-3);
    assert!(count > 0);
}

#[test]
fn tutorial_evaluation_count_is_reproducible() {
    let (x1, v1, s1, c1) = run_tutorial_derivative_free();
    let (x2, v2, s2, c2) = run_tutorial_derivative_free();
    assert_eq!(c1, c2);
    assert_eq!(s1, s2);
    assert_eq!(x1, x2);
    assert_eq!(v1, v2);
}

// =============================================================================
// Test: same problem, gradient path (AUGLAG with an LBFGS local optimizer)
// =============================================================================

#[test]
fn auglag_with_lbfgs_local_uses_gradients() {
    let count = Arc::new(AtomicUsize::new(0));
    let saw_grad = Arc::new(AtomicBool::new(false));

    let mut local = Optimizer::new(Algorithm::Lbfgs, 2).unwrap();
    local.set_xtol_rel(1e-6).unwrap();

    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    opt.set_lower_bounds(&[-10.0, 1e-6]).unwrap();
    opt.set_upper_bounds(&[10.0, 10.0]).unwrap();
    opt.set_min_objective(tutorial_objective(&count, &saw_grad)).unwrap();
    opt.add_inequality_constraint(tutorial_constraint(2.0, 0.0), 1e-8).unwrap();
    opt.add_inequality_constraint(tutorial_constraint(-1.0, 1.0), 1e-8).unwrap();
    opt.set_xtol_rel(1e-4).unwrap();
    opt.set_local_optimizer(&local).unwrap();

    let (x, value) = opt.optimize(&[1.234, 5.678]).unwrap();
    assert!(saw_grad.load(Ordering::SeqCst), "LBFGS inner must request gradients");
    assert_eq!(opt.last_status(), Status::XtolReached);
    assert_abs_diff_eq!(x[0], 1.0 / 3.0, epsilon = 5e-3);
    assert_abs_diff_eq!(x[1], 8.0 / 27.0, epsilon = 5e-3);
    assert_abs_diff_eq!(value, (8.0f64 / 27.0).sqrt(), epsilon = 5e-3);
}

// =============================================================================
// Test: vector-valued constraint form of the same problem
// =============================================================================

#[test]
fn auglag_accepts_a_vector_constraint() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    opt.set_lower_bounds(&[f64::NEG_INFINITY, 0.0]).unwrap();
    opt.set_min_objective(|x, _grad| x[1].sqrt()).unwrap();
    opt.add_inequality_mconstraint(
        2,
        |r: &mut [f64], x: &[f64], grad: Option<&mut [f64]>| {
            let (a, b) = ([2.0, -1.0], [0.0, 1.0]);
            let n = x.len();
            for i in 0..2 {
                if let Some(g) = &grad {
                    debug_assert_eq!(g.len(), 2 * n);
                }
                r[i] = (a[i] * x[0] + b[i]).powi(3) - x[1];
            }
            if let Some(g) = grad {
                for i in 0..2 {
                    g[i * n] = 3.0 * a[i] * (a[i] * x[0] + b[i]).powi(2);
                    g[i * n + 1] = -1.0;
                }
            }
        },
        &[1e-8, 1e-8],
    )
    .unwrap();
    opt.set_xtol_rel(1e-4).unwrap();

    let (x, value) = opt.optimize(&[1.234, 5.678]).unwrap();
    assert_eq!(opt.last_status(), Status::XtolReached);
    assert_abs_diff_eq!(x[0], 1.0 / 3.0, epsilon = 5e-3);
    assert_abs_diff_eq!(x[1], 8.0 / 27.0, epsilon = 5e-3);
    assert_abs_diff_eq!(value, (8.0f64 / 27.0).sqrt(), epsilon = 5e-3);
}

// =============================================================================
// Test: equality constraints drive the solution onto the constraint surface
// =============================================================================

#[test]
fn auglag_handles_equality_constraints() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    opt.set_min_objective(|x, _grad| x[0] * x[0] + x[1] * x[1]).unwrap();
    opt.add_equality_constraint(|x, _grad| x[0] + x[1] - 1.0, 1e-8).unwrap();
    opt.set_xtol_rel(1e-6).unwrap();

    let (x, value) = opt.optimize(&[3.0, -2.0]).unwrap();
    assert!(opt.last_status().is_success());
    assert_abs_diff_eq!(x[0], 0.5, epsilon = 1e-3);
    assert_abs_diff_eq!(x[1], 0.5, epsilon = 1e-3);
    assert_abs_diff_eq!(value, 0.5, epsilon = 1e-3);
}

// =============================================================================
// Test: plain local runs, minimization and maximization
// =============================================================================

#[test]
fn lbfgs_minimizes_a_smooth_quadratic() {
    let saw_grad = Arc::new(AtomicBool::new(false));
    let flag = saw_grad.clone();
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 2).unwrap();
    opt.set_min_objective(move |x, grad| {
        if let Some(g) = grad {
            flag.store(true, Ordering::SeqCst);
            g[0] = 2.0 * (x[0] - 1.0);
            g[1] = 8.0 * (x[1] + 2.0);
        }
        (x[0] - 1.0).powi(2) + 4.0 * (x[1] + 2.0).powi(2)
    })
    .unwrap();
    opt.set_xtol_rel(1e-6).unwrap();

    let (x, value) = opt.optimize(&[5.0, 5.0]).unwrap();
    assert!(saw_grad.load(Ordering::SeqCst));
    assert!(opt.last_status().is_success());
    assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(x[1], -2.0, epsilon = 1e-4);
    assert!(value < 1e-7);
}

#[test]
fn maximization_negates_correctly() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 1).unwrap();
    opt.set_max_objective(|x, _grad| -(x[0] - 2.0).powi(2) + 10.0).unwrap();
    opt.set_xtol_rel(1e-8).unwrap();
    let (x, value) = opt.optimize(&[-3.0]).unwrap();
    assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-3);
    assert_abs_diff_eq!(value, 10.0, epsilon = 1e-6);
}

// =============================================================================
// Test: stopping conditions are results, not errors
// =============================================================================

#[test]
fn stopval_terminates_early_with_a_result() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    opt.set_min_objective(|x, _grad| x[0] * x[0] + x[1] * x[1]).unwrap();
    opt.set_stopval(1.0).unwrap();
    opt.set_xtol_rel(1e-10).unwrap();
    let (_, value) = opt.optimize(&[3.0, 2.0]).unwrap();
    assert_eq!(opt.last_status(), Status::StopvalReached);
    assert!(value <= 1.0);
}

#[test]
fn maxeval_is_an_ordinary_result() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    opt.set_min_objective(move |x, _grad| {
        counter.fetch_add(1, Ordering::SeqCst);
        x[0] * x[0] + x[1] * x[1]
    })
    .unwrap();
    opt.set_maxeval(5).unwrap();
    let result = opt.optimize(&[3.0, 2.0]);
    assert!(result.is_ok());
    assert_eq!(opt.last_status(), Status::MaxevalReached);
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

// =============================================================================
// Test: forced stop, before and during a run
// =============================================================================

#[test]
fn preset_force_stop_fails_the_run_until_cleared() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 1).unwrap();
    opt.set_min_objective(|x, _grad| x[0] * x[0]).unwrap();
    opt.set_xtol_rel(1e-6).unwrap();
    opt.set_force_stop(1).unwrap();

    assert!(matches!(opt.optimize(&[2.0]), Err(Error::ForcedStop)));
    assert_eq!(opt.last_status(), Status::ForcedStop);

    opt.set_force_stop(0).unwrap();
    assert!(opt.optimize(&[2.0]).is_ok());
    assert_eq!(opt.last_status(), Status::XtolReached);
}

#[test]
fn signal_raised_inside_a_callback_stops_the_run() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let mut opt = Optimizer::new(Algorithm::NelderMead, 1).unwrap();
    let stop = opt.force_stop_signal();
    opt.set_min_objective(move |x, _grad| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= 10 {
            stop.stop();
        }
        x[0] * x[0]
    })
    .unwrap();

    assert!(matches!(opt.optimize(&[10.0]), Err(Error::ForcedStop)));
    assert_eq!(opt.last_status(), Status::ForcedStop);
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

// =============================================================================
// Test: global, population-based CRS with a seeded stream
// =============================================================================

#[test]
fn crs_improves_within_budget_and_is_reproducible_when_seeded() {
    let run = || {
        nonlin::srand(42);
        let mut opt = Optimizer::new(Algorithm::Crs, 2).unwrap();
        opt.set_lower_bounds1(-5.0).unwrap();
        opt.set_upper_bounds1(5.0).unwrap();
        opt.set_population(40).unwrap();
        opt.set_maxeval(1500).unwrap();
        opt.set_min_objective(|x, _grad| x[0] * x[0] + x[1] * x[1]).unwrap();
        let out = opt.optimize(&[4.0, -4.0]).unwrap();
        (out, opt.last_status())
    };

    let ((x1, v1), s1) = run();
    assert_eq!(s1, Status::MaxevalReached);
    assert!(v1 < 0.5, "CRS should close in on the origin, got {v1}");

    let ((x2, v2), _) = run();
    assert_eq!(x1, x2);
    assert_eq!(v1, v2);
}

#[test]
fn crs_without_finite_bounds_is_invalid() {
    let mut opt = Optimizer::new(Algorithm::Crs, 2).unwrap();
    opt.set_min_objective(|x, _grad| x[0] * x[0] + x[1] * x[1]).unwrap();
    assert!(matches!(opt.optimize(&[0.0, 0.0]), Err(Error::InvalidArgs)));
    assert_eq!(opt.last_status(), Status::InvalidArgs);
}

// =============================================================================
// Test: a run without an objective is invalid
// =============================================================================

#[test]
fn missing_objective_is_invalid() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    assert!(matches!(opt.optimize(&[0.0, 0.0]), Err(Error::InvalidArgs)));
}

// =============================================================================
// Test: a callback may run a nested optimization (registry re-entrancy)
// =============================================================================

#[test]
fn nested_optimization_inside_a_callback_does_not_deadlock() {
    let mut outer = Optimizer::new(Algorithm::NelderMead, 1).unwrap();
    outer
        .set_min_objective(|x, _grad| {
            let shift = x[0];
            let mut inner = Optimizer::new(Algorithm::NelderMead, 1).unwrap();
            inner
                .set_min_objective(move |y, _| (y[0] - shift).powi(2) + shift * shift)
                .unwrap();
            inner.set_xtol_rel(1e-6).unwrap();
            let (_, inner_min) = inner.optimize(&[0.0]).unwrap();
            inner_min
        })
        .unwrap();
    outer.set_xtol_rel(1e-6).unwrap();

    let (x, value) = outer.optimize(&[3.0]).unwrap();
    assert_abs_diff_eq!(x[0], 0.0, epsilon = 1e-3);
    assert!(value < 1e-5);
}

// =============================================================================
// Test: constraints on an unsupporting algorithm fail at installation
// =============================================================================

#[test]
fn constraint_installation_fails_on_neldermead() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    let err = opt
        .add_inequality_constraint(|x, _grad| 1.0 - x[0], 1e-8)
        .unwrap_err();
    assert!(matches!(err, Error::CallbackRejected(Status::InvalidArgs)));

    // The handle remains usable for unconstrained runs.
    opt.set_min_objective(|x, _grad| x[0] * x[0] + x[1] * x[1]).unwrap();
    opt.set_xtol_rel(1e-6).unwrap();
    assert!(opt.optimize(&[1.0, 1.0]).is_ok());
}
