//! Round-trip and rejection tests for the configuration surface.

use nonlin::{Algorithm, Error, Optimizer};

// =============================================================================
// Test: every set/get pair round-trips, including scalar broadcasts
// =============================================================================

#[test]
fn bounds_round_trip() {
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 2).unwrap();

    assert_eq!(
        opt.lower_bounds().unwrap(),
        vec![f64::NEG_INFINITY, f64::NEG_INFINITY]
    );
    assert_eq!(opt.upper_bounds().unwrap(), vec![f64::INFINITY, f64::INFINITY]);

    let lb = [f64::NEG_INFINITY, 0.0];
    opt.set_lower_bounds(&lb).unwrap();
    assert_eq!(opt.lower_bounds().unwrap(), lb.to_vec());

    let ub = [1.0, f64::INFINITY];
    opt.set_upper_bounds(&ub).unwrap();
    assert_eq!(opt.upper_bounds().unwrap(), ub.to_vec());
}

#[test]
fn bounds_broadcast_from_a_single_value() {
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 3).unwrap();
    opt.set_lower_bounds1(-1.0).unwrap();
    assert_eq!(opt.lower_bounds().unwrap(), vec![-1.0, -1.0, -1.0]);
    opt.set_upper_bounds1(2.5).unwrap();
    assert_eq!(opt.upper_bounds().unwrap(), vec![2.5, 2.5, 2.5]);
}

#[test]
fn stopping_criteria_round_trip() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 10).unwrap();

    opt.set_stopval(2.12).unwrap();
    assert_eq!(opt.stopval().unwrap(), 2.12);

    opt.set_ftol_rel(1.73).unwrap();
    assert_eq!(opt.ftol_rel().unwrap(), 1.73);

    opt.set_ftol_abs(11.32).unwrap();
    assert_eq!(opt.ftol_abs().unwrap(), 11.32);

    opt.set_xtol_rel(3.45).unwrap();
    assert_eq!(opt.xtol_rel().unwrap(), 3.45);

    opt.set_maxeval(12).unwrap();
    assert_eq!(opt.maxeval().unwrap(), 12);

    opt.set_maxtime(11.5).unwrap();
    assert_eq!(opt.maxtime().unwrap(), 11.5);
}

#[test]
fn xtol_abs_round_trips_and_broadcasts() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    let tol = [356.79, 987.654];
    opt.set_xtol_abs(&tol).unwrap();
    assert_eq!(opt.xtol_abs().unwrap(), tol.to_vec());

    let mut opt3 = Optimizer::new(Algorithm::Auglag, 3).unwrap();
    opt3.set_xtol_abs1(753.1).unwrap();
    assert_eq!(opt3.xtol_abs().unwrap(), vec![753.1, 753.1, 753.1]);
}

#[test]
fn population_and_vector_storage_round_trip() {
    let mut opt = Optimizer::new(Algorithm::Crs, 10).unwrap();
    opt.set_population(237).unwrap();
    assert_eq!(opt.population().unwrap(), 237);

    let mut opt = Optimizer::new(Algorithm::Lbfgs, 10).unwrap();
    opt.set_vector_storage(123).unwrap();
    assert_eq!(opt.vector_storage().unwrap(), 123);
}

#[test]
fn force_stop_round_trips() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 10).unwrap();
    opt.set_force_stop(1).unwrap();
    assert_eq!(opt.force_stop_value().unwrap(), 1);
    opt.set_force_stop(0).unwrap();
    assert_eq!(opt.force_stop_value().unwrap(), 0);
}

// =============================================================================
// Test: initial step defaults and explicit values (probe point is zero)
// =============================================================================

#[test]
fn initial_step_defaults_to_unity_at_the_origin() {
    let opt = Optimizer::new(Algorithm::Crs, 1).unwrap();
    let (x, dx) = opt.initial_step().unwrap();
    assert_eq!(x, vec![0.0]);
    assert_eq!(dx, vec![1.0]);
}

#[test]
fn default_initial_step_follows_the_probe_point() {
    let mut opt = Optimizer::new(Algorithm::Crs, 1).unwrap();
    opt.set_default_initial_step(&[2.1]).unwrap();
    let (x, dx) = opt.initial_step().unwrap();
    assert_eq!(x, vec![0.0]);
    assert_eq!(dx, vec![2.1]);
}

#[test]
fn initial_step_round_trips_and_broadcasts() {
    let mut opt = Optimizer::new(Algorithm::Crs, 2).unwrap();
    opt.set_initial_step(&[10.0, 20.0]).unwrap();
    assert_eq!(opt.initial_step().unwrap().1, vec![10.0, 20.0]);

    opt.set_initial_step1(10.0).unwrap();
    assert_eq!(opt.initial_step().unwrap().1, vec![10.0, 10.0]);
}

#[test]
fn nonpositive_initial_step_is_rejected() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    assert!(matches!(
        opt.set_initial_step(&[1.0, 0.0]),
        Err(Error::ConfigurationRejected(_))
    ));
}

// =============================================================================
// Test: mismatched vector lengths are rejected before touching the engine
// =============================================================================

#[test]
fn mismatched_bounds_are_rejected_and_leave_prior_values() {
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 2).unwrap();
    opt.set_lower_bounds(&[-1.0, -2.0]).unwrap();

    let err = opt.set_lower_bounds(&[-9.0, -9.0, -9.0]).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 2,
            got: 3
        }
    ));
    assert_eq!(opt.lower_bounds().unwrap(), vec![-1.0, -2.0]);
}

#[test]
fn mismatched_xtol_abs_is_rejected() {
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 3).unwrap();
    assert!(matches!(
        opt.set_xtol_abs(&[1e-3]),
        Err(Error::DimensionMismatch {
            expected: 3,
            got: 1
        })
    ));
}

#[test]
fn mismatched_tolerance_count_is_rejected() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();
    let err = opt
        .add_inequality_mconstraint(
            2,
            |r: &mut [f64], x: &[f64], _g: Option<&mut [f64]>| {
                r[0] = x[0];
                r[1] = x[1];
            },
            &[1e-8],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ToleranceCountMismatch {
            expected: 2,
            got: 1
        }
    ));
}

#[test]
fn mismatched_start_point_is_rejected() {
    let mut opt = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    opt.set_min_objective(|x, _| x[0] + x[1]).unwrap();
    assert!(matches!(
        opt.optimize(&[1.0]),
        Err(Error::DimensionMismatch {
            expected: 2,
            got: 1
        })
    ));
}

// =============================================================================
// Test: identity accessors and utilities
// =============================================================================

#[test]
fn identity_accessors() {
    let opt = Optimizer::new(Algorithm::Auglag, 10).unwrap();
    assert_eq!(opt.algorithm(), Algorithm::Auglag);
    assert_eq!(opt.dimension(), 10);
    assert!(opt.algorithm_name().contains("augmented Lagrangian"));
    assert_eq!(opt.last_status().to_string(), "NOT_RUN");
    assert!(opt.is_valid());
}

#[test]
fn version_is_well_formed() {
    assert_eq!(nonlin::version(), "0.1.0");
}

#[test]
fn local_optimizer_must_match_dimension_and_be_alive() {
    let mut opt = Optimizer::new(Algorithm::Auglag, 2).unwrap();

    let local = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    opt.set_local_optimizer(&local).unwrap();

    let wrong_dim = Optimizer::new(Algorithm::NelderMead, 3).unwrap();
    assert!(matches!(
        opt.set_local_optimizer(&wrong_dim),
        Err(Error::ConfigurationRejected(_))
    ));

    let mut dead = Optimizer::new(Algorithm::NelderMead, 2).unwrap();
    dead.destroy();
    assert!(matches!(
        opt.set_local_optimizer(&dead),
        Err(Error::UseAfterDestroy)
    ));
}

#[test]
fn configuration_after_destroy_fails() {
    let mut opt = Optimizer::new(Algorithm::Lbfgs, 2).unwrap();
    opt.destroy();
    assert!(matches!(opt.set_xtol_rel(1e-4), Err(Error::UseAfterDestroy)));
    assert!(matches!(opt.lower_bounds(), Err(Error::UseAfterDestroy)));
    assert!(matches!(
        opt.set_min_objective(|x, _| x[0]),
        Err(Error::UseAfterDestroy)
    ));
}
