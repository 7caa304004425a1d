//! End-to-end tests of the full Newton pipeline: discretization, KKT
//! construction, Riccati sweeps, step selection and solution updates.

use nalgebra::{DVector, Vector3};

use nmpc_core::{
    ConfigurationSpaceCost, Constraints, ContactForceCost, ContactSequence, ContactStatus,
    CostFunction, FrictionCone, GridType, JointVelocityUpperLimit, OcpSolver, PointFoot,
    PointMass, RobotModel, SolverSettings,
};

fn contact_free_sequence() -> ContactSequence {
    ContactSequence::new(ContactStatus::new(vec![]))
}

fn tracking_cost(dim: usize, q_ref: f64, terminal_weight: f64) -> CostFunction {
    let mut term = ConfigurationSpaceCost::new(dim, dim);
    term.set_q_ref(DVector::from_element(dim, q_ref));
    term.set_q_weight(DVector::from_element(dim, 1.0));
    term.set_v_weight(DVector::from_element(dim, 1.0));
    term.set_qf_weight(DVector::from_element(dim, terminal_weight));
    term.set_vf_weight(DVector::from_element(dim, terminal_weight));
    let mut cost = CostFunction::new();
    cost.push_back("config", Box::new(term));
    cost
}

#[test]
fn test_point_mass_stabilization_converges() {
    // Unconstrained 1-DoF point mass, cost (q−1)² + v² over the horizon with
    // a stiff terminal anchor: the terminal state must land on the target.
    let robot = PointMass::new(1);
    let cost = tracking_cost(1, 1.0, 1.0e8);
    let settings = SolverSettings {
        max_iter: 20,
        kkt_tol: 1.0e-8,
        ..Default::default()
    };
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        Constraints::new(),
        1.0,
        10,
        settings,
    )
    .unwrap();

    let q0 = DVector::zeros(1);
    let v0 = DVector::zeros(1);
    let stats = solver.solve(0.0, &q0, &v0).unwrap();
    assert!(stats.convergence, "expected convergence: {stats:?}");
    assert!(solver.kkt_error() < 1.0e-8);

    let n = solver.discretization().n_grids() - 1;
    let terminal = solver.get_solution(n);
    assert!(
        (terminal.q[0] - 1.0).abs() < 1.0e-6,
        "q_N = {}",
        terminal.q[0]
    );
    assert!(terminal.v[0].abs() < 1.0e-6, "v_N = {}", terminal.v[0]);
}

#[test]
fn test_double_integrator_kkt_decrease() {
    // The problem is linear-quadratic: the first exact Newton step must
    // collapse the KKT error to the numerical floor, where it stays.
    let robot = PointMass::new(1);
    let cost = tracking_cost(1, 1.0, 10.0);
    let settings = SolverSettings {
        max_iter: 1,
        ..Default::default()
    };
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        Constraints::new(),
        2.0,
        20,
        settings,
    )
    .unwrap();

    let q0 = DVector::from_element(1, -0.5);
    let v0 = DVector::from_element(1, 0.3);
    let mut errors = Vec::new();
    for _ in 0..5 {
        solver.update_solution(0.0, &q0, &v0).unwrap();
        errors.push(solver.kkt_error());
    }
    assert!(errors[0] > 1.0e-2, "initial guess should be non-optimal");
    // Strict decrease until the floor, then stay at the floor.
    let floor = 1.0e-16;
    let mut reached_floor = false;
    for k in 1..errors.len() {
        if reached_floor || errors[k - 1] < floor {
            reached_floor = true;
            assert!(errors[k] < floor, "iter {k}: {}", errors[k]);
        } else {
            assert!(
                errors[k] < errors[k - 1],
                "iter {k}: {} !< {}",
                errors[k],
                errors[k - 1]
            );
        }
    }
    assert!(reached_floor || *errors.last().unwrap() < floor);
}

#[test]
fn test_terminal_grid_has_no_input_blocks() {
    let robot = PointMass::new(2);
    let cost = tracking_cost(2, 0.0, 1.0);
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        Constraints::new(),
        1.0,
        10,
        SolverSettings::default(),
    )
    .unwrap();
    solver
        .solve(0.0, &DVector::zeros(2), &DVector::zeros(2))
        .unwrap();

    let n = solver.discretization().n_grids() - 1;
    assert_eq!(solver.discretization().grid(n).ty, GridType::Terminal);
    let terminal = solver.get_solution(n);
    assert_eq!(terminal.u.len(), 0);
    assert_eq!(terminal.a.len(), 0);
    assert_eq!(terminal.f.len(), 0);
}

#[test]
fn test_velocity_limit_is_respected() {
    // Aggressive tracking against a velocity ceiling: every iterate and the
    // final trajectory must respect the bound.
    let robot = PointMass::new(1);
    let cost = tracking_cost(1, 1.0, 100.0);
    let mut constraints = Constraints::new();
    constraints.push_back(
        "v_upper",
        Box::new(JointVelocityUpperLimit::new(DVector::from_element(1, 0.5))),
    );
    let settings = SolverSettings {
        max_iter: 100,
        kkt_tol: 1.0e-8,
        ..Default::default()
    };
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        constraints,
        1.0,
        10,
        settings,
    )
    .unwrap();

    let stats = solver
        .solve(0.0, &DVector::zeros(1), &DVector::zeros(1))
        .unwrap();

    for v in solver.get_solution_by_name("v").unwrap() {
        assert!(v[0] <= 0.5 + 1.0e-6, "velocity bound violated: {}", v[0]);
    }
    // Fraction-to-boundary keeps all primal steps in (0, 1].
    for &alpha in &stats.primal_step_sizes {
        assert!(alpha > 0.0 && alpha <= 1.0);
    }
    let first = stats.kkt_errors[0];
    let last = *stats.kkt_errors.last().unwrap();
    assert!(last < first * 1.0e-4, "no progress: {first} -> {last}");
    assert!(last < 1.0e-4);
}

#[test]
fn test_standing_point_foot_balances_with_contact_force() {
    // One active contact over the whole horizon: the eliminated contact
    // force carries the weight and stays strictly inside the friction cone.
    let robot = PointFoot::new();
    let mut status = ContactStatus::new(robot.contact_types());
    status.set_contact_active(0, true);
    status.set_placement(0, Vector3::zeros());
    let sequence = ContactSequence::new(status);

    let mut config = ConfigurationSpaceCost::new(3, 3);
    config.set_q_weight(DVector::from_element(3, 1.0));
    config.set_v_weight(DVector::from_element(3, 1.0));
    config.set_a_weight(DVector::from_element(3, 0.01));
    config.set_u_weight(DVector::from_element(3, 1.0));
    config.set_qf_weight(DVector::from_element(3, 1.0));
    config.set_vf_weight(DVector::from_element(3, 1.0));
    let mut force_cost = ContactForceCost::new(1);
    force_cost.set_f_ref(0, Vector3::new(0.0, 0.0, 9.81));
    force_cost.set_f_weight(0, Vector3::new(0.01, 0.01, 0.01));
    let mut cost = CostFunction::new();
    cost.push_back("config", Box::new(config));
    cost.push_back("contact_force", Box::new(force_cost));

    let mut constraints = Constraints::new();
    constraints.push_back("friction_cone", Box::new(FrictionCone::new()));

    let settings = SolverSettings {
        max_iter: 50,
        nthreads: 2,
        ..Default::default()
    };
    let mut solver =
        OcpSolver::new(robot, sequence, cost, constraints, 1.0, 10, settings).unwrap();
    solver
        .set_solution("f", &DVector::from_vec(vec![0.0, 0.0, 9.81]))
        .unwrap();

    let stats = solver
        .solve(0.0, &DVector::zeros(3), &DVector::zeros(3))
        .unwrap();

    let first = stats.kkt_errors[0];
    let last = *stats.kkt_errors.last().unwrap();
    assert!(last < first, "no progress: {first} -> {last}");
    assert!(last < 1.0e-4, "kkt error stalled at {last}");

    // Normal force stays positive on every stage grid.
    for (i, f) in solver.get_solution_by_name("f").unwrap().iter().enumerate() {
        let grid_ty = solver.discretization().grid(i).ty;
        if grid_ty != GridType::Terminal {
            assert!(f[2] > 0.0, "stage {i}: f_z = {}", f[2]);
        }
    }
}

#[test]
fn test_touchdown_schedule_runs_through_hybrid_chain() {
    // Falling point foot with an impulse at t = 0.5: exercises impulse
    // dynamics, the switching constraint and variable-dimension stages.
    let robot = PointFoot::new();
    let flight = ContactStatus::new(robot.contact_types());
    let mut stance = ContactStatus::new(robot.contact_types());
    stance.set_contact_active(0, true);
    stance.set_placement(0, Vector3::zeros());
    let mut sequence = ContactSequence::new(flight);
    sequence.push_back(stance, 0.5).unwrap();

    let mut config = ConfigurationSpaceCost::new(3, 3);
    config.set_q_weight(DVector::from_element(3, 1.0));
    config.set_v_weight(DVector::from_element(3, 0.1));
    config.set_a_weight(DVector::from_element(3, 0.01));
    config.set_u_weight(DVector::from_element(3, 0.1));
    config.set_dvi_weight(DVector::from_element(3, 0.1));
    let mut cost = CostFunction::new();
    cost.push_back("config", Box::new(config));

    let settings = SolverSettings {
        max_iter: 5,
        ..Default::default()
    };
    let mut solver = OcpSolver::new(
        robot,
        sequence,
        cost,
        Constraints::new(),
        1.0,
        10,
        settings,
    )
    .unwrap();

    let q0 = DVector::from_vec(vec![0.0, 0.0, 0.3]);
    let v0 = DVector::zeros(3);
    let stats = solver.solve(0.0, &q0, &v0).unwrap();

    // The grid sequence contains exactly one impulse grid at t = 0.5, and
    // the switching constraint is armed two grids before it.
    let disc = solver.discretization();
    let impulse_grids: Vec<_> = disc
        .grids()
        .iter()
        .filter(|g| g.ty == GridType::Impulse)
        .collect();
    assert_eq!(impulse_grids.len(), 1);
    let g = impulse_grids[0].index;
    assert!((impulse_grids[0].t - 0.5).abs() < 1.0e-12);
    assert!(disc.grid(g - 2).switching_constraint);

    // Impulse grid carries a 3D impulse force, flight grids carry none.
    assert_eq!(solver.get_solution(g).f.len(), 3);
    assert_eq!(solver.get_solution(0).f.len(), 0);
    assert_eq!(solver.get_solution(g + 1).f.len(), 3);

    // Anytime contract: every recorded iterate is finite.
    assert!(stats.iterations >= 1);
    for &err in &stats.kkt_errors {
        assert!(err.is_finite());
    }
    for &alpha in &stats.primal_step_sizes {
        assert!(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0);
    }
}

#[test]
fn test_feedback_gains_have_stage_shapes() {
    let robot = PointMass::new(2);
    let cost = tracking_cost(2, 0.5, 10.0);
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        Constraints::new(),
        1.0,
        10,
        SolverSettings::default(),
    )
    .unwrap();
    solver
        .solve(0.0, &DVector::zeros(2), &DVector::zeros(2))
        .unwrap();

    // The stage feedback gain maps Δx (dim 4) to Δu (dim 2).
    let k = solver.state_feedback_gain(0);
    assert_eq!(k.nrows(), 2);
    assert_eq!(k.ncols(), 4);
    // A stabilizing gain cannot be identically zero.
    assert!(k.iter().any(|&e| e.abs() > 1.0e-12));
}

#[test]
fn test_invalid_configuration_is_rejected_eagerly() {
    let robot = PointMass::new(1);
    let cost = tracking_cost(1, 0.0, 1.0);

    // Non-positive horizon.
    assert!(OcpSolver::new(
        robot.clone(),
        contact_free_sequence(),
        cost,
        Constraints::new(),
        0.0,
        10,
        SolverSettings::default(),
    )
    .is_err());

    // Zero worker count.
    let cost = tracking_cost(1, 0.0, 1.0);
    let settings = SolverSettings {
        nthreads: 0,
        ..Default::default()
    };
    assert!(OcpSolver::new(
        robot.clone(),
        contact_free_sequence(),
        cost,
        Constraints::new(),
        1.0,
        10,
        settings,
    )
    .is_err());

    // Mismatched state dimension at the call boundary.
    let cost = tracking_cost(1, 0.0, 1.0);
    let mut solver = OcpSolver::new(
        robot,
        contact_free_sequence(),
        cost,
        Constraints::new(),
        1.0,
        10,
        SolverSettings::default(),
    )
    .unwrap();
    assert!(solver
        .solve(0.0, &DVector::zeros(2), &DVector::zeros(1))
        .is_err());
}

#[test]
fn test_multithreaded_eval_matches_single_thread() {
    // Two solvers differing only in worker count must produce identical
    // iterates: the per-grid evaluation is embarrassingly parallel.
    let make = |nthreads: usize| {
        let robot = PointMass::new(2);
        let cost = tracking_cost(2, 1.0, 100.0);
        let settings = SolverSettings {
            nthreads,
            max_iter: 3,
            ..Default::default()
        };
        OcpSolver::new(
            robot,
            contact_free_sequence(),
            cost,
            Constraints::new(),
            1.0,
            20,
            settings,
        )
        .unwrap()
    };
    let q0 = DVector::from_vec(vec![0.2, -0.1]);
    let v0 = DVector::from_vec(vec![0.0, 0.1]);

    let mut single = make(1);
    let mut multi = make(4);
    let stats_single = single.solve(0.0, &q0, &v0).unwrap();
    let stats_multi = multi.solve(0.0, &q0, &v0).unwrap();

    assert_eq!(stats_single.iterations, stats_multi.iterations);
    for i in 0..single.discretization().n_grids() {
        let (a, b) = (single.get_solution(i), multi.get_solution(i));
        for k in 0..a.q.len() {
            assert!((a.q[k] - b.q[k]).abs() < 1.0e-12);
        }
        for k in 0..a.v.len() {
            assert!((a.v[k] - b.v[k]).abs() < 1.0e-12);
        }
    }
}
