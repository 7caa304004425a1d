//! Minimal end-to-end example: stabilize a 2-DoF point mass at a target
//! configuration and print the per-iteration convergence table.
//!
//! Run with: cargo run --example point_mass_mpc

use nalgebra::DVector;
use nmpc_core::{
    ConfigurationSpaceCost, Constraints, ContactSequence, ContactStatus, CostFunction,
    JointVelocityUpperLimit, OcpSolver, PointMass, SolverSettings,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let robot = PointMass::new(2);
    let contact_sequence = ContactSequence::new(ContactStatus::new(vec![]));

    let mut config = ConfigurationSpaceCost::new(2, 2);
    config.set_q_ref(DVector::from_vec(vec![1.0, -0.5]));
    config.set_q_weight(DVector::from_element(2, 10.0));
    config.set_v_weight(DVector::from_element(2, 1.0));
    config.set_a_weight(DVector::from_element(2, 0.01));
    config.set_qf_weight(DVector::from_element(2, 100.0));
    config.set_vf_weight(DVector::from_element(2, 100.0));
    let mut cost = CostFunction::new();
    cost.push_back("config", Box::new(config));

    let mut constraints = Constraints::new();
    constraints.push_back(
        "v_upper",
        Box::new(JointVelocityUpperLimit::new(DVector::from_element(2, 2.0))),
    );

    let settings = SolverSettings {
        max_iter: 50,
        verbose: true,
        nthreads: 2,
        ..Default::default()
    };
    let mut solver = OcpSolver::new(
        robot,
        contact_sequence,
        cost,
        constraints,
        1.0,
        20,
        settings,
    )?;

    let q0 = DVector::zeros(2);
    let v0 = DVector::zeros(2);
    let stats = solver.solve(0.0, &q0, &v0)?;

    println!("converged: {}", stats.convergence);
    println!("iterations: {}", stats.iterations);
    println!("final squared KKT error: {:.3e}", solver.kkt_error());
    println!("cost: {:.6}", solver.cost());
    let n = solver.discretization().n_grids() - 1;
    let terminal = solver.get_solution(n);
    println!("terminal q: {:?}", terminal.q.as_slice());
    println!("terminal v: {:?}", terminal.v.as_slice());
    Ok(())
}
