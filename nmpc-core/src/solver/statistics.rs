//! Per-solve statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Diagnostics of one `solve()` call.
///
/// Created fresh at each call and returned to the caller; the solver keeps
/// no statistics state across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverStatistics {
    /// Whether the squared KKT error dropped below the tolerance.
    pub convergence: bool,
    /// Newton iterations performed.
    pub iterations: usize,
    /// Squared KKT error at the start of each iteration.
    pub kkt_errors: Vec<f64>,
    /// Primal step size applied at each iteration.
    pub primal_step_sizes: Vec<f64>,
    /// Dual step size applied at each iteration.
    pub dual_step_sizes: Vec<f64>,
    /// Mesh refinements triggered during the solve.
    pub mesh_refinements: usize,
    /// Riccati regularization bumps applied during the solve.
    pub regularization_bumps: u64,
    /// Wall-clock duration of the solve.
    pub solve_time: Option<Duration>,
}

impl SolverStatistics {
    pub(crate) fn record_iteration(&mut self, kkt_error: f64, primal: f64, dual: f64) {
        self.iterations += 1;
        self.kkt_errors.push(kkt_error);
        self.primal_step_sizes.push(primal);
        self.dual_step_sizes.push(dual);
    }
}
