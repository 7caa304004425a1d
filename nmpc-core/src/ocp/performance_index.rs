//! Scalar performance metrics accumulated over the horizon.

use std::ops::AddAssign;

/// Cost and feasibility metrics of one Newton iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceIndex {
    /// Total cost.
    pub cost: f64,
    /// Total barrier cost of the interior-point slacks.
    pub cost_barrier: f64,
    /// L1 norm of the primal feasibility residuals (dynamics, contact
    /// constraints, inequality primal residuals).
    pub primal_feasibility: f64,
    /// L1 norm of the stationarity residuals.
    pub dual_feasibility: f64,
    /// Squared Euclidean norm of the full KKT residual.
    pub kkt_error: f64,
}

impl AddAssign for PerformanceIndex {
    fn add_assign(&mut self, rhs: Self) {
        self.cost += rhs.cost;
        self.cost_barrier += rhs.cost_barrier;
        self.primal_feasibility += rhs.primal_feasibility;
        self.dual_feasibility += rhs.dual_feasibility;
        self.kkt_error += rhs.kkt_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulation() {
        let mut total = PerformanceIndex::default();
        total += PerformanceIndex {
            cost: 1.0,
            cost_barrier: 0.1,
            primal_feasibility: 2.0,
            dual_feasibility: 3.0,
            kkt_error: 4.0,
        };
        total += PerformanceIndex {
            cost: 1.0,
            ..Default::default()
        };
        assert!((total.cost - 2.0).abs() < 1.0e-14);
        assert!((total.kkt_error - 4.0).abs() < 1.0e-14);
    }
}
