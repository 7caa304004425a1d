//! Quadratic cost on local contact forces.

use nalgebra::Vector3;

use crate::contact::ContactStatus;
use crate::cost::CostTerm;
use crate::discretization::{Grid, GridType};
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::SplitSolution;

/// Tracks a reference force per contact on the first three components of the
/// stacked force segment:
///
/// ```text
/// dt/2 · Σ_active |f_c − f_ref_c|²_Wc
/// ```
///
/// Only active contacts contribute; the cost follows the grid's contact
/// phase. Impulse grids are not penalized by this term.
#[derive(Debug, Clone)]
pub struct ContactForceCost {
    f_ref: Vec<Vector3<f64>>,
    f_weight: Vec<Vector3<f64>>,
}

impl ContactForceCost {
    /// Zero-weight cost for `num_contacts` contact candidates.
    pub fn new(num_contacts: usize) -> Self {
        Self {
            f_ref: vec![Vector3::zeros(); num_contacts],
            f_weight: vec![Vector3::zeros(); num_contacts],
        }
    }

    pub fn set_f_ref(&mut self, contact: usize, f_ref: Vector3<f64>) {
        self.f_ref[contact] = f_ref;
    }

    pub fn set_f_weight(&mut self, contact: usize, weight: Vector3<f64>) {
        self.f_weight[contact] = weight;
    }
}

impl CostTerm for ContactForceCost {
    fn eval_stage_cost(&self, status: &ContactStatus, grid: &Grid, s: &SplitSolution) -> f64 {
        if grid.ty == GridType::Impulse {
            return 0.0;
        }
        let mut cost = 0.0;
        for c in 0..status.num_contacts().min(self.f_ref.len()) {
            if let Some((off, _)) = status.force_segment(c) {
                for k in 0..3 {
                    let e = s.f[off + k] - self.f_ref[c][k];
                    cost += self.f_weight[c][k] * e * e;
                }
            }
        }
        0.5 * grid.dt * cost
    }

    fn quadratize_stage_cost(
        &self,
        status: &ContactStatus,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64 {
        if grid.ty == GridType::Impulse {
            return 0.0;
        }
        let dt = grid.dt;
        for c in 0..status.num_contacts().min(self.f_ref.len()) {
            if let Some((off, _)) = status.force_segment(c) {
                for k in 0..3 {
                    let e = s.f[off + k] - self.f_ref[c][k];
                    res.lf[off + k] += dt * self.f_weight[c][k] * e;
                    mat.qff[(off + k, off + k)] += dt * self.f_weight[c][k];
                }
            }
        }
        self.eval_stage_cost(status, grid, s)
    }

    fn eval_terminal_cost(&self, _grid: &Grid, _s: &SplitSolution) -> f64 {
        0.0
    }

    fn quadratize_terminal_cost(
        &self,
        _grid: &Grid,
        _s: &SplitSolution,
        _res: &mut SplitKktResidual,
        _mat: &mut SplitKktMatrix,
    ) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;
    use crate::kkt::StageDims;
    use nalgebra::DVector;

    #[test]
    fn test_force_cost_active_contacts_only() {
        let mut status = ContactStatus::new(vec![ContactType::Point; 2]);
        status.set_contact_active(1, true);
        let mut cost = ContactForceCost::new(2);
        cost.set_f_weight(0, Vector3::new(1.0, 1.0, 1.0));
        cost.set_f_weight(1, Vector3::new(1.0, 1.0, 1.0));
        cost.set_f_ref(1, Vector3::new(0.0, 0.0, 10.0));

        let dims = StageDims {
            dimv: 3,
            dimx: 6,
            dima: 3,
            dimf: 3,
            dimu: 3,
            dims: 0,
        };
        let mut s = SplitSolution::new(3, dims);
        s.f = DVector::from_vec(vec![0.0, 0.0, 8.0]);
        let grid = Grid::new(0, GridType::Intermediate, 0.0, 0.1, 0);
        let c = cost.eval_stage_cost(&status, &grid, &s);
        // Only contact 1 is active: 0.5 * 0.1 * (8 − 10)².
        assert!((c - 0.5 * 0.1 * 4.0).abs() < 1.0e-14);

        let mut res = SplitKktResidual::new(dims);
        let mut mat = SplitKktMatrix::new(dims);
        cost.quadratize_stage_cost(&status, &grid, &s, &mut res, &mut mat);
        assert!((res.lf[2] - 0.1 * (-2.0)).abs() < 1.0e-14);
        assert!((mat.qff[(2, 2)] - 0.1).abs() < 1.0e-14);
    }
}
