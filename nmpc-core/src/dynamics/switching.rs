//! Pre-impulse switching constraint.
//!
//! On the grid two steps before an impulse, the contact points gaining
//! activation must land on their planned placements at the impulse instant.
//! The constrained configuration is predicted from the stage variables over
//! the two intervening intervals:
//!
//! ```text
//! q_s = q ⊕ ( (dt₁ + dt₂)·v + dt₁·dt₂·a )
//! φ_c = p_c(q_s) − p_ref_c = 0        for each newly active contact c
//! ```
//!
//! Gauss-Newton rows: `Φ_q = P_J`, `Φ_v = (dt₁+dt₂) P_J`,
//! `Φ_a = dt₁·dt₂ P_J` with `P_J` the stacked contact-position Jacobian at
//! the predicted configuration. The acceleration rows couple to the torque
//! block through the contact-dynamics condensation, which makes the
//! bordered Riccati elimination well posed.

use nalgebra::{DMatrix, DVector};

use crate::contact::ContactStatus;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::SplitSolution;
use crate::robot::RobotModel;

/// Evaluated switching-constraint quantities of one flagged grid.
#[derive(Debug, Clone)]
pub struct SwitchingConstraintData {
    /// Stacked position Jacobian rows w.r.t. the acceleration, i.e.
    /// `dt₁·dt₂ P_J`.
    pub phia: DMatrix<f64>,
    q_pred: DVector<f64>,
    dq_pred: DVector<f64>,
}

impl SwitchingConstraintData {
    pub fn new(dimq: usize, dimv: usize, dims: usize) -> Self {
        Self {
            phia: DMatrix::zeros(dims, dimv),
            q_pred: DVector::zeros(dimq),
            dq_pred: DVector::zeros(dimv),
        }
    }

    /// Evaluate the constraint and fill the raw rows `phix`/`phi`, the
    /// acceleration rows `phia`, and the multiplier terms of the
    /// stationarity residuals.
    pub fn eval<R: RobotModel>(
        &mut self,
        model: &mut R,
        impulse_status: &ContactStatus,
        dt1: f64,
        dt2: f64,
        s: &SplitSolution,
        mat: &mut SplitKktMatrix,
        res: &mut SplitKktResidual,
    ) {
        let dimv = s.v.len();
        let n_rows = mat.phix.nrows();
        debug_assert_eq!(n_rows, 3 * impulse_status.num_active_contacts());

        // Predicted configuration at the impulse instant.
        self.dq_pred.copy_from(&s.v);
        self.dq_pred *= dt1 + dt2;
        self.dq_pred.axpy(dt1 * dt2, &s.a, 1.0);
        model.integrate_config(&s.q, &self.dq_pred, 1.0, &mut self.q_pred);
        model.update_kinematics(&self.q_pred, &s.v);

        let mut pj = DMatrix::zeros(3, dimv);
        let mut row = 0;
        for c in 0..impulse_status.num_contacts() {
            if !impulse_status.is_contact_active(c) {
                continue;
            }
            let p = model.contact_position(c);
            let p_ref = impulse_status.placement(c);
            model.contact_position_jacobian(c, &mut pj);
            for k in 0..3 {
                res.phi[row + k] = p[k] - p_ref[k];
                for col in 0..dimv {
                    mat.phix[(row + k, col)] = pj[(k, col)];
                    mat.phix[(row + k, dimv + col)] = (dt1 + dt2) * pj[(k, col)];
                    self.phia[(row + k, col)] = dt1 * dt2 * pj[(k, col)];
                }
            }
            row += 3;
        }

        // Multiplier terms: lq += Φ_qᵀ ξ, lv += Φ_vᵀ ξ, la += Φ_aᵀ ξ.
        res.lx.gemv_tr(1.0, &mat.phix, &s.xi, 1.0);
        res.la.gemv_tr(1.0, &self.phia, &s.xi, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;
    use crate::kkt::StageDims;
    use crate::robot::PointFoot;
    use nalgebra::Vector3;

    #[test]
    fn test_switching_residual_and_rows() {
        let mut model = PointFoot::new();
        let mut impulse_status = ContactStatus::new(vec![ContactType::Point]);
        impulse_status.set_contact_active(0, true);
        impulse_status.set_placement(0, Vector3::new(0.5, 0.0, 0.0));

        let dims = StageDims {
            dimv: 3,
            dimx: 6,
            dima: 3,
            dimf: 0,
            dimu: 3,
            dims: 3,
        };
        let mut s = SplitSolution::new(3, dims);
        s.q = DVector::from_vec(vec![0.4, 0.0, 0.0]);
        s.v = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let (dt1, dt2) = (0.05, 0.05);

        let mut data = SwitchingConstraintData::new(3, 3, 3);
        let mut mat = SplitKktMatrix::new(dims);
        let mut res = SplitKktResidual::new(dims);
        data.eval(&mut model, &impulse_status, dt1, dt2, &s, &mut mat, &mut res);

        // q_pred_x = 0.4 + 0.1·1.0 = 0.5: on the placement.
        assert!(res.phi[0].abs() < 1.0e-12);
        // Velocity rows scale with dt₁ + dt₂, acceleration with dt₁·dt₂.
        assert!((mat.phix[(0, 0)] - 1.0).abs() < 1.0e-12);
        assert!((mat.phix[(0, 3)] - 0.1).abs() < 1.0e-12);
        assert!((data.phia[(0, 0)] - 0.0025).abs() < 1.0e-12);
    }
}
