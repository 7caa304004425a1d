//! Friction-cone constraints on contact forces.
//!
//! Per active contact, two rows in canonical `g ≤ 0` form:
//!
//! ```text
//! g₀ = −f_z                          (normal force positivity)
//! g₁ = f_x² + f_y² − μ² f_z²         (quadratic friction cone)
//! ```
//!
//! Surface contacts apply the cone to the linear part of the wrench. The
//! impulse variant imposes the same rows on the impulse forces of impulse
//! grids.

use crate::constraints::data::{ConstraintComponentData, MIN_SLACK};
use crate::constraints::traits::ConstraintComponent;
use crate::contact::ContactStatus;
use crate::discretization::GridType;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::{SplitDirection, SplitSolution};

/// Friction cone on the stage contact forces.
#[derive(Debug, Clone, Default)]
pub struct FrictionCone;

/// Friction cone on the impulse forces of impulse grids.
#[derive(Debug, Clone, Default)]
pub struct ImpulseFrictionCone;

impl FrictionCone {
    pub fn new() -> Self {
        Self
    }
}

impl ImpulseFrictionCone {
    pub fn new() -> Self {
        Self
    }
}

/// Iterate `(row_base, segment_offset, friction_coefficient)` over active
/// contacts.
fn active_segments(status: &ContactStatus) -> Vec<(usize, usize, f64)> {
    let mut out = Vec::new();
    let mut rank = 0;
    for c in 0..status.num_contacts() {
        if let Some((off, _)) = status.force_segment(c) {
            out.push((2 * rank, off, status.friction_coefficient(c)));
            rank += 1;
        }
    }
    out
}

fn eval_g(f: &nalgebra::DVector<f64>, row: usize, off: usize, mu: f64) -> f64 {
    let (fx, fy, fz) = (f[off], f[off + 1], f[off + 2]);
    if row % 2 == 0 {
        -fz
    } else {
        fx * fx + fy * fy - mu * mu * fz * fz
    }
}

fn dimc_impl(status: &ContactStatus) -> usize {
    2 * status.num_active_contacts()
}

fn is_feasible_impl(status: &ContactStatus, s: &SplitSolution) -> bool {
    active_segments(status).iter().all(|&(base, off, mu)| {
        eval_g(&s.f, base, off, mu) < 0.0 && eval_g(&s.f, base + 1, off, mu) < 0.0
    })
}

fn set_slack_and_dual_impl(
    status: &ContactStatus,
    data: &mut ConstraintComponentData,
    s: &SplitSolution,
    barrier: f64,
) {
    for &(base, off, mu) in &active_segments(status) {
        for k in 0..2 {
            let g = eval_g(&s.f, base + k, off, mu);
            data.slack[base + k] = (-g).max(MIN_SLACK);
            data.dual[base + k] = barrier / data.slack[base + k];
        }
    }
}

fn eval_constraint_impl(
    status: &ContactStatus,
    data: &mut ConstraintComponentData,
    s: &SplitSolution,
    barrier: f64,
) {
    for &(base, off, mu) in &active_segments(status) {
        for k in 0..2 {
            let g = eval_g(&s.f, base + k, off, mu);
            data.residual[base + k] = g + data.slack[base + k];
            data.cmpl[base + k] = data.slack[base + k] * data.dual[base + k] - barrier;
        }
    }
}

/// Jacobian rows of the two cone constraints w.r.t. `(f_x, f_y, f_z)`.
fn jacobian_rows(f: &nalgebra::DVector<f64>, off: usize, mu: f64) -> [[f64; 3]; 2] {
    let (fx, fy, fz) = (f[off], f[off + 1], f[off + 2]);
    [
        [0.0, 0.0, -1.0],
        [2.0 * fx, 2.0 * fy, -2.0 * mu * mu * fz],
    ]
}

fn linearize_impl(
    status: &ContactStatus,
    data: &ConstraintComponentData,
    s: &SplitSolution,
    res: &mut SplitKktResidual,
) {
    for &(base, off, mu) in &active_segments(status) {
        let jac = jacobian_rows(&s.f, off, mu);
        for (k, row) in jac.iter().enumerate() {
            let z = data.dual[base + k];
            for (j, &jj) in row.iter().enumerate() {
                res.lf[off + j] += jj * z;
            }
        }
    }
}

fn condense_impl(
    status: &ContactStatus,
    data: &ConstraintComponentData,
    s: &SplitSolution,
    mat: &mut SplitKktMatrix,
    res: &mut SplitKktResidual,
) {
    for &(base, off, mu) in &active_segments(status) {
        let jac = jacobian_rows(&s.f, off, mu);
        for (k, row) in jac.iter().enumerate() {
            let i = base + k;
            let w = data.dual[i] / data.slack[i];
            let grad = (data.dual[i] * data.residual[i] - data.cmpl[i]) / data.slack[i];
            for (a, &ja) in row.iter().enumerate() {
                res.lf[off + a] += ja * grad;
                for (b, &jb) in row.iter().enumerate() {
                    mat.qff[(off + a, off + b)] += w * ja * jb;
                }
            }
        }
    }
}

fn expand_impl(
    status: &ContactStatus,
    data: &mut ConstraintComponentData,
    s: &SplitSolution,
    d: &SplitDirection,
) {
    for &(base, off, mu) in &active_segments(status) {
        let jac = jacobian_rows(&s.f, off, mu);
        for (k, row) in jac.iter().enumerate() {
            let i = base + k;
            let jdf: f64 = row
                .iter()
                .enumerate()
                .map(|(j, &jj)| jj * d.df[off + j])
                .sum();
            data.dslack[i] = -data.residual[i] - jdf;
        }
    }
}

fn violation_impl(status: &ContactStatus, s: &SplitSolution) -> f64 {
    active_segments(status)
        .iter()
        .map(|&(base, off, mu)| {
            eval_g(&s.f, base, off, mu).max(0.0)
                + eval_g(&s.f, base + 1, off, mu).max(0.0)
        })
        .sum()
}

macro_rules! cone_component {
    ($name:ident, $($ty:pat_param)|+) => {
        impl ConstraintComponent for $name {
            fn dimc(&self, status: &ContactStatus) -> usize {
                dimc_impl(status)
            }

            fn applies_to(&self, ty: GridType) -> bool {
                matches!(ty, $($ty)|+)
            }

            fn is_feasible(&self, status: &ContactStatus, s: &SplitSolution) -> bool {
                is_feasible_impl(status, s)
            }

            fn set_slack_and_dual(
                &self,
                status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                barrier: f64,
            ) {
                set_slack_and_dual_impl(status, data, s, barrier);
            }

            fn eval_constraint(
                &self,
                status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                barrier: f64,
            ) {
                eval_constraint_impl(status, data, s, barrier);
            }

            fn linearize_constraints(
                &self,
                status: &ContactStatus,
                data: &ConstraintComponentData,
                s: &SplitSolution,
                res: &mut SplitKktResidual,
            ) {
                linearize_impl(status, data, s, res);
            }

            fn condense_slack_and_dual(
                &self,
                status: &ContactStatus,
                data: &ConstraintComponentData,
                s: &SplitSolution,
                mat: &mut SplitKktMatrix,
                res: &mut SplitKktResidual,
            ) {
                condense_impl(status, data, s, mat, res);
            }

            fn expand_slack_and_dual(
                &self,
                status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                d: &SplitDirection,
            ) {
                expand_impl(status, data, s, d);
            }

            fn violation_l1(&self, status: &ContactStatus, s: &SplitSolution) -> f64 {
                violation_impl(status, s)
            }
        }
    };
}

cone_component!(FrictionCone, GridType::Intermediate | GridType::Lift);
cone_component!(ImpulseFrictionCone, GridType::Impulse);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;
    use crate::kkt::StageDims;
    use nalgebra::DVector;

    fn one_contact_status() -> ContactStatus {
        let mut status = ContactStatus::new(vec![ContactType::Point]);
        status.set_contact_active(0, true);
        status.set_friction_coefficient(0, 0.5);
        status
    }

    fn dims() -> StageDims {
        StageDims {
            dimv: 3,
            dimx: 6,
            dima: 3,
            dimf: 3,
            dimu: 3,
            dims: 0,
        }
    }

    #[test]
    fn test_cone_feasibility() {
        let cone = FrictionCone::new();
        let status = one_contact_status();
        let mut s = SplitSolution::new(3, dims());
        // Inside the cone: |f_t| < μ f_z.
        s.f = DVector::from_vec(vec![0.1, 0.1, 1.0]);
        assert!(cone.is_feasible(&status, &s));
        // Outside: tangential force too large.
        s.f = DVector::from_vec(vec![1.0, 0.0, 1.0]);
        assert!(!cone.is_feasible(&status, &s));
        // Negative normal force.
        s.f = DVector::from_vec(vec![0.0, 0.0, -1.0]);
        assert!(!cone.is_feasible(&status, &s));
    }

    #[test]
    fn test_cone_slack_initialization_positive() {
        let cone = FrictionCone::new();
        let status = one_contact_status();
        let mut s = SplitSolution::new(3, dims());
        s.f = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        let mut data = ConstraintComponentData::new(cone.dimc(&status));
        cone.set_slack_and_dual(&status, &mut data, &s, 1.0e-3);
        for i in 0..data.dimc() {
            assert!(data.slack[i] > 0.0);
            assert!(data.dual[i] > 0.0);
        }
    }

    #[test]
    fn test_cone_condensation_fills_force_hessian() {
        let cone = FrictionCone::new();
        let status = one_contact_status();
        let mut s = SplitSolution::new(3, dims());
        s.f = DVector::from_vec(vec![0.05, 0.0, 1.0]);
        let mut data = ConstraintComponentData::new(cone.dimc(&status));
        cone.set_slack_and_dual(&status, &mut data, &s, 1.0e-3);
        cone.eval_constraint(&status, &mut data, &s, 1.0e-3);
        let mut mat = SplitKktMatrix::new(dims());
        let mut res = SplitKktResidual::new(dims());
        cone.condense_slack_and_dual(&status, &data, &s, &mut mat, &mut res);
        // The z-z entry receives both the positivity and the cone row.
        assert!(mat.qff[(2, 2)] > 0.0);
        // Symmetry of the condensed block.
        for a in 0..3 {
            for b in 0..3 {
                assert!((mat.qff[(a, b)] - mat.qff[(b, a)]).abs() < 1.0e-12);
            }
        }
    }

    #[test]
    fn test_impulse_variant_gating() {
        let cone = ImpulseFrictionCone::new();
        assert!(cone.applies_to(GridType::Impulse));
        assert!(!cone.applies_to(GridType::Intermediate));
        let stage_cone = FrictionCone::new();
        assert!(!stage_cone.applies_to(GridType::Impulse));
        assert!(stage_cone.applies_to(GridType::Lift));
    }
}
