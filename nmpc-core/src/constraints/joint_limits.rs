//! Joint-space box limits: position, velocity, and torque bounds.
//!
//! All six variants are thin wrappers around one elementwise box-limit
//! kernel. The Jacobian of a box limit is a signed identity on its target
//! block, so the condensation reduces to diagonal updates.

use nalgebra::DVector;

use crate::constraints::data::ConstraintComponentData;
use crate::constraints::traits::ConstraintComponent;
use crate::contact::ContactStatus;
use crate::discretization::GridType;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::{SplitDirection, SplitSolution};

/// Primal block a box limit acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Config,
    Velocity,
    Torques,
}

/// Elementwise bound `x ≥ bound` (lower) or `x ≤ bound` (upper) on one
/// primal block, in the canonical form `g(x) ≤ 0`.
#[derive(Debug, Clone)]
struct BoxLimit {
    bound: DVector<f64>,
    /// `+1` for upper bounds (`g = x − bound`), `−1` for lower bounds
    /// (`g = bound − x`).
    sign: f64,
    block: Block,
}

impl BoxLimit {
    fn new(bound: DVector<f64>, upper: bool, block: Block) -> Self {
        Self {
            bound,
            sign: if upper { 1.0 } else { -1.0 },
            block,
        }
    }

    fn dimc(&self) -> usize {
        self.bound.len()
    }

    fn value<'a>(&self, s: &'a SplitSolution) -> &'a DVector<f64> {
        match self.block {
            Block::Config => &s.q,
            Block::Velocity => &s.v,
            Block::Torques => &s.u,
        }
    }

    fn g(&self, s: &SplitSolution, i: usize) -> f64 {
        self.sign * (self.value(s)[i] - self.bound[i])
    }

    fn grad_index(&self, s: &SplitSolution, i: usize) -> (bool, usize) {
        // (targets lu, row index)
        match self.block {
            Block::Config => (false, i),
            Block::Velocity => (false, s.v.len() + i),
            Block::Torques => (true, i),
        }
    }

    fn direction_component(&self, s: &SplitSolution, d: &SplitDirection, i: usize) -> f64 {
        match self.block {
            Block::Config => d.dx[i],
            Block::Velocity => d.dx[s.v.len() + i],
            Block::Torques => d.du[i],
        }
    }
}

macro_rules! box_limit_component {
    ($(#[$doc:meta])* $name:ident, $upper:expr, $block:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: BoxLimit,
        }

        impl $name {
            /// Create the limit from its bound vector (length `dimv`).
            pub fn new(bound: DVector<f64>) -> Self {
                Self {
                    inner: BoxLimit::new(bound, $upper, $block),
                }
            }
        }

        impl ConstraintComponent for $name {
            fn dimc(&self, _status: &ContactStatus) -> usize {
                self.inner.dimc()
            }

            fn applies_to(&self, ty: GridType) -> bool {
                matches!(ty, GridType::Intermediate | GridType::Lift)
            }

            fn is_feasible(&self, _status: &ContactStatus, s: &SplitSolution) -> bool {
                (0..self.inner.dimc()).all(|i| self.inner.g(s, i) < 0.0)
            }

            fn set_slack_and_dual(
                &self,
                _status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                barrier: f64,
            ) {
                for i in 0..self.inner.dimc() {
                    let g = self.inner.g(s, i);
                    data.slack[i] = (-g).max(crate::constraints::data::MIN_SLACK);
                    data.dual[i] = barrier / data.slack[i];
                }
            }

            fn eval_constraint(
                &self,
                _status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                barrier: f64,
            ) {
                for i in 0..self.inner.dimc() {
                    data.residual[i] = self.inner.g(s, i) + data.slack[i];
                    data.cmpl[i] = data.slack[i] * data.dual[i] - barrier;
                }
            }

            fn linearize_constraints(
                &self,
                _status: &ContactStatus,
                data: &ConstraintComponentData,
                s: &SplitSolution,
                res: &mut SplitKktResidual,
            ) {
                for i in 0..self.inner.dimc() {
                    let (is_lu, row) = self.inner.grad_index(s, i);
                    let contrib = self.inner.sign * data.dual[i];
                    if is_lu {
                        res.lu[row] += contrib;
                    } else {
                        res.lx[row] += contrib;
                    }
                }
            }

            fn condense_slack_and_dual(
                &self,
                _status: &ContactStatus,
                data: &ConstraintComponentData,
                s: &SplitSolution,
                mat: &mut SplitKktMatrix,
                res: &mut SplitKktResidual,
            ) {
                for i in 0..self.inner.dimc() {
                    let (is_lu, row) = self.inner.grad_index(s, i);
                    let w = data.dual[i] / data.slack[i];
                    let grad = self.inner.sign
                        * (data.dual[i] * data.residual[i] - data.cmpl[i])
                        / data.slack[i];
                    if is_lu {
                        mat.quu[(row, row)] += w;
                        res.lu[row] += grad;
                    } else {
                        mat.qxx[(row, row)] += w;
                        res.lx[row] += grad;
                    }
                }
            }

            fn expand_slack_and_dual(
                &self,
                _status: &ContactStatus,
                data: &mut ConstraintComponentData,
                s: &SplitSolution,
                d: &SplitDirection,
            ) {
                for i in 0..self.inner.dimc() {
                    let dxi = self.inner.direction_component(s, d, i);
                    data.dslack[i] = -data.residual[i] - self.inner.sign * dxi;
                }
            }

            fn violation_l1(&self, _status: &ContactStatus, s: &SplitSolution) -> f64 {
                (0..self.inner.dimc())
                    .map(|i| self.inner.g(s, i).max(0.0))
                    .sum()
            }
        }
    };
}

box_limit_component!(
    /// `q ≥ q_min`.
    JointPositionLowerLimit,
    false,
    Block::Config
);
box_limit_component!(
    /// `q ≤ q_max`.
    JointPositionUpperLimit,
    true,
    Block::Config
);
box_limit_component!(
    /// `v ≥ v_min`.
    JointVelocityLowerLimit,
    false,
    Block::Velocity
);
box_limit_component!(
    /// `v ≤ v_max`.
    JointVelocityUpperLimit,
    true,
    Block::Velocity
);
box_limit_component!(
    /// `u ≥ u_min`.
    JointTorquesLowerLimit,
    false,
    Block::Torques
);
box_limit_component!(
    /// `u ≤ u_max`.
    JointTorquesUpperLimit,
    true,
    Block::Torques
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;
    use crate::kkt::StageDims;

    fn dims() -> StageDims {
        StageDims {
            dimv: 2,
            dimx: 4,
            dima: 2,
            dimf: 0,
            dimu: 2,
            dims: 0,
        }
    }

    fn status() -> ContactStatus {
        ContactStatus::new(vec![ContactType::Point; 0])
    }

    #[test]
    fn test_velocity_lower_limit_feasibility() {
        let limit = JointVelocityLowerLimit::new(DVector::from_vec(vec![-1.0, -1.0]));
        let mut s = SplitSolution::new(2, dims());
        s.v[0] = 0.0;
        s.v[1] = -0.5;
        assert!(limit.is_feasible(&status(), &s));
        s.v[1] = -1.5;
        assert!(!limit.is_feasible(&status(), &s));
    }

    #[test]
    fn test_slack_dual_positive_after_init() {
        let limit = JointPositionUpperLimit::new(DVector::from_vec(vec![1.0, 1.0]));
        let mut s = SplitSolution::new(2, dims());
        s.q[0] = 0.5;
        s.q[1] = 2.0; // infeasible component
        let mut data = ConstraintComponentData::new(2);
        limit.set_slack_and_dual(&status(), &mut data, &s, 1.0e-3);
        for i in 0..2 {
            assert!(data.slack[i] > 0.0);
            assert!(data.dual[i] > 0.0);
        }
        assert!((data.slack[0] - 0.5).abs() < 1.0e-14);
    }

    #[test]
    fn test_condense_targets_velocity_diagonal() {
        let limit = JointVelocityUpperLimit::new(DVector::from_vec(vec![1.0, 1.0]));
        let mut s = SplitSolution::new(2, dims());
        s.v[0] = 0.5;
        s.v[1] = 0.0;
        let mut data = ConstraintComponentData::new(2);
        limit.set_slack_and_dual(&status(), &mut data, &s, 1.0e-3);
        limit.eval_constraint(&status(), &mut data, &s, 1.0e-3);
        let mut mat = SplitKktMatrix::new(dims());
        let mut res = SplitKktResidual::new(dims());
        limit.condense_slack_and_dual(&status(), &data, &s, &mut mat, &mut res);
        // Velocity rows are the trailing dimv rows of the state block.
        assert!(mat.qxx[(2, 2)] > 0.0);
        assert!(mat.qxx[(3, 3)] > 0.0);
        assert_eq!(mat.qxx[(0, 0)], 0.0);
        assert_eq!(mat.quu[(0, 0)], 0.0);
    }

    #[test]
    fn test_expand_recovers_slack_direction() {
        let limit = JointTorquesUpperLimit::new(DVector::from_vec(vec![2.0]));
        let d1 = StageDims {
            dimv: 1,
            dimx: 2,
            dima: 1,
            dimf: 0,
            dimu: 1,
            dims: 0,
        };
        let mut s = SplitSolution::new(1, d1);
        s.u[0] = 1.0;
        let mut data = ConstraintComponentData::new(1);
        limit.set_slack_and_dual(&status(), &mut data, &s, 1.0e-3);
        limit.eval_constraint(&status(), &mut data, &s, 1.0e-3);
        let mut d = SplitDirection::new(d1);
        d.du[0] = 0.3;
        limit.expand_slack_and_dual(&status(), &mut data, &s, &d);
        // Δs = −rp − J Δu with J = +1.
        assert!((data.dslack[0] - (-data.residual[0] - 0.3)).abs() < 1.0e-14);
    }
}
