//! Inequality-constraint barrier engine.
//!
//! A [`Constraints`] container holds named constraint components in
//! deterministic insertion order (order never affects the numerics since all
//! condensation contributions are additive, but determinism keeps tests
//! reproducible). Per-grid slack/dual state lives in [`ConstraintsData`],
//! recreated whenever the grid's contact phase changes dimension.
//!
//! Terminal grids have no inequality constraints: every aggregate operation
//! is a no-op there and the barrier contribution has zero size. This is a
//! documented structural limitation, not an oversight; downstream consumers
//! rely on terminal-stage constraint absence.

pub mod data;
pub mod friction_cone;
pub mod joint_limits;
pub mod traits;

pub use data::ConstraintComponentData;
pub use friction_cone::{FrictionCone, ImpulseFrictionCone};
pub use joint_limits::{
    JointPositionLowerLimit, JointPositionUpperLimit, JointTorquesLowerLimit,
    JointTorquesUpperLimit, JointVelocityLowerLimit, JointVelocityUpperLimit,
};
pub use traits::ConstraintComponent;

use crate::contact::ContactStatus;
use crate::discretization::GridType;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::{SplitDirection, SplitSolution};

/// Per-grid slack/dual state for the whole constraint set.
///
/// One entry per component of the owning [`Constraints`], in the same order;
/// components that do not apply to the grid's type carry zero-size data.
#[derive(Debug, Clone, Default)]
pub struct ConstraintsData {
    pub(crate) data: Vec<ConstraintComponentData>,
}

impl ConstraintsData {
    /// Minimum primal step size over all components (fraction-to-boundary).
    pub fn max_primal_step_size(&self, tau: f64) -> f64 {
        self.data
            .iter()
            .map(|d| d.max_slack_step_size(tau))
            .fold(1.0, f64::min)
    }

    /// Minimum dual step size over all components.
    pub fn max_dual_step_size(&self, tau: f64) -> f64 {
        self.data
            .iter()
            .map(|d| d.max_dual_step_size(tau))
            .fold(1.0, f64::min)
    }

    /// Apply the primal step to all slacks.
    pub fn update_slack(&mut self, step_size: f64) {
        for d in &mut self.data {
            d.update_slack(step_size);
        }
    }

    /// Apply the dual step to all duals.
    pub fn update_dual(&mut self, step_size: f64) {
        for d in &mut self.data {
            d.update_dual(step_size);
        }
    }

    /// Total barrier cost.
    pub fn barrier_cost(&self, barrier: f64) -> f64 {
        self.data.iter().map(|d| d.barrier_cost(barrier)).sum()
    }

    /// Squared norm of all primal/complementarity residuals.
    pub fn squared_kkt_norm(&self) -> f64 {
        self.data.iter().map(|d| d.squared_kkt_norm()).sum()
    }

    /// L1 norm of all primal residuals.
    pub fn residual_l1_norm(&self) -> f64 {
        self.data.iter().map(|d| d.residual_l1_norm()).sum()
    }
}

/// Aggregate over the registered constraint components.
pub struct Constraints {
    components: Vec<(String, Box<dyn ConstraintComponent>)>,
    barrier: f64,
    fraction_to_boundary_rate: f64,
}

impl Constraints {
    /// Empty constraint set with the default interior-point parameters.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            barrier: 1.0e-3,
            fraction_to_boundary_rate: 0.995,
        }
    }

    /// Register a component under a unique name. Iteration order is the
    /// insertion order.
    pub fn push_back(&mut self, name: &str, component: Box<dyn ConstraintComponent>) {
        debug_assert!(
            self.components.iter().all(|(n, _)| n != name),
            "duplicate constraint name: {name}"
        );
        self.components.push((name.to_string(), component));
    }

    /// Set the barrier parameter μ.
    pub fn set_barrier(&mut self, barrier: f64) {
        assert!(barrier > 0.0);
        self.barrier = barrier;
    }

    /// Barrier parameter μ.
    pub fn barrier(&self) -> f64 {
        self.barrier
    }

    /// Set the fraction-to-boundary rate τ.
    pub fn set_fraction_to_boundary_rate(&mut self, rate: f64) {
        assert!(0.0 < rate && rate < 1.0);
        self.fraction_to_boundary_rate = rate;
    }

    /// Fraction-to-boundary rate τ.
    pub fn fraction_to_boundary_rate(&self) -> f64 {
        self.fraction_to_boundary_rate
    }

    /// Whether no components are registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Create per-grid data sized for `ty` and `status`.
    pub fn create_data(&self, ty: GridType, status: &ContactStatus) -> ConstraintsData {
        let data = self
            .components
            .iter()
            .map(|(_, c)| {
                let dimc = if c.applies_to(ty) { c.dimc(status) } else { 0 };
                ConstraintComponentData::new(dimc)
            })
            .collect();
        ConstraintsData { data }
    }

    /// Whether the iterate is strictly feasible for every applicable
    /// component.
    pub fn is_feasible(&self, ty: GridType, status: &ContactStatus, s: &SplitSolution) -> bool {
        self.components
            .iter()
            .filter(|(_, c)| c.applies_to(ty))
            .all(|(_, c)| c.is_feasible(status, s))
    }

    /// Interior-point initialization of all applicable components.
    pub fn set_slack_and_dual(
        &self,
        ty: GridType,
        status: &ContactStatus,
        data: &mut ConstraintsData,
        s: &SplitSolution,
    ) {
        for ((_, c), d) in self.components.iter().zip(&mut data.data) {
            if c.applies_to(ty) {
                c.set_slack_and_dual(status, d, s, self.barrier);
            }
        }
    }

    /// Evaluate primal/complementarity residuals of all applicable
    /// components.
    pub fn eval_constraint(
        &self,
        ty: GridType,
        status: &ContactStatus,
        data: &mut ConstraintsData,
        s: &SplitSolution,
    ) {
        for ((_, c), d) in self.components.iter().zip(&mut data.data) {
            if c.applies_to(ty) {
                c.eval_constraint(status, d, s, self.barrier);
            }
        }
    }

    /// Evaluate and add dual residuals into the stage KKT residual.
    pub fn linearize_constraints(
        &self,
        ty: GridType,
        status: &ContactStatus,
        data: &mut ConstraintsData,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
    ) {
        for ((_, c), d) in self.components.iter().zip(&mut data.data) {
            if c.applies_to(ty) {
                c.eval_constraint(status, d, s, self.barrier);
                c.linearize_constraints(status, d, s, res);
            }
        }
    }

    /// Fold the barrier Newton step of all applicable components into the
    /// stage KKT blocks.
    pub fn condense_slack_and_dual(
        &self,
        ty: GridType,
        status: &ContactStatus,
        data: &ConstraintsData,
        s: &SplitSolution,
        mat: &mut SplitKktMatrix,
        res: &mut SplitKktResidual,
    ) {
        for ((_, c), d) in self.components.iter().zip(&data.data) {
            if c.applies_to(ty) {
                c.condense_slack_and_dual(status, d, s, mat, res);
            }
        }
    }

    /// Recover slack/dual directions of all applicable components.
    pub fn expand_slack_and_dual(
        &self,
        ty: GridType,
        status: &ContactStatus,
        data: &mut ConstraintsData,
        s: &SplitSolution,
        d: &SplitDirection,
    ) {
        for ((_, c), cd) in self.components.iter().zip(&mut data.data) {
            if c.applies_to(ty) {
                c.expand_slack_and_dual(status, cd, s, d);
                cd.compute_dual_direction();
            }
        }
    }

    /// Raw constraint violation `Σ max(g, 0)` at the iterate, used by the
    /// line-search filter.
    pub fn violation_l1(&self, ty: GridType, status: &ContactStatus, s: &SplitSolution) -> f64 {
        self.components
            .iter()
            .filter(|(_, c)| c.applies_to(ty))
            .map(|(_, c)| c.violation_l1(status, s))
            .sum()
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Constraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraints")
            .field(
                "components",
                &self
                    .components
                    .iter()
                    .map(|(n, _)| n.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("barrier", &self.barrier)
            .field(
                "fraction_to_boundary_rate",
                &self.fraction_to_boundary_rate,
            )
            .finish()
    }
}
