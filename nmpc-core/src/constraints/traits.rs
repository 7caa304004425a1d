//! Constraint-component capability interface.
//!
//! Every inequality-constraint variant (joint limits, friction cones, ...)
//! implements this trait. All constraints are written in the form
//! `g(x) ≤ 0` with slack `s = −g > 0`, dual `z > 0`, and a logarithmic
//! barrier with parameter μ. The component owns the constraint definition
//! (bounds, cone parameters); the per-grid slack/dual state lives in
//! [`ConstraintComponentData`].
//!
//! The condensation folds the barrier Newton step into the stage KKT blocks:
//!
//! ```text
//! ΔQ += Jᵀ diag(z/s) J
//! Δl += Jᵀ (z ∘ rp − rc) / s        (on top of the Jᵀ z dual residual)
//! ```
//!
//! with `rp = g + s` and `rc = s ∘ z − μ`; expansion recovers
//! `Δs = −rp − J Δprimal` and `Δz = −(rc + z ∘ Δs)/s`.

use crate::constraints::data::ConstraintComponentData;
use crate::contact::ContactStatus;
use crate::discretization::GridType;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::{SplitDirection, SplitSolution};

/// One inequality-constraint variant.
pub trait ConstraintComponent: Send + Sync {
    /// Constraint dimension under the given contact status.
    fn dimc(&self, status: &ContactStatus) -> usize;

    /// Grid kinds this component applies to.
    fn applies_to(&self, ty: GridType) -> bool;

    /// Whether the iterate is strictly feasible for this component.
    fn is_feasible(&self, status: &ContactStatus, s: &SplitSolution) -> bool;

    /// Interior-point initialization: `slack = max(ε, −g)`,
    /// `dual = barrier / slack`.
    fn set_slack_and_dual(
        &self,
        status: &ContactStatus,
        data: &mut ConstraintComponentData,
        s: &SplitSolution,
        barrier: f64,
    );

    /// Evaluate the primal and complementarity residuals at the iterate.
    fn eval_constraint(
        &self,
        status: &ContactStatus,
        data: &mut ConstraintComponentData,
        s: &SplitSolution,
        barrier: f64,
    );

    /// Add the dual residual `Jᵀ z` into the stage KKT residual. Must be
    /// called after `eval_constraint`.
    fn linearize_constraints(
        &self,
        status: &ContactStatus,
        data: &ConstraintComponentData,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
    );

    /// Fold the barrier Newton step into the stage KKT blocks.
    fn condense_slack_and_dual(
        &self,
        status: &ContactStatus,
        data: &ConstraintComponentData,
        s: &SplitSolution,
        mat: &mut SplitKktMatrix,
        res: &mut SplitKktResidual,
    );

    /// Recover the slack and dual directions from the primal direction.
    fn expand_slack_and_dual(
        &self,
        status: &ContactStatus,
        data: &mut ConstraintComponentData,
        s: &SplitSolution,
        d: &SplitDirection,
    );

    /// Sum of `max(g_i, 0)` at the iterate: the raw violation used by the
    /// line-search filter.
    fn violation_l1(&self, status: &ContactStatus, s: &SplitSolution) -> f64;
}
