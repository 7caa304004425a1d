//! Cost-function contract and reference cost terms.
//!
//! Cost evaluation is an external collaborator: the solver sums scalar costs
//! and additive KKT contributions over the registered named terms, in
//! deterministic insertion order.

pub mod config_space;
pub mod contact_force;

pub use config_space::ConfigurationSpaceCost;
pub use contact_force::ContactForceCost;

use crate::contact::ContactStatus;
use crate::discretization::Grid;
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::SplitSolution;

/// One additive cost term.
///
/// Stage methods receive the grid (type tag and Δt) and are called for every
/// non-terminal grid, impulse grids included; a term decides from the grid
/// type which of its weights apply. Quadratization adds the term's gradient
/// and Gauss-Newton Hessian into the stage KKT blocks and returns the scalar
/// cost.
pub trait CostTerm: Send + Sync {
    /// Scalar stage cost.
    fn eval_stage_cost(&self, status: &ContactStatus, grid: &Grid, s: &SplitSolution) -> f64;

    /// Stage cost plus additive gradient/Hessian contributions.
    fn quadratize_stage_cost(
        &self,
        status: &ContactStatus,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64;

    /// Scalar terminal cost.
    fn eval_terminal_cost(&self, grid: &Grid, s: &SplitSolution) -> f64;

    /// Terminal cost plus additive gradient/Hessian contributions (state
    /// blocks only).
    fn quadratize_terminal_cost(
        &self,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64;
}

/// Ordered collection of named cost terms.
#[derive(Default)]
pub struct CostFunction {
    terms: Vec<(String, Box<dyn CostTerm>)>,
}

impl CostFunction {
    /// Empty cost function.
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Register a term under a unique name.
    pub fn push_back(&mut self, name: &str, term: Box<dyn CostTerm>) {
        debug_assert!(
            self.terms.iter().all(|(n, _)| n != name),
            "duplicate cost term name: {name}"
        );
        self.terms.push((name.to_string(), term));
    }

    /// Whether no terms are registered.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Total stage cost.
    pub fn eval_stage_cost(&self, status: &ContactStatus, grid: &Grid, s: &SplitSolution) -> f64 {
        self.terms
            .iter()
            .map(|(_, t)| t.eval_stage_cost(status, grid, s))
            .sum()
    }

    /// Total stage cost with KKT contributions.
    pub fn quadratize_stage_cost(
        &self,
        status: &ContactStatus,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64 {
        self.terms
            .iter()
            .map(|(_, t)| t.quadratize_stage_cost(status, grid, s, res, mat))
            .sum()
    }

    /// Total terminal cost.
    pub fn eval_terminal_cost(&self, grid: &Grid, s: &SplitSolution) -> f64 {
        self.terms
            .iter()
            .map(|(_, t)| t.eval_terminal_cost(grid, s))
            .sum()
    }

    /// Total terminal cost with KKT contributions.
    pub fn quadratize_terminal_cost(
        &self,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64 {
        self.terms
            .iter()
            .map(|(_, t)| t.quadratize_terminal_cost(grid, s, res, mat))
            .sum()
    }
}

impl std::fmt::Debug for CostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostFunction")
            .field(
                "terms",
                &self.terms.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
