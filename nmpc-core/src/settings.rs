//! Solver settings and validation.
//!
//! The settings struct is consumed by [`crate::solver::OcpSolver`] at
//! construction. All values are validated eagerly; an out-of-range value is
//! an invalid-argument error, never a silent clamp.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// Discretization method for the horizon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscretizationMethod {
    /// N uniform nominal grids; event grids are inserted between them.
    FixedGrid,
    /// Grids are distributed per contact phase so that discrete events land
    /// exactly on phase boundaries.
    PhaseBased,
}

/// Solver settings and parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Maximum number of Newton iterations per `solve()` call.
    pub max_iter: usize,

    /// Convergence tolerance on the squared KKT residual norm.
    pub kkt_tol: f64,

    /// KKT tolerance under which mesh refinement is allowed to trigger
    /// (PhaseBased discretization only).
    pub kkt_tol_mesh: f64,

    /// Maximum inter-grid time step before the mesh is considered too coarse.
    pub max_dt_mesh: f64,

    /// Base magnitude of the regularization added to ill-conditioned
    /// condensed blocks before inversion in the backward Riccati sweep.
    pub max_dts_riccati: f64,

    /// Horizon discretization method.
    pub discretization_method: DiscretizationMethod,

    /// Enable the filter line search. When disabled the fraction-to-boundary
    /// step size is applied directly.
    pub enable_line_search: bool,

    /// Carry the previous solution onto a shifted grid after re-discretization
    /// instead of keeping stage indices fixed.
    pub enable_solution_interpolation: bool,

    /// Number of worker threads for the per-grid KKT evaluation. Each worker
    /// owns a private robot-model instance.
    pub nthreads: usize,

    /// Interior-point barrier parameter used by the constraint components.
    pub barrier_param: f64,

    /// Fraction-to-boundary rate τ: steps keep `s + αΔs ≥ (1−τ)s`.
    pub fraction_to_boundary_rate: f64,

    /// Print a per-iteration convergence table to stderr.
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            kkt_tol: 1.0e-8,
            kkt_tol_mesh: 0.1,
            max_dt_mesh: 0.05,
            max_dts_riccati: 1.0e-6,
            discretization_method: DiscretizationMethod::FixedGrid,
            enable_line_search: false,
            enable_solution_interpolation: false,
            nthreads: 1,
            barrier_param: 1.0e-3,
            fraction_to_boundary_rate: 0.995,
            verbose: false,
        }
    }
}

impl SolverSettings {
    /// Validate all settings.
    pub fn validate(&self) -> SolverResult<()> {
        if self.max_iter == 0 {
            return Err(SolverError::InvalidArgument(
                "max_iter must be positive".into(),
            ));
        }
        if self.kkt_tol <= 0.0 {
            return Err(SolverError::InvalidArgument(
                "kkt_tol must be positive".into(),
            ));
        }
        if self.kkt_tol_mesh <= 0.0 {
            return Err(SolverError::InvalidArgument(
                "kkt_tol_mesh must be positive".into(),
            ));
        }
        if self.max_dt_mesh <= 0.0 {
            return Err(SolverError::InvalidArgument(
                "max_dt_mesh must be positive".into(),
            ));
        }
        if self.max_dts_riccati < 0.0 {
            return Err(SolverError::InvalidArgument(
                "max_dts_riccati must be non-negative".into(),
            ));
        }
        if self.nthreads == 0 {
            return Err(SolverError::InvalidArgument(
                "nthreads must be positive".into(),
            ));
        }
        if self.barrier_param <= 0.0 {
            return Err(SolverError::InvalidArgument(
                "barrier_param must be positive".into(),
            ));
        }
        if !(0.0 < self.fraction_to_boundary_rate && self.fraction_to_boundary_rate < 1.0) {
            return Err(SolverError::InvalidArgument(
                "fraction_to_boundary_rate must be in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}
