//! Primal-dual iterate of one grid.

use nalgebra::DVector;

use crate::kkt::StageDims;

/// Primal and dual variables of one grid point.
///
/// Created once per solver instance and resized only when the grid sequence
/// changes (discretization or mesh refinement), never mid-iteration. The
/// force-related blocks (`f`, `mu`, `xi`) have variable dimension following
/// the grid's contact phase.
#[derive(Debug, Clone)]
pub struct SplitSolution {
    /// Configuration.
    pub q: DVector<f64>,
    /// Velocity.
    pub v: DVector<f64>,
    /// Acceleration (velocity jump `dv` on impulse grids).
    pub a: DVector<f64>,
    /// Joint torques (empty on impulse and terminal grids).
    pub u: DVector<f64>,
    /// Stacked active contact forces (impulse forces on impulse grids).
    pub f: DVector<f64>,
    /// Costate (dynamics multiplier), stacked `[λ_q; λ_v]`.
    pub lmd: DVector<f64>,
    /// Inverse-dynamics multiplier.
    pub beta: DVector<f64>,
    /// Contact-constraint multiplier.
    pub mu: DVector<f64>,
    /// Switching-constraint multiplier.
    pub xi: DVector<f64>,
}

impl SplitSolution {
    /// Allocate a zero solution for configuration dimension `dimq` and stage
    /// dimensions `dims`.
    pub fn new(dimq: usize, dims: StageDims) -> Self {
        Self {
            q: DVector::zeros(dimq),
            v: DVector::zeros(dims.dimv),
            a: DVector::zeros(dims.dima),
            u: DVector::zeros(dims.dimu),
            f: DVector::zeros(dims.dimf),
            lmd: DVector::zeros(dims.dimx),
            beta: DVector::zeros(dims.dima),
            mu: DVector::zeros(dims.dimf),
            xi: DVector::zeros(dims.dims),
        }
    }

    /// Resize the variable-dimension blocks for a phase change, preserving
    /// the state blocks. Newly sized force/multiplier blocks are zeroed.
    pub fn set_contact_dims(&mut self, dims: StageDims) {
        if self.f.len() != dims.dimf {
            self.f = DVector::zeros(dims.dimf);
            self.mu = DVector::zeros(dims.dimf);
        }
        if self.a.len() != dims.dima {
            self.a = DVector::zeros(dims.dima);
            self.beta = DVector::zeros(dims.dima);
        }
        if self.u.len() != dims.dimu {
            self.u = DVector::zeros(dims.dimu);
        }
        if self.xi.len() != dims.dims {
            self.xi = DVector::zeros(dims.dims);
        }
    }

    /// Copy the primal blocks of `other` (state, acceleration, input, force)
    /// where the dimensions agree.
    pub fn copy_primal(&mut self, other: &SplitSolution) {
        self.q.copy_from(&other.q);
        self.v.copy_from(&other.v);
        if self.a.len() == other.a.len() {
            self.a.copy_from(&other.a);
        }
        if self.u.len() == other.u.len() {
            self.u.copy_from(&other.u);
        }
        if self.f.len() == other.f.len() {
            self.f.copy_from(&other.f);
        }
    }
}

/// Newton direction of one grid point.
#[derive(Debug, Clone)]
pub struct SplitDirection {
    /// State direction, stacked `[Δq; Δv]`.
    pub dx: DVector<f64>,
    /// Torque direction.
    pub du: DVector<f64>,
    /// Acceleration / velocity-jump direction.
    pub da: DVector<f64>,
    /// Contact-force direction.
    pub df: DVector<f64>,
    /// Costate direction.
    pub dlmd: DVector<f64>,
    /// Inverse-dynamics multiplier direction.
    pub dbeta: DVector<f64>,
    /// Contact-multiplier direction.
    pub dmu: DVector<f64>,
    /// Switching-multiplier direction.
    pub dxi: DVector<f64>,
}

impl SplitDirection {
    /// Allocate a zero direction for stage dimensions `dims`.
    pub fn new(dims: StageDims) -> Self {
        Self {
            dx: DVector::zeros(dims.dimx),
            du: DVector::zeros(dims.dimu),
            da: DVector::zeros(dims.dima),
            df: DVector::zeros(dims.dimf),
            dlmd: DVector::zeros(dims.dimx),
            dbeta: DVector::zeros(dims.dima),
            dmu: DVector::zeros(dims.dimf),
            dxi: DVector::zeros(dims.dims),
        }
    }

    /// Resize for new stage dimensions, zeroing contents.
    pub fn resize(&mut self, dims: StageDims) {
        *self = Self::new(dims);
    }

    /// Zero all blocks.
    pub fn set_zero(&mut self) {
        self.dx.fill(0.0);
        self.du.fill(0.0);
        self.da.fill(0.0);
        self.df.fill(0.0);
        self.dlmd.fill(0.0);
        self.dbeta.fill(0.0);
        self.dmu.fill(0.0);
        self.dxi.fill(0.0);
    }
}
