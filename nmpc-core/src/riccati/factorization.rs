//! Riccati factorization of one grid.

use nalgebra::{DMatrix, DVector};

use crate::kkt::StageDims;

/// Value-function factorization and feedback policy of one grid.
///
/// The quadratic value model is `V(Δx) = ½ ΔxᵀPΔx − sᵀΔx + const`, so the
/// costate direction is `Δλ = PΔx − s`. Exactly one factorization exists per
/// grid regardless of event density; impulse grids receive theirs through
/// the zero-duration jump update.
#[derive(Debug, Clone)]
pub struct RiccatiFactorization {
    /// Value-function Hessian (`dimx × dimx`), symmetric PSD along a
    /// converging trajectory.
    pub p: DMatrix<f64>,
    /// Value-function negative gradient (`dimx`).
    pub s: DVector<f64>,
    /// State-feedback gain (`dimu × dimx`).
    pub k: DMatrix<f64>,
    /// Feedforward input step (`dimu`).
    pub kff: DVector<f64>,
    /// Switching-multiplier feedback (`dims × dimx`).
    pub kxi: DMatrix<f64>,
    /// Switching-multiplier feedforward (`dims`).
    pub kxi_ff: DVector<f64>,
}

impl RiccatiFactorization {
    /// Allocate a zero factorization for stage dimensions `dims`.
    pub fn new(dims: StageDims) -> Self {
        Self {
            p: DMatrix::zeros(dims.dimx, dims.dimx),
            s: DVector::zeros(dims.dimx),
            k: DMatrix::zeros(dims.dimu, dims.dimx),
            kff: DVector::zeros(dims.dimu),
            kxi: DMatrix::zeros(dims.dims, dims.dimx),
            kxi_ff: DVector::zeros(dims.dims),
        }
    }

    /// Resize for new stage dimensions, zeroing contents.
    pub fn resize(&mut self, dims: StageDims) {
        *self = Self::new(dims);
    }
}
