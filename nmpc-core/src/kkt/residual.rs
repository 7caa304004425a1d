//! Stage KKT residual blocks.

use nalgebra::DVector;

use crate::kkt::StageDims;

/// Linearized stationarity and feasibility residuals of one stage.
#[derive(Debug, Clone)]
pub struct SplitKktResidual {
    /// Condensed state-equation residual (`dimx`).
    pub fx: DVector<f64>,
    /// Lagrangian gradient w.r.t. the state (`dimx`), condensed in place.
    pub lx: DVector<f64>,
    /// Lagrangian gradient w.r.t. acceleration / velocity jump (`dima`).
    pub la: DVector<f64>,
    /// Lagrangian gradient w.r.t. contact forces (`dimf`).
    pub lf: DVector<f64>,
    /// Lagrangian gradient w.r.t. torques (`dimu`), condensed in place.
    pub lu: DVector<f64>,
    /// Switching-constraint residual (`dims`).
    pub phi: DVector<f64>,
}

impl SplitKktResidual {
    /// Allocate zeroed residuals for the given stage dimensions.
    pub fn new(dims: StageDims) -> Self {
        Self {
            fx: DVector::zeros(dims.dimx),
            lx: DVector::zeros(dims.dimx),
            la: DVector::zeros(dims.dima),
            lf: DVector::zeros(dims.dimf),
            lu: DVector::zeros(dims.dimu),
            phi: DVector::zeros(dims.dims),
        }
    }

    /// Resize all blocks for new stage dimensions, zeroing contents.
    pub fn resize(&mut self, dims: StageDims) {
        *self = Self::new(dims);
    }

    /// Zero every block in place.
    pub fn set_zero(&mut self) {
        self.fx.fill(0.0);
        self.lx.fill(0.0);
        self.la.fill(0.0);
        self.lf.fill(0.0);
        self.lu.fill(0.0);
        self.phi.fill(0.0);
    }

    /// Squared Euclidean norm of all residual blocks.
    pub fn squared_norm(&self) -> f64 {
        self.fx.norm_squared()
            + self.lx.norm_squared()
            + self.la.norm_squared()
            + self.lf.norm_squared()
            + self.lu.norm_squared()
            + self.phi.norm_squared()
    }

    /// L1 norm of the feasibility residuals (dynamics + switching).
    pub fn constraint_violation(&self) -> f64 {
        self.fx.iter().map(|r| r.abs()).sum::<f64>()
            + self.phi.iter().map(|r| r.abs()).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_norm_sums_blocks() {
        let dims = StageDims {
            dimv: 1,
            dimx: 2,
            dima: 1,
            dimf: 0,
            dimu: 1,
            dims: 0,
        };
        let mut res = SplitKktResidual::new(dims);
        res.fx[0] = 3.0;
        res.lu[0] = 4.0;
        assert!((res.squared_norm() - 25.0).abs() < 1.0e-14);
        res.set_zero();
        assert_eq!(res.squared_norm(), 0.0);
    }
}
