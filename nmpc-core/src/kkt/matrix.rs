//! Stage KKT matrix blocks.

use nalgebra::DMatrix;

use crate::kkt::StageDims;

/// Quadratic blocks of one stage's KKT system.
///
/// The cost/constraint blocks (`qxx`, `qaa`, `qff`, `quu`) are filled by the
/// quadratization and barrier condensation; the dynamics blocks (`fxx`,
/// `fxu`) and the cross term `qxu` are produced by the contact-dynamics
/// condensation. Switching-constraint rows live in `phix`/`phiu`.
#[derive(Debug, Clone)]
pub struct SplitKktMatrix {
    /// State-state Hessian (`dimx × dimx`).
    pub qxx: DMatrix<f64>,
    /// Acceleration (or velocity-jump) Hessian (`dima × dima`).
    pub qaa: DMatrix<f64>,
    /// Contact-force Hessian (`dimf × dimf`).
    pub qff: DMatrix<f64>,
    /// Torque Hessian (`dimu × dimu`), condensed in place.
    pub quu: DMatrix<f64>,
    /// Condensed state-input cross term (`dimx × dimu`).
    pub qxu: DMatrix<f64>,
    /// Condensed state-transition matrix A (`dimx × dimx`).
    pub fxx: DMatrix<f64>,
    /// Condensed input matrix B (`dimx × dimu`).
    pub fxu: DMatrix<f64>,
    /// Switching-constraint state rows (`dims × dimx`).
    pub phix: DMatrix<f64>,
    /// Switching-constraint input rows (`dims × dimu`).
    pub phiu: DMatrix<f64>,
}

impl SplitKktMatrix {
    /// Allocate zeroed blocks for the given stage dimensions.
    pub fn new(dims: StageDims) -> Self {
        Self {
            qxx: DMatrix::zeros(dims.dimx, dims.dimx),
            qaa: DMatrix::zeros(dims.dima, dims.dima),
            qff: DMatrix::zeros(dims.dimf, dims.dimf),
            quu: DMatrix::zeros(dims.dimu, dims.dimu),
            qxu: DMatrix::zeros(dims.dimx, dims.dimu),
            fxx: DMatrix::zeros(dims.dimx, dims.dimx),
            fxu: DMatrix::zeros(dims.dimx, dims.dimu),
            phix: DMatrix::zeros(dims.dims, dims.dimx),
            phiu: DMatrix::zeros(dims.dims, dims.dimu),
        }
    }

    /// Resize all blocks for new stage dimensions, zeroing contents.
    pub fn resize(&mut self, dims: StageDims) {
        *self = Self::new(dims);
    }

    /// Zero every block in place.
    pub fn set_zero(&mut self) {
        self.qxx.fill(0.0);
        self.qaa.fill(0.0);
        self.qff.fill(0.0);
        self.quu.fill(0.0);
        self.qxu.fill(0.0);
        self.fxx.fill(0.0);
        self.fxu.fill(0.0);
        self.phix.fill(0.0);
        self.phiu.fill(0.0);
    }

    /// Current stage dimensions inferred from the blocks.
    pub fn dims(&self) -> StageDims {
        StageDims {
            dimv: self.qxx.nrows() / 2,
            dimx: self.qxx.nrows(),
            dima: self.qaa.nrows(),
            dimf: self.qff.nrows(),
            dimu: self.quu.nrows(),
            dims: self.phix.nrows(),
        }
    }
}
