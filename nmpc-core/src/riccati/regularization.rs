//! Regularization policy for the backward sweep.
//!
//! Near-singular condensed input blocks appear at degenerate contact
//! configurations (all contacts inactive with zero input weights, redundant
//! cone rows). The policy adds a bounded, escalating diagonal shift before
//! inversion and counts the bumps for the solver statistics.

use nalgebra::DMatrix;
use nalgebra::linalg::Cholesky;
use tracing::debug;

/// Escalating diagonal regularization for the backward-sweep inversions.
#[derive(Debug, Clone)]
pub struct RiccatiRegularization {
    /// Base magnitude added on the first bump.
    base: f64,
    /// Upper bound on the magnitude.
    max: f64,
    /// Bumps applied since the last reset.
    pub bumps: u64,
}

impl RiccatiRegularization {
    /// Policy with the given base magnitude.
    pub fn new(base: f64) -> Self {
        Self {
            base: base.max(f64::EPSILON),
            max: 1.0e-2,
            bumps: 0,
        }
    }

    /// Reset the bump counter (start of a `solve()` call).
    pub fn reset(&mut self) {
        self.bumps = 0;
    }

    /// Invert a symmetric positive-definite block, bumping the diagonal on
    /// factorization failure.
    pub fn invert_spd(&mut self, g: &DMatrix<f64>) -> DMatrix<f64> {
        if let Some(chol) = Cholesky::new(g.clone()) {
            return chol.inverse();
        }
        let mut reg = self.base;
        loop {
            let mut g_reg = g.clone();
            for i in 0..g.nrows() {
                g_reg[(i, i)] += reg;
            }
            if let Some(chol) = Cholesky::new(g_reg) {
                self.bumps += 1;
                debug!(reg, "regularized condensed input block");
                return chol.inverse();
            }
            reg *= 10.0;
            assert!(reg <= self.max * 1.0e6, "input block irrecoverably singular");
        }
    }

    /// Invert the bordered (indefinite) block of a switching-constraint
    /// stage, shifting the constraint diagonal on failure.
    pub fn invert_bordered(&mut self, gb: &DMatrix<f64>, dimu: usize) -> DMatrix<f64> {
        if let Some(inv) = gb.clone().try_inverse() {
            return inv;
        }
        let mut reg = self.base;
        loop {
            let mut gb_reg = gb.clone();
            for i in 0..gb.nrows() {
                // Primal block shifts up, constraint block shifts down.
                gb_reg[(i, i)] += if i < dimu { reg } else { -reg };
            }
            if let Some(inv) = gb_reg.try_inverse() {
                self.bumps += 1;
                debug!(reg, "regularized bordered switching block");
                return inv;
            }
            reg *= 10.0;
            assert!(reg <= self.max * 1.0e6, "bordered block irrecoverably singular");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spd_inverse_without_bumps() {
        let mut reg = RiccatiRegularization::new(1.0e-6);
        let g = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![2.0, 4.0]));
        let inv = reg.invert_spd(&g);
        assert_eq!(reg.bumps, 0);
        assert!((inv[(0, 0)] - 0.5).abs() < 1.0e-12);
        assert!((inv[(1, 1)] - 0.25).abs() < 1.0e-12);
    }

    #[test]
    fn test_singular_block_gets_bumped() {
        let mut reg = RiccatiRegularization::new(1.0e-6);
        let g = DMatrix::zeros(2, 2);
        let inv = reg.invert_spd(&g);
        assert!(reg.bumps > 0);
        assert!(inv[(0, 0)].is_finite());
    }
}
