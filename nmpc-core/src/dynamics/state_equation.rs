//! Discrete state-equation residuals and costate coupling.
//!
//! Semi-implicit Euler between stage grids:
//!
//! ```text
//! q_{k+1} = q_k ⊕ dt v_k ,   v_{k+1} = v_k + dt a_k
//! ```
//!
//! Impulse grids carry the instantaneous jump `q⁺ = q`, `v⁺ = v + dv`. The
//! acceleration (or jump) enters the transition through the input map
//! `B_a = [0; scale·I]` with `scale = dt` for stages and `1` for impulses;
//! the contact-dynamics condensation later composes this with the
//! elimination of `(a, f)`.

use nalgebra::DVector;

use crate::kkt::SplitKktResidual;
use crate::ocp::solution::SplitSolution;
use crate::robot::RobotModel;

/// Fill the raw state-equation residual `fx = f(x_k, a_k) ⊖ x_{k+1}` for a
/// stage grid.
pub fn eval_stage<R: RobotModel>(
    model: &R,
    dt: f64,
    s: &SplitSolution,
    s_next: &SplitSolution,
    res: &mut SplitKktResidual,
) {
    let dimv = s.v.len();
    let mut q_pred = DVector::zeros(s.q.len());
    model.integrate_config(&s.q, &s.v, dt, &mut q_pred);
    let mut fq = DVector::zeros(dimv);
    model.subtract_config(&q_pred, &s_next.q, &mut fq);
    for i in 0..dimv {
        res.fx[i] = fq[i];
        res.fx[dimv + i] = s.v[i] + dt * s.a[i] - s_next.v[i];
    }
}

/// Fill the raw state-equation residual for an impulse grid.
pub fn eval_impulse<R: RobotModel>(
    model: &R,
    s: &SplitSolution,
    s_next: &SplitSolution,
    res: &mut SplitKktResidual,
) {
    let dimv = s.v.len();
    let mut fq = DVector::zeros(dimv);
    model.subtract_config(&s.q, &s_next.q, &mut fq);
    for i in 0..dimv {
        res.fx[i] = fq[i];
        res.fx[dimv + i] = s.v[i] + s.a[i] - s_next.v[i];
    }
}

/// Add the costate coupling `A₀ᵀ λ' − λ` (and `B_aᵀ λ'` into `la`) of a
/// stage grid to the stationarity residuals.
pub fn add_costate_residual_stage(
    dt: f64,
    s: &SplitSolution,
    lmd_next: &DVector<f64>,
    res: &mut SplitKktResidual,
) {
    let dimv = s.v.len();
    for i in 0..dimv {
        res.lx[i] += lmd_next[i] - s.lmd[i];
        res.lx[dimv + i] += dt * lmd_next[i] + lmd_next[dimv + i] - s.lmd[dimv + i];
        res.la[i] += dt * lmd_next[dimv + i];
    }
}

/// Add the costate coupling of an impulse grid (`A₀ = I`, `B_dv = [0; I]`).
pub fn add_costate_residual_impulse(
    s: &SplitSolution,
    lmd_next: &DVector<f64>,
    res: &mut SplitKktResidual,
) {
    let dimv = s.v.len();
    for i in 0..dimv {
        res.lx[i] += lmd_next[i] - s.lmd[i];
        res.lx[dimv + i] += lmd_next[dimv + i] - s.lmd[dimv + i];
        res.la[i] += lmd_next[dimv + i];
    }
}
