//! Backward/forward Riccati recursion over the hybrid grid sequence.
//!
//! Both sweeps are single linear traversals of the flat grid array with a
//! branch keyed on the grid type tag. They are inherently sequential along
//! the chain (each stage depends on its neighbor's factorization) and must
//! not be parallelized across stages.

pub mod factorization;
pub mod regularization;

pub use factorization::RiccatiFactorization;
pub use regularization::RiccatiRegularization;

use nalgebra::{DMatrix, DVector};

use crate::discretization::{Grid, GridType};
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::SplitDirection;

/// Backward sweep: from the terminal condition down to grid 0.
///
/// Ordinary and lift grids apply the standard Riccati update through
/// Schur-complement elimination of the input block; impulse grids propagate
/// `(P, s)` through the zero-duration state jump; switching-constraint grids
/// eliminate `[Δu; ξ]` through the bordered system.
pub fn backward_riccati(
    grids: &[Grid],
    kkt_mat: &[SplitKktMatrix],
    kkt_res: &[SplitKktResidual],
    factorization: &mut [RiccatiFactorization],
    reg: &mut RiccatiRegularization,
) {
    let n = grids.len();
    debug_assert!(n >= 2);
    debug_assert_eq!(grids[n - 1].ty, GridType::Terminal);

    // Terminal condition: P = Q_xx, s = −l_x.
    factorization[n - 1].p.copy_from(&kkt_mat[n - 1].qxx);
    factorization[n - 1].s.copy_from(&kkt_res[n - 1].lx);
    factorization[n - 1].s.neg_mut();

    for i in (0..n - 1).rev() {
        let (head, tail) = factorization.split_at_mut(i + 1);
        let fact_next = &tail[0];
        let fact = &mut head[i];
        match grids[i].ty {
            GridType::Impulse => {
                backward_impulse(&kkt_mat[i], &kkt_res[i], fact_next, fact);
            }
            _ => {
                backward_stage(&kkt_mat[i], &kkt_res[i], fact_next, fact, reg);
            }
        }
    }
}

/// Zero-duration jump update: `P⁻ = Q + AᵀP⁺A`, `s⁻ = Aᵀ(s⁺ − P⁺F) − l_x`.
fn backward_impulse(
    mat: &SplitKktMatrix,
    res: &SplitKktResidual,
    next: &RiccatiFactorization,
    fact: &mut RiccatiFactorization,
) {
    let a = &mat.fxx;
    let pa = &next.p * a;
    fact.p.copy_from(&mat.qxx);
    fact.p += a.transpose() * &pa;
    symmetrize(&mut fact.p);

    // s⁻ = Aᵀ(s⁺ − P⁺F) − l_x
    let mut sf = next.s.clone();
    sf.gemv(-1.0, &next.p, &res.fx, 1.0);
    fact.s.gemv_tr(1.0, a, &sf, 0.0);
    fact.s -= &res.lx;
}

/// Standard (or bordered, for switching-constraint grids) stage update.
fn backward_stage(
    mat: &SplitKktMatrix,
    res: &SplitKktResidual,
    next: &RiccatiFactorization,
    fact: &mut RiccatiFactorization,
    reg: &mut RiccatiRegularization,
) {
    let dimu = mat.quu.nrows();
    let dims = mat.phix.nrows();
    let a = &mat.fxx;
    let b = &mat.fxu;

    // F = Q_xx + AᵀP'A, H = Q_ux + BᵀP'A, G = Q_uu + BᵀP'B.
    let pa = &next.p * a;
    let pb = &next.p * b;
    let f_mat = &mat.qxx + a.transpose() * &pa;
    let h_mat = mat.qxu.transpose() + b.transpose() * &pa;
    let g_mat = &mat.quu + b.transpose() * &pb;

    // P'F − s'
    let mut pf_s = DVector::zeros(res.fx.len());
    pf_s.gemv(1.0, &next.p, &res.fx, 0.0);
    pf_s -= &next.s;

    // lū = l_u + Bᵀ(P'F − s'), l̄x = l_x + Aᵀ(P'F − s')
    let mut lu_bar = res.lu.clone();
    lu_bar.gemv_tr(1.0, b, &pf_s, 1.0);
    let mut lx_bar = res.lx.clone();
    lx_bar.gemv_tr(1.0, a, &pf_s, 1.0);

    if dims == 0 {
        let g_inv = reg.invert_spd(&g_mat);
        // K = −G⁻¹H, k = −G⁻¹lū.
        fact.k = -(&g_inv * &h_mat);
        fact.kff = -(&g_inv * &lu_bar);
        // P = F + HᵀK, s = −(l̄x + Hᵀk).
        fact.p = &f_mat + h_mat.transpose() * &fact.k;
        symmetrize(&mut fact.p);
        fact.s = -(&lx_bar + h_mat.transpose() * &fact.kff);
    } else {
        // Bordered elimination of [Δu; ξ].
        let nb = dimu + dims;
        let dimx = f_mat.nrows();
        let mut gb = DMatrix::zeros(nb, nb);
        gb.view_mut((0, 0), (dimu, dimu)).copy_from(&g_mat);
        gb.view_mut((0, dimu), (dimu, dims))
            .copy_from(&mat.phiu.transpose());
        gb.view_mut((dimu, 0), (dims, dimu)).copy_from(&mat.phiu);
        let mut hb = DMatrix::zeros(nb, dimx);
        hb.view_mut((0, 0), (dimu, dimx)).copy_from(&h_mat);
        hb.view_mut((dimu, 0), (dims, dimx)).copy_from(&mat.phix);
        let mut gbv = DVector::zeros(nb);
        gbv.rows_mut(0, dimu).copy_from(&lu_bar);
        gbv.rows_mut(dimu, dims).copy_from(&res.phi);

        let gb_inv = reg.invert_bordered(&gb, dimu);
        let kb = -(&gb_inv * &hb);
        let kb_ff = -(&gb_inv * &gbv);
        fact.k.copy_from(&kb.rows(0, dimu));
        fact.kff.copy_from(&kb_ff.rows(0, dimu));
        fact.kxi.copy_from(&kb.rows(dimu, dims));
        fact.kxi_ff.copy_from(&kb_ff.rows(dimu, dims));

        // P = F + HbᵀKb, s = −(l̄x + Hbᵀkb).
        fact.p = &f_mat + hb.transpose() * &kb;
        symmetrize(&mut fact.p);
        fact.s = -(&lx_bar + hb.transpose() * &kb_ff);
    }
}

/// Forward sweep: propagate the state perturbation from the initial-state
/// direction, apply the feedback policies, and fill the costate directions.
pub fn forward_riccati(
    grids: &[Grid],
    kkt_mat: &[SplitKktMatrix],
    kkt_res: &[SplitKktResidual],
    factorization: &[RiccatiFactorization],
    dx0: &DVector<f64>,
    d: &mut [SplitDirection],
) {
    let n = grids.len();
    d[0].dx.copy_from(dx0);
    for i in 0..n - 1 {
        let (head, tail) = d.split_at_mut(i + 1);
        let di = &mut head[i];
        let d_next = &mut tail[0];
        let fact = &factorization[i];
        if grids[i].ty != GridType::Impulse {
            // Δu = KΔx + k, Δξ = K_ξ Δx + k_ξ.
            di.du.gemv(1.0, &fact.k, &di.dx, 0.0);
            di.du += &fact.kff;
            if !di.dxi.is_empty() {
                di.dxi.gemv(1.0, &fact.kxi, &di.dx, 0.0);
                di.dxi += &fact.kxi_ff;
            }
        }
        // Δx' = AΔx + BΔu + F.
        d_next.dx.copy_from(&kkt_res[i].fx);
        d_next.dx.gemv(1.0, &kkt_mat[i].fxx, &di.dx, 1.0);
        if !di.du.is_empty() {
            d_next.dx.gemv(1.0, &kkt_mat[i].fxu, &di.du, 1.0);
        }
    }
    // Costate directions: Δλ = PΔx − s.
    for i in 0..n {
        let fact = &factorization[i];
        d[i].dlmd.gemv(1.0, &fact.p, &d[i].dx, 0.0);
        d[i].dlmd -= &fact.s;
    }
}

fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kkt::StageDims;

    fn dims(dimv: usize, dimu: usize) -> StageDims {
        StageDims {
            dimv,
            dimx: 2 * dimv,
            dima: dimv,
            dimf: 0,
            dimu,
            dims: 0,
        }
    }

    /// One-stage LQR: the backward/forward sweep must reproduce the
    /// closed-form solution of min ½u²·r + ½x₁ᵀQx₁, x₁ = Ax₀ + Bu.
    #[test]
    fn test_single_stage_lqr_matches_closed_form() {
        let sd = dims(1, 1);
        let terminal = StageDims {
            dimu: 0,
            dima: 0,
            ..sd
        };
        let grids = vec![
            Grid::new(0, GridType::Intermediate, 0.0, 0.1, 0),
            Grid::new(1, GridType::Terminal, 0.1, 0.0, 0),
        ];
        let mut mats = vec![SplitKktMatrix::new(sd), SplitKktMatrix::new(terminal)];
        let ress = vec![SplitKktResidual::new(sd), SplitKktResidual::new(terminal)];
        let mut facts = vec![
            RiccatiFactorization::new(sd),
            RiccatiFactorization::new(terminal),
        ];

        // Stage: A = [[1, 0.1], [0, 1]], B = [0; 0.1], R = 1.
        mats[0].fxx = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        mats[0].fxu = DMatrix::from_column_slice(2, 1, &[0.0, 0.1]);
        mats[0].quu[(0, 0)] = 1.0;
        // Terminal: Q = diag(10, 10).
        mats[1].qxx = DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 10.0]));

        let mut reg = RiccatiRegularization::new(1.0e-8);
        backward_riccati(&grids, &mats, &ress, &mut facts, &mut reg);
        assert_eq!(reg.bumps, 0);

        // Closed form: G = R + BᵀQB, K = −G⁻¹BᵀQA.
        let q = &mats[1].qxx;
        let (a, b) = (&mats[0].fxx, &mats[0].fxu);
        let g = 1.0 + (b.transpose() * q * b)[(0, 0)];
        let k_expected = -(b.transpose() * q * a) / g;
        for c in 0..2 {
            assert!((facts[0].k[(0, c)] - k_expected[(0, c)]).abs() < 1.0e-12);
        }

        // Forward from a unit perturbation.
        let dx0 = DVector::from_vec(vec![1.0, 0.0]);
        let mut d = vec![SplitDirection::new(sd), SplitDirection::new(terminal)];
        forward_riccati(&grids, &mats, &ress, &facts, &dx0, &mut d);
        assert!((d[0].du[0] - facts[0].k[(0, 0)]).abs() < 1.0e-12);
        // Δx₁ = AΔx₀ + BΔu.
        let dx1 = a * &d[0].dx + b * &d[0].du;
        assert!((d[1].dx[0] - dx1[0]).abs() < 1.0e-12);
        // Terminal costate: Δλ = QΔx.
        let dlmd = q * &d[1].dx;
        assert!((d[1].dlmd[0] - dlmd[0]).abs() < 1.0e-12);
    }

    /// The impulse update must coincide with a stage update that has no
    /// input: pure congruence plus gradient propagation.
    #[test]
    fn test_impulse_update_is_congruence() {
        let sd = StageDims {
            dimv: 1,
            dimx: 2,
            dima: 1,
            dimf: 0,
            dimu: 0,
            dims: 0,
        };
        let mut mat = SplitKktMatrix::new(sd);
        let mut res = SplitKktResidual::new(sd);
        mat.fxx = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.3, 0.8]);
        mat.qxx = DMatrix::from_diagonal(&DVector::from_vec(vec![0.5, 0.5]));
        res.fx = DVector::from_vec(vec![0.1, -0.2]);
        res.lx = DVector::from_vec(vec![0.01, 0.02]);

        let mut next = RiccatiFactorization::new(sd);
        next.p = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 3.0]));
        next.s = DVector::from_vec(vec![0.4, -0.1]);

        let mut fact = RiccatiFactorization::new(sd);
        backward_impulse(&mat, &res, &next, &mut fact);

        let expected_p = &mat.qxx + mat.fxx.transpose() * &next.p * &mat.fxx;
        let expected_s =
            mat.fxx.transpose() * (&next.s - &next.p * &res.fx) - &res.lx;
        for i in 0..2 {
            assert!((fact.s[i] - expected_s[i]).abs() < 1.0e-12);
            for j in 0..2 {
                assert!((fact.p[(i, j)] - expected_p[(i, j)]).abs() < 1.0e-12);
            }
        }
    }
}
