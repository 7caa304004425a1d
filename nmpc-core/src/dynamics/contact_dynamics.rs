//! Contact-dynamics condensation.
//!
//! Per stage, the primal block `(a, f)` is determined by two equalities with
//! multipliers `(β, μ)`:
//!
//! ```text
//! ID(q, v, a) − u − Jᵀ f = 0        (inverse dynamics)
//! J a + γ(q, v)          = 0        (contact acceleration)
//! ```
//!
//! (impulse grids use `M dv − Jᵀ f = 0` and the post-impulse contact
//! velocity). Both eliminations share the inverse of the contact-dynamics
//! matrix
//!
//! ```text
//! T = [[M, Jᵀ], [J, 0]]⁻¹
//! ```
//!
//! With `w = [Δa; −Δf] = T(E_u Δu − D_x Δx − r)` and the multiplier solve
//! `[Δβ; Δμ] = T(g₀ − Q_blk w − E_λ Δλ')`, substituting into the stage
//! stationarity rows yields a standard `(Δx, Δu)` LQR stage:
//!
//! ```text
//! Q_xx += V_xᵀ Q_blk V_x      Q_xu  = −V_xᵀ Q_blk V_u     Q_uu += V_uᵀ Q_blk V_u
//! l_x  += V_xᵀ g_b            l_u  −= V_uᵀ g_b
//! A = A₀ + B_a·A_wx           B = B_a·A_wu                F += B_a·w₀|_a
//! ```
//!
//! with `V_x = T D_x`, `V_u = T E_u`, `w₀ = −T r`, `g₀ = [−l_a; l_f]`,
//! `g_b = g₀ − Q_blk w₀`. Accelerations, forces and multipliers are
//! recovered from `(Δx, Δu, Δλ')` in the expansion.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::contact::ContactStatus;
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageDims};
use crate::ocp::solution::{SplitDirection, SplitSolution};
use crate::robot::RobotModel;

/// Evaluated contact-dynamics quantities and condensation products of one
/// grid. Overwritten every Newton iteration.
#[derive(Debug, Clone)]
pub struct ContactDynamicsData {
    dimv: usize,
    dimf: usize,
    dimx: usize,
    dimu: usize,
    /// Input-map scale of the acceleration block: `dt` on stage grids, `1`
    /// on impulse grids.
    ba_scale: f64,
    /// Velocity coupling in the q-rows of `A₀`: `dt` on stage grids, `0` on
    /// impulse grids.
    a0_qv: f64,

    // Evaluated quantities.
    did_dq: DMatrix<f64>,
    did_dv: DMatrix<f64>,
    did_da: DMatrix<f64>,
    j: DMatrix<f64>,
    dc_dq: DMatrix<f64>,
    dc_dv: DMatrix<f64>,
    id_res: DVector<f64>,
    c_res: DVector<f64>,

    // Condensation products.
    t: DMatrix<f64>,
    vx: DMatrix<f64>,
    vu: DMatrix<f64>,
    w0: DVector<f64>,
    g0: DVector<f64>,
    gb: DVector<f64>,
}

impl ContactDynamicsData {
    /// Allocate for the given stage dimensions. `ba_scale` is overwritten at
    /// evaluation.
    pub fn new(dims: StageDims) -> Self {
        let (dimv, dimf, dimx, dimu) = (dims.dimv, dims.dimf, dims.dimx, dims.dimu);
        let dimvf = dimv + dimf;
        Self {
            dimv,
            dimf,
            dimx,
            dimu,
            ba_scale: 0.0,
            a0_qv: 0.0,
            did_dq: DMatrix::zeros(dimv, dimv),
            did_dv: DMatrix::zeros(dimv, dimv),
            did_da: DMatrix::zeros(dimv, dimv),
            j: DMatrix::zeros(dimf, dimv),
            dc_dq: DMatrix::zeros(dimf, dimv),
            dc_dv: DMatrix::zeros(dimf, dimv),
            id_res: DVector::zeros(dimv),
            c_res: DVector::zeros(dimf),
            t: DMatrix::zeros(dimvf, dimvf),
            vx: DMatrix::zeros(dimvf, dimx),
            vu: DMatrix::zeros(dimvf, dimu),
            w0: DVector::zeros(dimvf),
            g0: DVector::zeros(dimvf),
            gb: DVector::zeros(dimvf),
        }
    }

    /// Resize for new stage dimensions.
    pub fn resize(&mut self, dims: StageDims) {
        *self = Self::new(dims);
    }

    /// Evaluate the contact dynamics of a stage grid at the iterate and add
    /// the multiplier terms to the stationarity residuals.
    pub fn eval_stage<R: RobotModel>(
        &mut self,
        model: &mut R,
        status: &ContactStatus,
        dt: f64,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
    ) {
        self.ba_scale = dt;
        self.a0_qv = dt;
        model.inverse_dynamics(&s.q, &s.v, &s.a, &mut self.id_res);
        model.inverse_dynamics_derivatives(
            &s.q,
            &s.v,
            &s.a,
            &mut self.did_dq,
            &mut self.did_dv,
            &mut self.did_da,
        );
        // ID(q, v, a) − u − Jᵀ f
        self.id_res -= &s.u;
        if self.dimf > 0 {
            model.contact_jacobian(status, &mut self.j);
            self.id_res.gemv_tr(-1.0, &self.j, &s.f, 1.0);
            model.contact_acceleration_residual(status, &s.a, &mut self.c_res);
            model.contact_acceleration_derivatives(status, &s.a, &mut self.dc_dq, &mut self.dc_dv);
        }
        self.add_multiplier_residuals(s, res);
    }

    /// Evaluate the impulse dynamics (`M dv − Jᵀ f`, post-impulse contact
    /// velocity) at the iterate. `s.a` holds the velocity jump `dv`.
    pub fn eval_impulse<R: RobotModel>(
        &mut self,
        model: &mut R,
        status: &ContactStatus,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
    ) {
        self.ba_scale = 1.0;
        self.a0_qv = 0.0;
        // The impulse balance uses the joint inertia only; bias forces do
        // not act over a zero-duration interval. The configuration
        // dependence of M(q)·dv is dropped from the linearization.
        model.inverse_dynamics_derivatives(
            &s.q,
            &s.v,
            &s.a,
            &mut self.did_dq,
            &mut self.did_dv,
            &mut self.did_da,
        );
        self.did_dq.fill(0.0);
        self.did_dv.fill(0.0);
        self.id_res.gemv(1.0, &self.did_da, &s.a, 0.0);
        if self.dimf > 0 {
            model.contact_jacobian(status, &mut self.j);
            self.id_res.gemv_tr(-1.0, &self.j, &s.f, 1.0);
            // Post-impulse contact velocity J(v + dv).
            let v_post = &s.v + &s.a;
            model.contact_velocity_residual(status, &v_post, &mut self.c_res);
            model.contact_velocity_derivatives(status, &v_post, &mut self.dc_dq, &mut self.dc_dv);
        }
        self.add_multiplier_residuals(s, res);
    }

    /// Add `∂L/∂(a,f,u,x)` multiplier terms at the current `(β, μ)`.
    fn add_multiplier_residuals(&self, s: &SplitSolution, res: &mut SplitKktResidual) {
        let dimv = self.dimv;
        // la += did_daᵀ β + Jᵀ μ ; lf −= J β ; lu −= β
        res.la.gemv_tr(1.0, &self.did_da, &s.beta, 1.0);
        if self.dimf > 0 {
            res.la.gemv_tr(1.0, &self.j, &s.mu, 1.0);
            res.lf.gemv(-1.0, &self.j, &s.beta, 1.0);
        }
        if self.dimu > 0 {
            res.lu -= &s.beta;
        }
        // lq += did_dqᵀ β + dc_dqᵀ μ ; lv += did_dvᵀ β + dc_dvᵀ μ
        let mut lq = res.lx.rows_mut(0, dimv);
        lq.gemv_tr(1.0, &self.did_dq, &s.beta, 1.0);
        if self.dimf > 0 {
            lq.gemv_tr(1.0, &self.dc_dq, &s.mu, 1.0);
        }
        let mut lv = res.lx.rows_mut(dimv, dimv);
        lv.gemv_tr(1.0, &self.did_dv, &s.beta, 1.0);
        if self.dimf > 0 {
            lv.gemv_tr(1.0, &self.dc_dv, &s.mu, 1.0);
        }
    }

    /// Condense `(a, f, β, μ)` out of the stage, producing the reduced
    /// `(Δx, Δu)` blocks in `mat`/`res`. The cost blocks `qaa`/`qff` and the
    /// pre-condensation gradients `la`/`lf` must already be complete.
    pub fn condense(&mut self, mat: &mut SplitKktMatrix, res: &mut SplitKktResidual) {
        let (dimv, dimf, dimx, dimu) = (self.dimv, self.dimf, self.dimx, self.dimu);
        let dimvf = dimv + dimf;

        // Contact-dynamics matrix [[M, Jᵀ], [J, 0]] and its inverse.
        let mut cd = DMatrix::zeros(dimvf, dimvf);
        cd.view_mut((0, 0), (dimv, dimv)).copy_from(&self.did_da);
        if dimf > 0 {
            cd.view_mut((0, dimv), (dimv, dimf))
                .copy_from(&self.j.transpose());
            cd.view_mut((dimv, 0), (dimf, dimv)).copy_from(&self.j);
        }
        self.t = invert_contact_dynamics_matrix(cd);

        // D_x = [[did_dq, did_dv], [dc_dq, dc_dv]] and r = [id_res; c_res].
        let mut dx_mat = DMatrix::zeros(dimvf, dimx);
        dx_mat
            .view_mut((0, 0), (dimv, dimv))
            .copy_from(&self.did_dq);
        dx_mat
            .view_mut((0, dimv), (dimv, dimv))
            .copy_from(&self.did_dv);
        if dimf > 0 {
            dx_mat
                .view_mut((dimv, 0), (dimf, dimv))
                .copy_from(&self.dc_dq);
            dx_mat
                .view_mut((dimv, dimv), (dimf, dimv))
                .copy_from(&self.dc_dv);
        }
        let mut r = DVector::zeros(dimvf);
        r.rows_mut(0, dimv).copy_from(&self.id_res);
        if dimf > 0 {
            r.rows_mut(dimv, dimf).copy_from(&self.c_res);
        }

        self.vx = &self.t * &dx_mat;
        if dimu > 0 {
            self.vu.copy_from(&self.t.columns(0, dimv));
        }
        self.w0 = -(&self.t * &r);

        // g₀ = [−l_a; l_f], g_b = g₀ − Q_blk w₀.
        self.g0.rows_mut(0, dimv).copy_from(&(-&res.la));
        if dimf > 0 {
            self.g0.rows_mut(dimv, dimf).copy_from(&res.lf);
        }
        self.gb.copy_from(&self.g0);
        let qblk_w0 = self.apply_qblk(&mat.qaa, &mat.qff, &self.w0);
        self.gb -= &qblk_w0;

        // Reduced quadratic blocks.
        let qblk_vx = self.apply_qblk_mat(&mat.qaa, &mat.qff, &self.vx);
        mat.qxx += self.vx.transpose() * &qblk_vx;
        if dimu > 0 {
            let qblk_vu = self.apply_qblk_mat(&mat.qaa, &mat.qff, &self.vu);
            mat.qxu = -(self.vx.transpose() * &qblk_vu);
            mat.quu += self.vu.transpose() * &qblk_vu;
            res.lu.gemv_tr(-1.0, &self.vu, &self.gb, 1.0);
        }
        res.lx.gemv_tr(1.0, &self.vx, &self.gb, 1.0);

        // Condensed transition: A = A₀ + B_a A_wx, B = B_a A_wu,
        // F += B_a w₀|_a, with B_a = [0; ba_scale·I].
        mat.fxx.fill(0.0);
        mat.fxx.fill_diagonal(1.0);
        for i in 0..dimv {
            mat.fxx[(i, dimv + i)] = self.a0_qv;
        }
        let awx = self.vx.rows(0, dimv);
        let mut fvx = mat.fxx.view_mut((dimv, 0), (dimv, dimx));
        for i in 0..dimv {
            for c in 0..dimx {
                fvx[(i, c)] -= self.ba_scale * awx[(i, c)];
            }
        }
        if dimu > 0 {
            let awu = self.vu.rows(0, dimv);
            mat.fxu.fill(0.0);
            let mut fvu = mat.fxu.view_mut((dimv, 0), (dimv, dimu));
            for i in 0..dimv {
                for c in 0..dimu {
                    fvu[(i, c)] = self.ba_scale * awu[(i, c)];
                }
            }
        }
        for i in 0..dimv {
            res.fx[dimv + i] += self.ba_scale * self.w0[i];
        }
    }

    /// Fold the switching-constraint rows through the condensation:
    /// `Φ_x = Φ_x_raw + Φ_a A_wx`, `Φ_u = Φ_a A_wu`, `φ += Φ_a w₀|_a`.
    pub fn condense_switching(
        &self,
        phia: &DMatrix<f64>,
        mat: &mut SplitKktMatrix,
        res: &mut SplitKktResidual,
    ) {
        let dimv = self.dimv;
        let awx = self.vx.rows(0, dimv).into_owned();
        let awu = self.vu.rows(0, dimv).into_owned();
        mat.phix -= phia * awx;
        mat.phiu += phia * awu;
        res.phi += phia * self.w0.rows(0, dimv).into_owned();
    }

    /// Recover `(Δa, Δf, Δβ, Δμ)` from the state/input directions and the
    /// next grid's costate direction.
    pub fn expand(
        &self,
        qaa: &DMatrix<f64>,
        qff: &DMatrix<f64>,
        d: &mut SplitDirection,
        dlmd_next: &DVector<f64>,
    ) {
        let (dimv, dimf) = (self.dimv, self.dimf);
        // w = w₀ − V_x Δx + V_u Δu
        let mut w = self.w0.clone();
        w.gemv(-1.0, &self.vx, &d.dx, 1.0);
        if self.dimu > 0 {
            w.gemv(1.0, &self.vu, &d.du, 1.0);
        }
        d.da.copy_from(&w.rows(0, dimv));
        if dimf > 0 {
            d.df.copy_from(&(-w.rows(dimv, dimf)));
        }
        // [Δβ; Δμ] = T (g₀ − Q_blk w − E_λ Δλ')
        let mut rhs = self.g0.clone();
        rhs -= self.apply_qblk(qaa, qff, &w);
        for i in 0..dimv {
            rhs[i] -= self.ba_scale * dlmd_next[dimv + i];
        }
        let bm = &self.t * rhs;
        d.dbeta.copy_from(&bm.rows(0, dimv));
        if dimf > 0 {
            d.dmu.copy_from(&bm.rows(dimv, dimf));
        }
    }

    /// L1 norm of the inverse-dynamics and contact-constraint residuals.
    pub fn primal_residual_l1(&self) -> f64 {
        self.id_res.iter().map(|r| r.abs()).sum::<f64>()
            + self.c_res.iter().map(|r| r.abs()).sum::<f64>()
    }

    /// Squared norm of the inverse-dynamics and contact-constraint
    /// residuals.
    pub fn primal_residual_squared(&self) -> f64 {
        self.id_res.norm_squared() + self.c_res.norm_squared()
    }

    fn apply_qblk(
        &self,
        qaa: &DMatrix<f64>,
        qff: &DMatrix<f64>,
        w: &DVector<f64>,
    ) -> DVector<f64> {
        let (dimv, dimf) = (self.dimv, self.dimf);
        let mut out = DVector::zeros(dimv + dimf);
        out.rows_mut(0, dimv)
            .gemv(1.0, qaa, &w.rows(0, dimv), 0.0);
        if dimf > 0 {
            out.rows_mut(dimv, dimf)
                .gemv(1.0, qff, &w.rows(dimv, dimf), 0.0);
        }
        out
    }

    fn apply_qblk_mat(
        &self,
        qaa: &DMatrix<f64>,
        qff: &DMatrix<f64>,
        m: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        let (dimv, dimf) = (self.dimv, self.dimf);
        let mut out = DMatrix::zeros(dimv + dimf, m.ncols());
        out.view_mut((0, 0), (dimv, m.ncols()))
            .copy_from(&(qaa * m.rows(0, dimv)));
        if dimf > 0 {
            out.view_mut((dimv, 0), (dimf, m.ncols()))
                .copy_from(&(qff * m.rows(dimv, dimf)));
        }
        out
    }
}

/// Invert the contact-dynamics matrix, escalating a diagonal regularization
/// at degenerate contact configurations (rank-deficient Jacobian).
fn invert_contact_dynamics_matrix(cd: DMatrix<f64>) -> DMatrix<f64> {
    if let Some(inv) = cd.clone().try_inverse() {
        return inv;
    }
    let n = cd.nrows();
    let mut reg = 1.0e-9;
    loop {
        let mut cd_reg = cd.clone();
        for i in 0..n {
            cd_reg[(i, i)] += reg;
        }
        if let Some(inv) = cd_reg.try_inverse() {
            warn!(reg, "regularized singular contact-dynamics matrix");
            return inv;
        }
        reg *= 10.0;
        assert!(
            reg < 1.0e3,
            "contact-dynamics matrix is irrecoverably singular"
        );
    }
}
