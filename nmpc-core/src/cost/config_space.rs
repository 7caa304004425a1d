//! Weighted quadratic cost in configuration space.

use nalgebra::DVector;

use crate::contact::ContactStatus;
use crate::cost::CostTerm;
use crate::discretization::{Grid, GridType};
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::solution::SplitSolution;

/// Quadratic tracking cost on configuration, velocity, acceleration and
/// torques:
///
/// ```text
/// stage:    dt/2 · ( |q−q_ref|²_Wq + |v−v_ref|²_Wv + |a|²_Wa + |u|²_Wu )
/// impulse:  1/2 · ( |q−q_ref|²_Wqi + |v−v_ref|²_Wvi + |dv|²_Wdvi )
/// terminal: 1/2 · ( |q−q_ref|²_Wqf + |v−v_ref|²_Wvf )
/// ```
///
/// All weights are diagonal and default to zero.
#[derive(Debug, Clone)]
pub struct ConfigurationSpaceCost {
    dimq: usize,
    dimv: usize,
    q_ref: DVector<f64>,
    v_ref: DVector<f64>,
    q_weight: DVector<f64>,
    v_weight: DVector<f64>,
    a_weight: DVector<f64>,
    u_weight: DVector<f64>,
    qf_weight: DVector<f64>,
    vf_weight: DVector<f64>,
    qi_weight: DVector<f64>,
    vi_weight: DVector<f64>,
    dvi_weight: DVector<f64>,
}

impl ConfigurationSpaceCost {
    /// Zero-weight cost for a model with the given dimensions.
    pub fn new(dimq: usize, dimv: usize) -> Self {
        Self {
            dimq,
            dimv,
            q_ref: DVector::zeros(dimq),
            v_ref: DVector::zeros(dimv),
            q_weight: DVector::zeros(dimq),
            v_weight: DVector::zeros(dimv),
            a_weight: DVector::zeros(dimv),
            u_weight: DVector::zeros(dimv),
            qf_weight: DVector::zeros(dimq),
            vf_weight: DVector::zeros(dimv),
            qi_weight: DVector::zeros(dimq),
            vi_weight: DVector::zeros(dimv),
            dvi_weight: DVector::zeros(dimv),
        }
    }

    pub fn set_q_ref(&mut self, q_ref: DVector<f64>) {
        assert_eq!(q_ref.len(), self.dimq);
        self.q_ref = q_ref;
    }

    pub fn set_v_ref(&mut self, v_ref: DVector<f64>) {
        assert_eq!(v_ref.len(), self.dimv);
        self.v_ref = v_ref;
    }

    pub fn set_q_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimq);
        self.q_weight = w;
    }

    pub fn set_v_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.v_weight = w;
    }

    pub fn set_a_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.a_weight = w;
    }

    pub fn set_u_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.u_weight = w;
    }

    pub fn set_qf_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimq);
        self.qf_weight = w;
    }

    pub fn set_vf_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.vf_weight = w;
    }

    pub fn set_qi_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimq);
        self.qi_weight = w;
    }

    pub fn set_vi_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.vi_weight = w;
    }

    pub fn set_dvi_weight(&mut self, w: DVector<f64>) {
        assert_eq!(w.len(), self.dimv);
        self.dvi_weight = w;
    }

    fn quadratic(w: &DVector<f64>, x: &DVector<f64>, x_ref: &DVector<f64>) -> f64 {
        let mut cost = 0.0;
        for i in 0..w.len() {
            let e = x[i] - x_ref[i];
            cost += w[i] * e * e;
        }
        0.5 * cost
    }

    fn quadratic_zero_ref(w: &DVector<f64>, x: &DVector<f64>) -> f64 {
        0.5 * x
            .iter()
            .enumerate()
            .map(|(i, &xi)| w[i] * xi * xi)
            .sum::<f64>()
    }
}

impl CostTerm for ConfigurationSpaceCost {
    fn eval_stage_cost(&self, _status: &ContactStatus, grid: &Grid, s: &SplitSolution) -> f64 {
        match grid.ty {
            GridType::Impulse => {
                Self::quadratic(&self.qi_weight, &s.q, &self.q_ref)
                    + Self::quadratic(&self.vi_weight, &s.v, &self.v_ref)
                    + Self::quadratic_zero_ref(&self.dvi_weight, &s.a)
            }
            _ => {
                grid.dt
                    * (Self::quadratic(&self.q_weight, &s.q, &self.q_ref)
                        + Self::quadratic(&self.v_weight, &s.v, &self.v_ref)
                        + Self::quadratic_zero_ref(&self.a_weight, &s.a)
                        + Self::quadratic_zero_ref(&self.u_weight, &s.u))
            }
        }
    }

    fn quadratize_stage_cost(
        &self,
        status: &ContactStatus,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64 {
        let dimv = self.dimv;
        match grid.ty {
            GridType::Impulse => {
                for i in 0..dimv {
                    let eq = s.q[i] - self.q_ref[i];
                    res.lx[i] += self.qi_weight[i] * eq;
                    mat.qxx[(i, i)] += self.qi_weight[i];
                    let ev = s.v[i] - self.v_ref[i];
                    res.lx[dimv + i] += self.vi_weight[i] * ev;
                    mat.qxx[(dimv + i, dimv + i)] += self.vi_weight[i];
                    res.la[i] += self.dvi_weight[i] * s.a[i];
                    mat.qaa[(i, i)] += self.dvi_weight[i];
                }
            }
            _ => {
                let dt = grid.dt;
                for i in 0..dimv {
                    let eq = s.q[i] - self.q_ref[i];
                    res.lx[i] += dt * self.q_weight[i] * eq;
                    mat.qxx[(i, i)] += dt * self.q_weight[i];
                    let ev = s.v[i] - self.v_ref[i];
                    res.lx[dimv + i] += dt * self.v_weight[i] * ev;
                    mat.qxx[(dimv + i, dimv + i)] += dt * self.v_weight[i];
                    res.la[i] += dt * self.a_weight[i] * s.a[i];
                    mat.qaa[(i, i)] += dt * self.a_weight[i];
                    res.lu[i] += dt * self.u_weight[i] * s.u[i];
                    mat.quu[(i, i)] += dt * self.u_weight[i];
                }
            }
        }
        self.eval_stage_cost(status, grid, s)
    }

    fn eval_terminal_cost(&self, _grid: &Grid, s: &SplitSolution) -> f64 {
        Self::quadratic(&self.qf_weight, &s.q, &self.q_ref)
            + Self::quadratic(&self.vf_weight, &s.v, &self.v_ref)
    }

    fn quadratize_terminal_cost(
        &self,
        grid: &Grid,
        s: &SplitSolution,
        res: &mut SplitKktResidual,
        mat: &mut SplitKktMatrix,
    ) -> f64 {
        let dimv = self.dimv;
        for i in 0..dimv {
            let eq = s.q[i] - self.q_ref[i];
            res.lx[i] += self.qf_weight[i] * eq;
            mat.qxx[(i, i)] += self.qf_weight[i];
            let ev = s.v[i] - self.v_ref[i];
            res.lx[dimv + i] += self.vf_weight[i] * ev;
            mat.qxx[(dimv + i, dimv + i)] += self.vf_weight[i];
        }
        self.eval_terminal_cost(grid, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;
    use crate::kkt::StageDims;

    fn dims() -> StageDims {
        StageDims {
            dimv: 2,
            dimx: 4,
            dima: 2,
            dimf: 0,
            dimu: 2,
            dims: 0,
        }
    }

    fn status() -> ContactStatus {
        ContactStatus::new(vec![ContactType::Point; 0])
    }

    #[test]
    fn test_stage_cost_scales_with_dt() {
        let mut cost = ConfigurationSpaceCost::new(2, 2);
        cost.set_q_weight(DVector::from_element(2, 2.0));
        let mut s = SplitSolution::new(2, dims());
        s.q[0] = 1.0;
        let grid = Grid::new(0, GridType::Intermediate, 0.0, 0.1, 0);
        let c = cost.eval_stage_cost(&status(), &grid, &s);
        assert!((c - 0.1 * 1.0).abs() < 1.0e-14);
    }

    #[test]
    fn test_quadratize_matches_eval_gradient() {
        let mut cost = ConfigurationSpaceCost::new(2, 2);
        cost.set_v_weight(DVector::from_element(2, 3.0));
        cost.set_u_weight(DVector::from_element(2, 1.0));
        let mut s = SplitSolution::new(2, dims());
        s.v[1] = 2.0;
        s.u[0] = -1.0;
        let grid = Grid::new(0, GridType::Intermediate, 0.0, 0.5, 0);
        let mut res = SplitKktResidual::new(dims());
        let mut mat = SplitKktMatrix::new(dims());
        let c = cost.quadratize_stage_cost(&status(), &grid, &s, &mut res, &mut mat);
        assert!((c - 0.5 * (0.5 * 3.0 * 4.0 + 0.5 * 1.0)).abs() < 1.0e-14);
        assert!((res.lx[3] - 0.5 * 3.0 * 2.0).abs() < 1.0e-14);
        assert!((res.lu[0] - 0.5 * 1.0 * (-1.0)).abs() < 1.0e-14);
        assert!((mat.qxx[(3, 3)] - 1.5).abs() < 1.0e-14);
        assert!((mat.quu[(0, 0)] - 0.5).abs() < 1.0e-14);
    }

    #[test]
    fn test_terminal_cost_uses_terminal_weights() {
        let mut cost = ConfigurationSpaceCost::new(1, 1);
        cost.set_q_ref(DVector::from_element(1, 1.0));
        cost.set_qf_weight(DVector::from_element(1, 10.0));
        let d = StageDims {
            dimv: 1,
            dimx: 2,
            dima: 0,
            dimf: 0,
            dimu: 0,
            dims: 0,
        };
        let s = SplitSolution::new(1, d);
        let grid = Grid::new(0, GridType::Terminal, 1.0, 0.0, 0);
        let c = cost.eval_terminal_cost(&grid, &s);
        assert!((c - 5.0).abs() < 1.0e-14);
    }
}
