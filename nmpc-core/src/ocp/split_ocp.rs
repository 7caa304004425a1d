//! Per-grid KKT construction and solution updates.
//!
//! The stage evaluation follows a fixed order: kinematics update, cost
//! quadratization, constraint linearization and condensation, discrete
//! dynamics residual and contact-dynamics condensation, performance-index
//! accumulation. The terminal grid uses a reduced path with cost blocks
//! only: no dynamics and no inequality terms.

use nalgebra::DVector;

use crate::constraints::Constraints;
use crate::contact::ContactStatus;
use crate::cost::CostFunction;
use crate::discretization::{Grid, GridType};
use crate::dynamics::state_equation;
use crate::dynamics::{ContactDynamicsData, SwitchingConstraintData};
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::performance_index::PerformanceIndex;
use crate::ocp::solution::{SplitDirection, SplitSolution};
use crate::robot::RobotModel;

/// Per-grid mutable evaluation state: constraint slack/dual data, contact
/// dynamics products, and the optional switching-constraint data.
#[derive(Debug, Clone)]
pub struct StageData {
    pub constraints_data: crate::constraints::ConstraintsData,
    pub contact_dynamics: ContactDynamicsData,
    pub switching: Option<SwitchingConstraintData>,
    /// Contact phase the data was sized for; a mismatch triggers recreation.
    pub contact_phase: usize,
}

/// Switching-constraint context of a flagged grid: the impulse status two
/// grids ahead and the two intervening time steps.
pub struct SwitchingContext<'a> {
    pub impulse_status: &'a ContactStatus,
    pub dt1: f64,
    pub dt2: f64,
}

/// Evaluate the KKT blocks of one non-terminal grid.
#[allow(clippy::too_many_arguments)] // stage evaluation spans every per-grid buffer
pub fn eval_stage_kkt<R: RobotModel>(
    model: &mut R,
    cost: &CostFunction,
    constraints: &Constraints,
    grid: &Grid,
    status: &ContactStatus,
    switching: Option<SwitchingContext<'_>>,
    s: &SplitSolution,
    s_next: &SplitSolution,
    data: &mut StageData,
    mat: &mut SplitKktMatrix,
    res: &mut SplitKktResidual,
) -> PerformanceIndex {
    mat.set_zero();
    res.set_zero();
    model.update_kinematics(&s.q, &s.v);

    let cost_value = cost.quadratize_stage_cost(status, grid, s, res, mat);

    constraints.linearize_constraints(grid.ty, status, &mut data.constraints_data, s, res);
    constraints.condense_slack_and_dual(grid.ty, status, &data.constraints_data, s, mat, res);

    match grid.ty {
        GridType::Impulse => {
            state_equation::eval_impulse(model, s, s_next, res);
            state_equation::add_costate_residual_impulse(s, &s_next.lmd, res);
            data.contact_dynamics.eval_impulse(model, status, s, res);
        }
        _ => {
            state_equation::eval_stage(model, grid.dt, s, s_next, res);
            state_equation::add_costate_residual_stage(grid.dt, s, &s_next.lmd, res);
            data.contact_dynamics.eval_stage(model, status, grid.dt, s, res);
        }
    }

    if let Some(ctx) = &switching {
        if let Some(sw) = data.switching.as_mut() {
            sw.eval(model, ctx.impulse_status, ctx.dt1, ctx.dt2, s, mat, res);
        }
    }

    // Metrics from the pre-condensation (true) residuals.
    let perf = PerformanceIndex {
        cost: cost_value,
        cost_barrier: data.constraints_data.barrier_cost(constraints.barrier()),
        primal_feasibility: res.constraint_violation()
            + data.contact_dynamics.primal_residual_l1()
            + data.constraints_data.residual_l1_norm(),
        dual_feasibility: res.lx.iter().map(|r| r.abs()).sum::<f64>()
            + res.la.iter().map(|r| r.abs()).sum::<f64>()
            + res.lf.iter().map(|r| r.abs()).sum::<f64>()
            + res.lu.iter().map(|r| r.abs()).sum::<f64>(),
        kkt_error: res.squared_norm()
            + data.contact_dynamics.primal_residual_squared()
            + data.constraints_data.squared_kkt_norm(),
    };

    data.contact_dynamics.condense(mat, res);
    if switching.is_some() {
        if let Some(sw) = &data.switching {
            data.contact_dynamics.condense_switching(&sw.phia, mat, res);
        }
    }
    perf
}

/// Evaluate the terminal grid: cost Hessian/gradient only.
pub fn eval_terminal_kkt<R: RobotModel>(
    model: &mut R,
    cost: &CostFunction,
    grid: &Grid,
    s: &SplitSolution,
    mat: &mut SplitKktMatrix,
    res: &mut SplitKktResidual,
) -> PerformanceIndex {
    mat.set_zero();
    res.set_zero();
    model.update_kinematics(&s.q, &s.v);
    let cost_value = cost.quadratize_terminal_cost(grid, s, res, mat);
    // Stationarity: ∇φ − λ.
    res.lx -= &s.lmd;
    PerformanceIndex {
        cost: cost_value,
        dual_feasibility: res.lx.iter().map(|r| r.abs()).sum(),
        kkt_error: res.lx.norm_squared(),
        ..Default::default()
    }
}

/// Apply the primal step to one grid's solution.
pub fn update_primal<R: RobotModel>(
    model: &R,
    step_size: f64,
    d: &SplitDirection,
    s: &mut SplitSolution,
) {
    let dimv = s.v.len();
    let dq = d.dx.rows(0, dimv).into_owned();
    let q_prev = s.q.clone();
    model.integrate_config(&q_prev, &dq, step_size, &mut s.q);
    s.v.axpy(step_size, &d.dx.rows(dimv, dimv).into_owned(), 1.0);
    s.a.axpy(step_size, &d.da, 1.0);
    if !s.u.is_empty() {
        s.u.axpy(step_size, &d.du, 1.0);
    }
    if !s.f.is_empty() {
        s.f.axpy(step_size, &d.df, 1.0);
    }
    s.lmd.axpy(step_size, &d.dlmd, 1.0);
    s.beta.axpy(step_size, &d.dbeta, 1.0);
    if !s.mu.is_empty() {
        s.mu.axpy(step_size, &d.dmu, 1.0);
    }
    if !s.xi.is_empty() {
        s.xi.axpy(step_size, &d.dxi, 1.0);
    }
}

/// Build a trial solution `s ⊕ α d` for the line search (primal state
/// blocks only).
pub fn trial_primal<R: RobotModel>(
    model: &R,
    step_size: f64,
    s: &SplitSolution,
    d: &SplitDirection,
    trial: &mut SplitSolution,
) {
    let dimv = s.v.len();
    let dq = d.dx.rows(0, dimv).into_owned();
    model.integrate_config(&s.q, &dq, step_size, &mut trial.q);
    trial.v.copy_from(&s.v);
    trial.v.axpy(step_size, &d.dx.rows(dimv, dimv).into_owned(), 1.0);
    trial.a.copy_from(&s.a);
    trial.a.axpy(step_size, &d.da, 1.0);
    if !s.u.is_empty() {
        trial.u.copy_from(&s.u);
        trial.u.axpy(step_size, &d.du, 1.0);
    }
    if !s.f.is_empty() {
        trial.f.copy_from(&s.f);
        trial.f.axpy(step_size, &d.df, 1.0);
    }
}

/// Raw dynamics violation of a trial pair `(s, s_next)` for the filter:
/// L1 norm of the state-equation residual.
pub fn trial_dynamics_violation<R: RobotModel>(
    model: &R,
    grid: &Grid,
    s: &SplitSolution,
    s_next: &SplitSolution,
) -> f64 {
    let dimv = s.v.len();
    let mut violation = 0.0;
    let mut q_pred = DVector::zeros(s.q.len());
    let mut fq = DVector::zeros(dimv);
    match grid.ty {
        GridType::Impulse => {
            model.subtract_config(&s.q, &s_next.q, &mut fq);
            for i in 0..dimv {
                violation += fq[i].abs() + (s.v[i] + s.a[i] - s_next.v[i]).abs();
            }
        }
        _ => {
            model.integrate_config(&s.q, &s.v, grid.dt, &mut q_pred);
            model.subtract_config(&q_pred, &s_next.q, &mut fq);
            for i in 0..dimv {
                violation += fq[i].abs() + (s.v[i] + grid.dt * s.a[i] - s_next.v[i]).abs();
            }
        }
    }
    violation
}
