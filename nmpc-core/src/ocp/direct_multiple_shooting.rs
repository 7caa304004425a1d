//! Horizon-wide operations over the per-grid stages.
//!
//! The per-grid KKT evaluation and the per-grid direction expansion /
//! step-size computation are data-parallel across grids: the horizon is
//! split into contiguous chunks, one worker per chunk, and each worker owns
//! a private robot-model instance. This per-worker model cloning is the
//! system's alternative to locking a shared kinematics cache. The Riccati
//! sweeps between these two phases stay sequential.

use nalgebra::DVector;

use crate::constraints::Constraints;
use crate::contact::{ContactSequence, ContactStatus};
use crate::cost::CostFunction;
use crate::discretization::{Grid, GridType, TimeDiscretization};
use crate::kkt::{SplitKktMatrix, SplitKktResidual};
use crate::ocp::performance_index::PerformanceIndex;
use crate::ocp::solution::{SplitDirection, SplitSolution};
use crate::ocp::split_ocp::{
    self, StageData, SwitchingContext, eval_stage_kkt, eval_terminal_kkt,
};
use crate::robot::RobotModel;

/// Direct multiple-shooting operations over the whole grid sequence.
#[derive(Debug, Clone)]
pub struct DirectMultipleShooting {
    nthreads: usize,
}

/// Contact status governing one grid's stage problem.
pub(crate) fn stage_status<'a>(
    seq: &'a ContactSequence,
    disc: &TimeDiscretization,
    grid: &Grid,
) -> &'a ContactStatus {
    match grid.ty {
        GridType::Impulse => {
            let idx = grid
                .impulse_index
                .expect("impulse grid without impulse index");
            &seq.event(disc.impulse_event(idx)).impulse_status
        }
        _ => seq.contact_status(grid.contact_phase),
    }
}

/// Switching context of grid `i`, if flagged.
pub(crate) fn switching_context<'a>(
    seq: &'a ContactSequence,
    disc: &TimeDiscretization,
    i: usize,
) -> Option<SwitchingContext<'a>> {
    let grids = disc.grids();
    let grid = &grids[i];
    if !grid.switching_constraint || i + 2 >= grids.len() {
        return None;
    }
    let imp_idx = grids[i + 2].impulse_index?;
    Some(SwitchingContext {
        impulse_status: &seq.event(disc.impulse_event(imp_idx)).impulse_status,
        dt1: grid.dt,
        dt2: grids[i + 1].dt,
    })
}

impl DirectMultipleShooting {
    pub fn new(nthreads: usize) -> Self {
        debug_assert!(nthreads > 0);
        Self { nthreads }
    }

    /// Interior-point initialization of every grid's constraint data.
    pub fn init_constraints(
        &self,
        constraints: &Constraints,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
        data: &mut [StageData],
    ) {
        for (i, grid) in disc.grids().iter().enumerate() {
            if grid.ty == GridType::Terminal {
                continue;
            }
            let status = stage_status(seq, disc, grid);
            constraints.set_slack_and_dual(
                grid.ty,
                status,
                &mut data[i].constraints_data,
                &s[i],
            );
        }
    }

    /// Whether the current solution is strictly feasible on every grid.
    pub fn is_feasible(
        &self,
        constraints: &Constraints,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
    ) -> bool {
        disc.grids()
            .iter()
            .enumerate()
            .filter(|(_, g)| g.ty != GridType::Terminal)
            .all(|(i, grid)| {
                constraints.is_feasible(grid.ty, stage_status(seq, disc, grid), &s[i])
            })
    }

    /// Evaluate the KKT system of every grid, in parallel chunks.
    #[allow(clippy::too_many_arguments)] // horizon-wide evaluation touches every buffer family
    pub fn eval_kkt<R: RobotModel>(
        &self,
        robots: &mut [R],
        cost: &CostFunction,
        constraints: &Constraints,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
        data: &mut [StageData],
        mats: &mut [SplitKktMatrix],
        ress: &mut [SplitKktResidual],
    ) -> PerformanceIndex {
        let grids = disc.grids();
        let n = grids.len();
        debug_assert!(s.len() >= n && data.len() >= n && mats.len() >= n && ress.len() >= n);

        let mut work: Vec<(usize, &mut StageData, &mut SplitKktMatrix, &mut SplitKktResidual)> =
            data[..n]
                .iter_mut()
                .zip(mats[..n].iter_mut())
                .zip(ress[..n].iter_mut())
                .enumerate()
                .map(|(i, ((d, m), r))| (i, d, m, r))
                .collect();

        let nworkers = self.nthreads.min(n).max(1);
        let chunk_size = n.div_ceil(nworkers);
        let mut partials = vec![PerformanceIndex::default(); nworkers];

        rayon::scope(|sc| {
            let mut rest: &mut [(usize, &mut StageData, &mut SplitKktMatrix, &mut SplitKktResidual)] =
                &mut work;
            for (robot, partial) in robots.iter_mut().zip(partials.iter_mut()) {
                let take = chunk_size.min(rest.len());
                if take == 0 {
                    break;
                }
                let (chunk, tail) = rest.split_at_mut(take);
                rest = tail;
                sc.spawn(move |_| {
                    for (i, sd, mat, res) in chunk.iter_mut() {
                        let i = *i;
                        let grid = &grids[i];
                        let perf = if grid.ty == GridType::Terminal {
                            eval_terminal_kkt(robot, cost, grid, &s[i], mat, res)
                        } else {
                            eval_stage_kkt(
                                robot,
                                cost,
                                constraints,
                                grid,
                                stage_status(seq, disc, grid),
                                switching_context(seq, disc, i),
                                &s[i],
                                &s[i + 1],
                                sd,
                                mat,
                                res,
                            )
                        };
                        *partial += perf;
                    }
                });
            }
        });

        let mut total = PerformanceIndex::default();
        for p in partials {
            total += p;
        }
        total
    }

    /// Expand the Riccati directions into accelerations, forces, multipliers
    /// and slack/dual directions, and compute the global step-size caps.
    /// Parallel across grids; returns `(max_primal, max_dual)`.
    #[allow(clippy::too_many_arguments)]
    pub fn expand_directions(
        &self,
        constraints: &Constraints,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
        mats: &[SplitKktMatrix],
        data: &mut [StageData],
        d: &mut [SplitDirection],
        dlmd_next: &[DVector<f64>],
        tau: f64,
    ) -> (f64, f64) {
        let grids = disc.grids();
        let n = grids.len();
        let mut work: Vec<(usize, &mut StageData, &mut SplitDirection)> = data[..n]
            .iter_mut()
            .zip(d[..n].iter_mut())
            .enumerate()
            .map(|(i, (sd, di))| (i, sd, di))
            .collect();

        let nworkers = self.nthreads.min(n).max(1);
        let chunk_size = n.div_ceil(nworkers);
        let mut caps = vec![(1.0_f64, 1.0_f64); nworkers];

        rayon::scope(|sc| {
            let mut rest: &mut [(usize, &mut StageData, &mut SplitDirection)] = &mut work;
            for cap in caps.iter_mut() {
                let take = chunk_size.min(rest.len());
                if take == 0 {
                    break;
                }
                let (chunk, tail) = rest.split_at_mut(take);
                rest = tail;
                sc.spawn(move |_| {
                    for (i, sd, di) in chunk.iter_mut() {
                        let i = *i;
                        let grid = &grids[i];
                        if grid.ty == GridType::Terminal {
                            continue;
                        }
                        sd.contact_dynamics.expand(
                            &mats[i].qaa,
                            &mats[i].qff,
                            di,
                            &dlmd_next[i],
                        );
                        let status = stage_status(seq, disc, grid);
                        constraints.expand_slack_and_dual(
                            grid.ty,
                            status,
                            &mut sd.constraints_data,
                            &s[i],
                            di,
                        );
                        cap.0 = cap.0.min(sd.constraints_data.max_primal_step_size(tau));
                        cap.1 = cap.1.min(sd.constraints_data.max_dual_step_size(tau));
                    }
                });
            }
        });

        caps.into_iter()
            .fold((1.0, 1.0), |acc, c| (acc.0.min(c.0), acc.1.min(c.1)))
    }

    /// Apply the primal and dual steps to the whole trajectory.
    pub fn integrate_solution<R: RobotModel>(
        &self,
        robots: &[R],
        disc: &TimeDiscretization,
        primal_step_size: f64,
        dual_step_size: f64,
        d: &[SplitDirection],
        s: &mut [SplitSolution],
        data: &mut [StageData],
    ) {
        let model = &robots[0];
        for (i, _grid) in disc.grids().iter().enumerate() {
            split_ocp::update_primal(model, primal_step_size, &d[i], &mut s[i]);
            data[i].constraints_data.update_slack(primal_step_size);
            data[i].constraints_data.update_dual(dual_step_size);
        }
    }

    /// Total cost of the current solution.
    pub fn total_cost(
        &self,
        cost: &CostFunction,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
    ) -> f64 {
        let grids = disc.grids();
        let mut total = 0.0;
        for (i, grid) in grids.iter().enumerate() {
            if grid.ty == GridType::Terminal {
                total += cost.eval_terminal_cost(grid, &s[i]);
            } else {
                total += cost.eval_stage_cost(stage_status(seq, disc, grid), grid, &s[i]);
            }
        }
        total
    }

    /// Cost and raw constraint violation of the trial iterate `s ⊕ α d`.
    #[allow(clippy::too_many_arguments)]
    pub fn trial_cost_and_violation<R: RobotModel>(
        &self,
        robots: &[R],
        cost: &CostFunction,
        constraints: &Constraints,
        disc: &TimeDiscretization,
        seq: &ContactSequence,
        s: &[SplitSolution],
        d: &[SplitDirection],
        step_size: f64,
        s_trial: &mut [SplitSolution],
    ) -> (f64, f64) {
        let model = &robots[0];
        let grids = disc.grids();
        let n = grids.len();
        for i in 0..n {
            split_ocp::trial_primal(model, step_size, &s[i], &d[i], &mut s_trial[i]);
        }
        let mut total_cost = 0.0;
        let mut violation = 0.0;
        for (i, grid) in grids.iter().enumerate() {
            if grid.ty == GridType::Terminal {
                total_cost += cost.eval_terminal_cost(grid, &s_trial[i]);
            } else {
                let status = stage_status(seq, disc, grid);
                total_cost += cost.eval_stage_cost(status, grid, &s_trial[i]);
                violation +=
                    split_ocp::trial_dynamics_violation(model, grid, &s_trial[i], &s_trial[i + 1]);
                violation += constraints.violation_l1(grid.ty, status, &s_trial[i]);
            }
        }
        (total_cost, violation)
    }

    /// Initial-state direction `Δx₀ = (q ⊖ q̄₀, v − v̄₀)`.
    pub fn initial_state_direction<R: RobotModel>(
        &self,
        model: &R,
        q: &DVector<f64>,
        v: &DVector<f64>,
        s0: &SplitSolution,
        dx0: &mut DVector<f64>,
    ) {
        let dimv = v.len();
        let mut dq = DVector::zeros(dimv);
        model.subtract_config(q, &s0.q, &mut dq);
        for i in 0..dimv {
            dx0[i] = dq[i];
            dx0[dimv + i] = v[i] - s0.v[i];
        }
    }
}
