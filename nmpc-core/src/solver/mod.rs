//! Solver driver: the outer Newton loop.

pub mod statistics;

pub use statistics::SolverStatistics;

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::constraints::Constraints;
use crate::contact::ContactSequence;
use crate::cost::CostFunction;
use crate::discretization::{GridType, TimeDiscretization};
use crate::dynamics::{ContactDynamicsData, SwitchingConstraintData};
use crate::error::{SolverError, SolverResult};
use crate::kkt::{SplitKktMatrix, SplitKktResidual, StageDims};
use crate::line_search::{LineSearch, LineSearchSettings};
use crate::ocp::direct_multiple_shooting::{stage_status, switching_context};
use crate::ocp::{
    DirectMultipleShooting, PerformanceIndex, SplitDirection, SplitSolution, StageData,
};
use crate::riccati::{
    backward_riccati, forward_riccati, RiccatiFactorization, RiccatiRegularization,
};
use crate::robot::RobotModel;
use crate::settings::{DiscretizationMethod, SolverSettings};

/// Receding-horizon optimal-control solver over a hybrid contact schedule.
///
/// One instance exclusively owns its grid sequence, KKT buffers and solution
/// trajectory. Buffer growth happens only at safe points (discretization and
/// mesh refinement, between Newton iterations); the parallel KKT evaluation
/// holds raw views into these buffers and never observes a resize.
pub struct OcpSolver<R: RobotModel> {
    settings: SolverSettings,
    /// One model instance per worker thread.
    robots: Vec<R>,
    contact_sequence: ContactSequence,
    cost: CostFunction,
    constraints: Constraints,
    discretization: TimeDiscretization,
    dms: DirectMultipleShooting,
    line_search: LineSearch,
    reg: RiccatiRegularization,

    // Per-grid buffers, indexed like the grid sequence.
    s: Vec<SplitSolution>,
    d: Vec<SplitDirection>,
    data: Vec<StageData>,
    mats: Vec<SplitKktMatrix>,
    ress: Vec<SplitKktResidual>,
    facts: Vec<RiccatiFactorization>,
    dlmd_scratch: Vec<DVector<f64>>,
    s_trial: Vec<SplitSolution>,
    dx0: DVector<f64>,

    prev_grid_times: Vec<f64>,
    constraints_initialized: bool,
    kkt_error: f64,
    perf: PerformanceIndex,
}

impl<R: RobotModel> OcpSolver<R> {
    /// Construct a solver for `robot` over a horizon of length `horizon`
    /// with `n_nominal` nominal grids.
    ///
    /// All configuration is validated eagerly; invalid values abort the
    /// construction instead of being clamped.
    pub fn new(
        robot: R,
        contact_sequence: ContactSequence,
        cost: CostFunction,
        mut constraints: Constraints,
        horizon: f64,
        n_nominal: usize,
        settings: SolverSettings,
    ) -> SolverResult<Self> {
        settings.validate()?;
        if robot.dimu() != robot.dimv() {
            return Err(SolverError::InvalidArgument(format!(
                "the solver assumes full actuation: dimu = {} but dimv = {}",
                robot.dimu(),
                robot.dimv()
            )));
        }
        if contact_sequence.contact_status(0).num_contacts() != robot.max_num_contacts() {
            return Err(SolverError::InvalidArgument(format!(
                "contact sequence has {} contacts, robot has {}",
                contact_sequence.contact_status(0).num_contacts(),
                robot.max_num_contacts()
            )));
        }
        let discretization =
            TimeDiscretization::new(horizon, n_nominal, settings.discretization_method)?;
        constraints.set_barrier(settings.barrier_param);
        constraints.set_fraction_to_boundary_rate(settings.fraction_to_boundary_rate);

        let dimx = 2 * robot.dimv();
        let mut solver = Self {
            robots: vec![robot; settings.nthreads],
            contact_sequence,
            cost,
            constraints,
            discretization,
            dms: DirectMultipleShooting::new(settings.nthreads),
            line_search: LineSearch::new(LineSearchSettings::default()),
            reg: RiccatiRegularization::new(settings.max_dts_riccati),
            s: Vec::new(),
            d: Vec::new(),
            data: Vec::new(),
            mats: Vec::new(),
            ress: Vec::new(),
            facts: Vec::new(),
            dlmd_scratch: Vec::new(),
            s_trial: Vec::new(),
            dx0: DVector::zeros(dimx),
            prev_grid_times: Vec::new(),
            constraints_initialized: false,
            kkt_error: f64::INFINITY,
            perf: PerformanceIndex::default(),
            settings,
        };
        // Size the buffers for the initial horizon so that solution setters
        // work before the first solve.
        solver.discretize_and_sync(0.0)?;
        Ok(solver)
    }

    /// Reserve buffer capacity for up to `n_events` discrete events.
    pub fn reserve(&mut self, n_events: usize) {
        self.discretization.reserve(n_events);
    }

    /// Replace the line-search settings.
    pub fn set_line_search_settings(&mut self, settings: LineSearchSettings) {
        self.line_search.set(settings);
    }

    /// The current discretization.
    pub fn discretization(&self) -> &TimeDiscretization {
        &self.discretization
    }

    /// The contact sequence.
    pub fn contact_sequence(&self) -> &ContactSequence {
        &self.contact_sequence
    }

    /// Mutable access to the contact sequence (push/pop events between
    /// solves). The next `solve()` re-discretizes against the new schedule.
    pub fn contact_sequence_mut(&mut self) -> &mut ContactSequence {
        &mut self.contact_sequence
    }

    /// Squared norm of the KKT residual of the last evaluated iterate.
    pub fn kkt_error(&self) -> f64 {
        self.kkt_error
    }

    /// Total cost of the current solution.
    pub fn cost(&self) -> f64 {
        self.dms.total_cost(
            &self.cost,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
        )
    }

    /// Performance metrics of the last evaluated iterate.
    pub fn performance(&self) -> &PerformanceIndex {
        &self.perf
    }

    /// Solution at one grid.
    pub fn get_solution(&self, stage: usize) -> &SplitSolution {
        &self.s[stage]
    }

    /// Extract one solution field (`"q"`, `"v"`, `"a"`, `"u"`, `"f"`) over
    /// all grids. Forces are zero-padded to `3 × max_num_contacts`.
    pub fn get_solution_by_name(&self, name: &str) -> SolverResult<Vec<DVector<f64>>> {
        let n = self.discretization.n_grids();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let grid = self.discretization.grid(i);
            let s = &self.s[i];
            match name {
                "q" => out.push(s.q.clone()),
                "v" => out.push(s.v.clone()),
                "a" => out.push(s.a.clone()),
                "u" => out.push(s.u.clone()),
                "f" => {
                    let max = self.robots[0].max_num_contacts();
                    let mut f = DVector::zeros(3 * max);
                    if grid.ty != GridType::Terminal {
                        let status =
                            stage_status(&self.contact_sequence, &self.discretization, grid);
                        for c in 0..max {
                            if let Some((off, _)) = status.force_segment(c) {
                                for k in 0..3 {
                                    f[3 * c + k] = s.f[off + k];
                                }
                            }
                        }
                    }
                    out.push(f);
                }
                _ => {
                    return Err(SolverError::InvalidArgument(format!(
                        "unknown solution field: {name} (expected q, v, a, u or f)"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Set one solution field on every grid. `"f"` sets each active
    /// contact's force segment to `value` (length 3).
    pub fn set_solution(&mut self, name: &str, value: &DVector<f64>) -> SolverResult<()> {
        let dimq = self.robots[0].dimq();
        let dimv = self.robots[0].dimv();
        match name {
            "q" => {
                if value.len() != dimq {
                    return Err(SolverError::InvalidArgument(format!(
                        "q has length {}, expected {dimq}",
                        value.len()
                    )));
                }
                for s in &mut self.s {
                    s.q.copy_from(value);
                }
            }
            "v" => {
                if value.len() != dimv {
                    return Err(SolverError::InvalidArgument(format!(
                        "v has length {}, expected {dimv}",
                        value.len()
                    )));
                }
                for s in &mut self.s {
                    s.v.copy_from(value);
                }
            }
            "a" => {
                for s in &mut self.s {
                    if s.a.len() == value.len() {
                        s.a.copy_from(value);
                    }
                }
            }
            "u" => {
                for s in &mut self.s {
                    if s.u.len() == value.len() {
                        s.u.copy_from(value);
                    }
                }
            }
            "f" => {
                if value.len() != 3 {
                    return Err(SolverError::InvalidArgument(
                        "f expects one 3D force applied to every active contact".into(),
                    ));
                }
                let n = self.discretization.n_grids();
                for i in 0..n {
                    let grid = self.discretization.grid(i);
                    if grid.ty == GridType::Terminal {
                        continue;
                    }
                    let status =
                        stage_status(&self.contact_sequence, &self.discretization, grid).clone();
                    for c in 0..status.num_contacts() {
                        if let Some((off, _)) = status.force_segment(c) {
                            for k in 0..3 {
                                self.s[i].f[off + k] = value[k];
                            }
                        }
                    }
                }
            }
            _ => {
                return Err(SolverError::InvalidArgument(format!(
                    "unknown solution field: {name} (expected q, v, a, u or f)"
                )))
            }
        }
        Ok(())
    }

    /// State-feedback gain of one stage, usable as a local controller
    /// between solver calls.
    pub fn state_feedback_gain(&self, stage: usize) -> &DMatrix<f64> {
        &self.facts[stage].k
    }

    /// Whether the current solution is strictly feasible.
    pub fn is_current_solution_feasible(&self) -> bool {
        self.dms.is_feasible(
            &self.constraints,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
        )
    }

    /// Discretize at `t` and initialize all interior-point slack/dual
    /// variables from the current solution.
    pub fn init_constraints(&mut self, t: f64) -> SolverResult<()> {
        self.discretize_and_sync(t)?;
        self.dms.init_constraints(
            &self.constraints,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
            &mut self.data,
        );
        self.constraints_initialized = true;
        Ok(())
    }

    /// Re-derive the node spacing when the mesh has degraded. Only callable
    /// between Newton iterations.
    pub fn mesh_refinement(&mut self, t: f64) -> SolverResult<()> {
        self.discretization.mesh_refinement(
            &self.contact_sequence,
            t,
            self.settings.max_dt_mesh,
        )?;
        self.after_regrid();
        Ok(())
    }

    /// Evaluate the KKT residual of the current solution at `(t, q, v)`
    /// without taking a step.
    pub fn compute_kkt_residual(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> SolverResult<f64> {
        self.validate_state(q, v)?;
        self.discretize_and_sync(t)?;
        let perf = self.dms.eval_kkt(
            &mut self.robots,
            &self.cost,
            &self.constraints,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
            &mut self.data,
            &mut self.mats,
            &mut self.ress,
        );
        self.dms
            .initial_state_direction(&self.robots[0], q, v, &self.s[0], &mut self.dx0);
        self.kkt_error = perf.kkt_error + self.dx0.norm_squared();
        self.perf = perf;
        Ok(self.kkt_error)
    }

    /// One Newton iteration: discretize, build the KKT system, run the
    /// backward/forward Riccati sweeps, select step sizes and update the
    /// solution.
    ///
    /// When inequality constraints are registered, call
    /// [`Self::init_constraints`] once before iterating manually; `solve`
    /// does this on its own.
    pub fn update_solution(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> SolverResult<()> {
        self.validate_state(q, v)?;
        self.discretize_and_sync(t)?;
        self.newton_iteration(q, v);
        Ok(())
    }

    /// Solve the receding-horizon problem at `(t, q, v)`.
    ///
    /// Iterates to the KKT tolerance or the iteration cap. Non-convergence
    /// is reported through the returned statistics, not as an error: the
    /// best available direction has already been applied to the stored
    /// solution (anytime behavior).
    pub fn solve(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> SolverResult<SolverStatistics> {
        self.validate_state(q, v)?;
        let start = Instant::now();
        let mut stats = SolverStatistics::default();
        self.reg.reset();
        self.discretize_and_sync(t)?;
        if !self.constraints_initialized {
            self.dms.init_constraints(
                &self.constraints,
                &self.discretization,
                &self.contact_sequence,
                &self.s,
                &mut self.data,
            );
            self.constraints_initialized = true;
        }
        if self.settings.verbose {
            eprintln!("iter       kkt_error    alpha_p  alpha_d");
        }

        while stats.iterations < self.settings.max_iter {
            let (kkt_before, alpha_p, alpha_d) = self.newton_iteration(q, v);
            stats.record_iteration(kkt_before, alpha_p, alpha_d);
            if self.settings.verbose {
                eprintln!(
                    "{:4}  {:14.6e}  {:7.4}  {:7.4}",
                    stats.iterations, kkt_before, alpha_p, alpha_d
                );
            }

            // A converging iterate on a degraded mesh is re-gridded instead
            // of being declared optimal.
            if self.settings.discretization_method == DiscretizationMethod::PhaseBased
                && self.discretization.max_dt() > self.settings.max_dt_mesh
                && self.kkt_error < self.settings.kkt_tol_mesh
            {
                self.discretization.mesh_refinement(
                    &self.contact_sequence,
                    t,
                    self.settings.max_dt_mesh,
                )?;
                self.after_regrid();
                stats.mesh_refinements += 1;
                continue;
            }
            if self.kkt_error < self.settings.kkt_tol {
                stats.convergence = true;
                break;
            }
        }
        stats.regularization_bumps = self.reg.bumps;
        stats.solve_time = Some(start.elapsed());
        Ok(stats)
    }

    fn validate_state(&self, q: &DVector<f64>, v: &DVector<f64>) -> SolverResult<()> {
        let dimq = self.robots[0].dimq();
        let dimv = self.robots[0].dimv();
        if q.len() != dimq {
            return Err(SolverError::InvalidArgument(format!(
                "q has length {}, expected {dimq}",
                q.len()
            )));
        }
        if v.len() != dimv {
            return Err(SolverError::InvalidArgument(format!(
                "v has length {}, expected {dimv}",
                v.len()
            )));
        }
        Ok(())
    }

    /// One Newton iteration on the current grid sequence. Returns the
    /// squared KKT error of the entering iterate and the applied step sizes.
    fn newton_iteration(&mut self, q: &DVector<f64>, v: &DVector<f64>) -> (f64, f64, f64) {
        let perf = self.dms.eval_kkt(
            &mut self.robots,
            &self.cost,
            &self.constraints,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
            &mut self.data,
            &mut self.mats,
            &mut self.ress,
        );
        self.dms
            .initial_state_direction(&self.robots[0], q, v, &self.s[0], &mut self.dx0);
        self.kkt_error = perf.kkt_error + self.dx0.norm_squared();
        self.perf = perf;

        backward_riccati(
            self.discretization.grids(),
            &self.mats,
            &self.ress,
            &mut self.facts,
            &mut self.reg,
        );
        forward_riccati(
            self.discretization.grids(),
            &self.mats,
            &self.ress,
            &self.facts,
            &self.dx0,
            &mut self.d,
        );

        let n = self.discretization.n_grids();
        for i in 0..n - 1 {
            self.dlmd_scratch[i].copy_from(&self.d[i + 1].dlmd);
        }

        let tau = self.settings.fraction_to_boundary_rate;
        let (alpha_p_max, alpha_d) = self.dms.expand_directions(
            &self.constraints,
            &self.discretization,
            &self.contact_sequence,
            &self.s,
            &self.mats,
            &mut self.data,
            &mut self.d,
            &self.dlmd_scratch,
            tau,
        );

        let alpha_p = if self.settings.enable_line_search {
            let mut ls = std::mem::take(&mut self.line_search);
            let dms = &self.dms;
            let robots = &self.robots;
            let cost = &self.cost;
            let constraints = &self.constraints;
            let disc = &self.discretization;
            let seq = &self.contact_sequence;
            let s = &self.s;
            let d = &self.d;
            let s_trial = &mut self.s_trial;
            let alpha = ls.compute_step_size(alpha_p_max, |a| {
                dms.trial_cost_and_violation(
                    robots, cost, constraints, disc, seq, s, d, a, s_trial,
                )
            });
            self.line_search = ls;
            alpha
        } else {
            alpha_p_max
        };

        self.dms.integrate_solution(
            &self.robots,
            &self.discretization,
            alpha_p,
            alpha_d,
            &self.d,
            &mut self.s,
            &mut self.data,
        );
        (self.kkt_error, alpha_p, alpha_d)
    }

    /// Post-regrid bookkeeping: resize buffers, re-seed the interior point
    /// on changed grids, drop the stale line-search filter.
    fn after_regrid(&mut self) {
        let changed = self.sync_buffers();
        self.reinit_changed(&changed);
        self.line_search.clear_filter();
        self.prev_grid_times = self.discretization.grids().iter().map(|g| g.t).collect();
    }

    fn discretize_and_sync(&mut self, t: f64) -> SolverResult<()> {
        let snapshot = (self.settings.enable_solution_interpolation && !self.s.is_empty())
            .then(|| (self.prev_grid_times.clone(), self.s.clone()));
        self.discretization.discretize(&self.contact_sequence, t)?;
        let changed = self.sync_buffers();
        if let Some((old_times, old_s)) = snapshot {
            if !old_times.is_empty() {
                for i in 0..self.discretization.n_grids() {
                    let ti = self.discretization.grid(i).t;
                    let j = nearest_index(&old_times, ti);
                    self.s[i].copy_primal(&old_s[j]);
                }
            }
        }
        self.prev_grid_times = self.discretization.grids().iter().map(|g| g.t).collect();
        self.reinit_changed(&changed);
        Ok(())
    }

    /// Re-seed slack/dual variables on grids whose phase or dimensions
    /// changed (their previous barrier state no longer fits).
    fn reinit_changed(&mut self, changed: &[usize]) {
        if !self.constraints_initialized {
            return;
        }
        for &i in changed {
            let grid = self.discretization.grid(i);
            if grid.ty == GridType::Terminal {
                continue;
            }
            let status =
                stage_status(&self.contact_sequence, &self.discretization, grid).clone();
            self.constraints.set_slack_and_dual(
                grid.ty,
                &status,
                &mut self.data[i].constraints_data,
                &self.s[i],
            );
        }
    }

    /// Grow/resize the per-grid buffers to match the current grid sequence.
    /// Returns the indices whose layout changed.
    fn sync_buffers(&mut self) -> Vec<usize> {
        let dimq = self.robots[0].dimq();
        let dimv = self.robots[0].dimv();
        let dimu = self.robots[0].dimu();
        let n = self.discretization.n_grids();
        let mut changed = Vec::new();

        for i in 0..n {
            let grid = self.discretization.grid(i).clone();
            let status =
                stage_status(&self.contact_sequence, &self.discretization, &grid).clone();
            let sw_status = switching_context(&self.contact_sequence, &self.discretization, i)
                .map(|c| c.impulse_status.clone());
            let dims = StageDims::new(dimv, dimu, &grid, &status, sw_status.as_ref());

            if i >= self.s.len() {
                self.s.push(SplitSolution::new(dimq, dims));
                self.d.push(SplitDirection::new(dims));
                self.mats.push(SplitKktMatrix::new(dims));
                self.ress.push(SplitKktResidual::new(dims));
                self.facts.push(RiccatiFactorization::new(dims));
                self.data.push(StageData {
                    constraints_data: self.constraints.create_data(grid.ty, &status),
                    contact_dynamics: ContactDynamicsData::new(dims),
                    switching: (dims.dims > 0)
                        .then(|| SwitchingConstraintData::new(dimq, dimv, dims.dims)),
                    contact_phase: grid.contact_phase,
                });
                self.dlmd_scratch.push(DVector::zeros(dims.dimx));
                self.s_trial.push(SplitSolution::new(dimq, dims));
                changed.push(i);
            } else if self.mats[i].dims() != dims
                || self.data[i].contact_phase != grid.contact_phase
            {
                self.s[i].set_contact_dims(dims);
                self.d[i].resize(dims);
                self.mats[i].resize(dims);
                self.ress[i].resize(dims);
                self.facts[i].resize(dims);
                self.data[i].constraints_data = self.constraints.create_data(grid.ty, &status);
                self.data[i].contact_dynamics.resize(dims);
                self.data[i].switching = (dims.dims > 0)
                    .then(|| SwitchingConstraintData::new(dimq, dimv, dims.dims));
                self.data[i].contact_phase = grid.contact_phase;
                self.s_trial[i].set_contact_dims(dims);
                changed.push(i);
            }
        }
        self.s.truncate(n);
        self.d.truncate(n);
        self.data.truncate(n);
        self.mats.truncate(n);
        self.ress.truncate(n);
        self.facts.truncate(n);
        self.dlmd_scratch.truncate(n);
        self.s_trial.truncate(n);
        changed
    }
}

/// Index of the value in `times` (sorted ascending) closest to `t`.
fn nearest_index(times: &[f64], t: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &ti) in times.iter().enumerate() {
        let dist = (ti - t).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}
