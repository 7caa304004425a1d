//! Horizon discretization: builds the ordered grid sequence from a continuous
//! contact schedule.
//!
//! The discretization produces N nominal grids plus inserted grids at each
//! discrete event inside the horizon. An event exactly at a nominal boundary
//! is still inserted as a separate zero-duration grid so that the recursion
//! keeps a clean branch point; a mid-interval impulse additionally inserts
//! the post-impulse stage covering the remainder of the interval.

pub mod grid;

pub use grid::{Grid, GridType};

use tracing::debug;

use crate::contact::{ContactSequence, EventType};
use crate::error::{SolverError, SolverResult};
use crate::settings::DiscretizationMethod;

/// Tolerance for deciding that an event coincides with a grid boundary.
const EVENT_TOL: f64 = 1.0e-10;

/// Builder and owner of the horizon grid sequence.
#[derive(Debug, Clone)]
pub struct TimeDiscretization {
    horizon: f64,
    n_nominal: usize,
    method: DiscretizationMethod,
    grids: Vec<Grid>,
    /// Sequence event index for each impulse index on the horizon.
    impulse_events: Vec<usize>,
    /// Sequence event index for each lift index on the horizon.
    lift_events: Vec<usize>,
    reserved_events: usize,
}

impl TimeDiscretization {
    /// Create a discretization over a horizon of length `horizon` with
    /// `n_nominal` nominal grids.
    pub fn new(
        horizon: f64,
        n_nominal: usize,
        method: DiscretizationMethod,
    ) -> SolverResult<Self> {
        if horizon <= 0.0 {
            return Err(SolverError::InvalidArgument(
                "horizon length must be positive".into(),
            ));
        }
        if n_nominal == 0 {
            return Err(SolverError::InvalidArgument(
                "number of nominal grids must be positive".into(),
            ));
        }
        Ok(Self {
            horizon,
            n_nominal,
            method,
            grids: Vec::with_capacity(n_nominal + 1),
            impulse_events: Vec::new(),
            lift_events: Vec::new(),
            reserved_events: 0,
        })
    }

    /// Horizon length.
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Nominal grid count N.
    pub fn n_nominal(&self) -> usize {
        self.n_nominal
    }

    /// Discretization method.
    pub fn method(&self) -> DiscretizationMethod {
        self.method
    }

    /// Number of grids in the current sequence (including the terminal grid).
    pub fn n_grids(&self) -> usize {
        self.grids.len()
    }

    /// Grid by index.
    pub fn grid(&self, i: usize) -> &Grid {
        &self.grids[i]
    }

    /// The full grid sequence.
    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    /// Sequence event index of impulse `impulse_index`.
    pub fn impulse_event(&self, impulse_index: usize) -> usize {
        self.impulse_events[impulse_index]
    }

    /// Sequence event index of lift `lift_index`.
    pub fn lift_event(&self, lift_index: usize) -> usize {
        self.lift_events[lift_index]
    }

    /// Number of impulse grids on the horizon.
    pub fn num_impulse_grids(&self) -> usize {
        self.impulse_events.len()
    }

    /// Number of lift grids on the horizon.
    pub fn num_lift_grids(&self) -> usize {
        self.lift_events.len()
    }

    /// Maximum time step over the non-terminal grids.
    pub fn max_dt(&self) -> f64 {
        self.grids
            .iter()
            .filter(|g| g.is_stage())
            .map(|g| g.dt)
            .fold(0.0, f64::max)
    }

    /// Reserve grid capacity for up to `n_events` discrete events on the
    /// horizon. Exceeding the reservation later grows it; it never truncates.
    pub fn reserve(&mut self, n_events: usize) {
        if n_events > self.reserved_events {
            self.reserved_events = n_events;
            let cap = self.n_nominal + 2 + 2 * n_events;
            if self.grids.capacity() < cap {
                self.grids.reserve(cap - self.grids.len());
            }
        }
    }

    /// Rebuild the grid sequence for the horizon `[t, t + T]`.
    ///
    /// Deterministic in `(t, contact_sequence)`: calling twice with the same
    /// inputs yields an identical sequence.
    pub fn discretize(&mut self, contact_sequence: &ContactSequence, t: f64) -> SolverResult<()> {
        // Events strictly inside the horizon, with their sequence indices.
        let t_end = t + self.horizon;
        let events: Vec<(usize, f64, EventType)> = (0..contact_sequence.num_events())
            .map(|i| {
                let e = contact_sequence.event(i);
                (i, e.time, e.ty)
            })
            .filter(|&(_, time, _)| time > t + EVENT_TOL && time < t_end - EVENT_TOL)
            .collect();
        // Phase index at the start of the horizon: events already past.
        let phase0 = (0..contact_sequence.num_events())
            .filter(|&i| contact_sequence.event_time(i) <= t + EVENT_TOL)
            .count();

        if events.len() > self.reserved_events {
            debug!(
                scheduled = events.len(),
                reserved = self.reserved_events,
                "growing discrete-event reservation"
            );
            self.reserve(events.len());
        }

        self.grids.clear();
        self.impulse_events.clear();
        self.lift_events.clear();

        match self.method {
            DiscretizationMethod::FixedGrid => {
                self.discretize_fixed_grid(t, &events, phase0);
            }
            DiscretizationMethod::PhaseBased => {
                self.discretize_phase_based(t, &events, phase0, None);
            }
        }
        self.finalize(t_end, phase0 + events.len());
        Ok(())
    }

    /// Re-derive node spacing when the maximum inter-grid step has degraded.
    ///
    /// Under PhaseBased discretization each phase gets enough grids to keep
    /// its step below `max_dt_mesh`; under FixedGrid the nominal grid count
    /// is grown. Must only be called between Newton iterations: the rebuilt
    /// sequence invalidates all per-grid buffers.
    pub fn mesh_refinement(
        &mut self,
        contact_sequence: &ContactSequence,
        t: f64,
        max_dt_mesh: f64,
    ) -> SolverResult<()> {
        match self.method {
            DiscretizationMethod::FixedGrid => {
                let needed = (self.horizon / max_dt_mesh).ceil() as usize;
                if needed > self.n_nominal {
                    debug!(old = self.n_nominal, new = needed, "mesh refinement");
                    self.n_nominal = needed;
                }
                self.discretize(contact_sequence, t)
            }
            DiscretizationMethod::PhaseBased => {
                let t_end = t + self.horizon;
                let events: Vec<(usize, f64, EventType)> = (0..contact_sequence.num_events())
                    .map(|i| {
                        let e = contact_sequence.event(i);
                        (i, e.time, e.ty)
                    })
                    .filter(|&(_, time, _)| time > t + EVENT_TOL && time < t_end - EVENT_TOL)
                    .collect();
                let phase0 = (0..contact_sequence.num_events())
                    .filter(|&i| contact_sequence.event_time(i) <= t + EVENT_TOL)
                    .count();
                if events.len() > self.reserved_events {
                    self.reserve(events.len());
                }
                self.grids.clear();
                self.impulse_events.clear();
                self.lift_events.clear();
                self.discretize_phase_based(t, &events, phase0, Some(max_dt_mesh));
                self.finalize(t_end, phase0 + events.len());
                Ok(())
            }
        }
    }

    fn discretize_fixed_grid(&mut self, t: f64, events: &[(usize, f64, EventType)], phase0: usize) {
        let dt_nom = self.horizon / self.n_nominal as f64;
        let mut phase = phase0;
        let mut ev = 0usize;
        for k in 0..self.n_nominal {
            let t0 = t + k as f64 * dt_nom;
            let t1 = t + (k + 1) as f64 * dt_nom;
            // Events coinciding with the left boundary: inserted as separate
            // zero-duration grids, never merged into the nominal grid.
            while ev < events.len() && events[ev].1 <= t0 + EVENT_TOL {
                match events[ev].2 {
                    EventType::Impulse => self.push_event_grid(events[ev], t0, 0.0, phase),
                    EventType::Lift => {
                        self.push_pending_lift(events[ev]);
                        self.push_grid(GridType::Lift, t0, 0.0, phase + 1);
                    }
                }
                phase += 1;
                ev += 1;
            }
            // Walk the interior of [t0, t1), splitting at each event.
            let mut seg_start = t0;
            let mut seg_ty = GridType::Intermediate;
            while ev < events.len() && events[ev].1 < t1 - EVENT_TOL {
                let (_, et, ety) = events[ev];
                self.push_grid(seg_ty, seg_start, et - seg_start, phase);
                match ety {
                    EventType::Impulse => {
                        self.push_event_grid(events[ev], et, 0.0, phase);
                        seg_ty = GridType::Intermediate;
                    }
                    EventType::Lift => {
                        seg_ty = GridType::Lift;
                        self.push_pending_lift(events[ev]);
                    }
                }
                phase += 1;
                seg_start = et;
                ev += 1;
            }
            self.push_grid(seg_ty, seg_start, t1 - seg_start, phase);
        }
        // Events coinciding with the terminal boundary were filtered out
        // before this point.
        debug_assert_eq!(ev, events.len());
    }

    fn discretize_phase_based(
        &mut self,
        t: f64,
        events: &[(usize, f64, EventType)],
        phase0: usize,
        max_dt: Option<f64>,
    ) {
        // Phase boundaries: t, event times, t + T.
        let t_end = t + self.horizon;
        let mut boundaries = Vec::with_capacity(events.len() + 2);
        boundaries.push(t);
        boundaries.extend(events.iter().map(|&(_, time, _)| time));
        boundaries.push(t_end);

        let mut phase = phase0;
        for seg in 0..boundaries.len() - 1 {
            let (a, b) = (boundaries[seg], boundaries[seg + 1]);
            let mut first_ty = GridType::Intermediate;
            if seg > 0 {
                let event = events[seg - 1];
                match event.2 {
                    EventType::Impulse => {
                        self.push_event_grid(event, a, 0.0, phase);
                    }
                    EventType::Lift => {
                        first_ty = GridType::Lift;
                        self.push_pending_lift(event);
                    }
                }
                phase += 1;
            }
            let share =
                ((self.n_nominal as f64) * (b - a) / self.horizon).round() as usize;
            let mut n_seg = share.max(1);
            if let Some(max_dt) = max_dt {
                n_seg = n_seg.max(((b - a) / max_dt).ceil() as usize);
            }
            let dt_seg = (b - a) / n_seg as f64;
            for j in 0..n_seg {
                let ty = if j == 0 { first_ty } else { GridType::Intermediate };
                self.push_grid(ty, a + j as f64 * dt_seg, dt_seg, phase);
            }
        }
    }

    fn push_grid(&mut self, ty: GridType, t: f64, dt: f64, phase: usize) {
        let index = self.grids.len();
        let mut g = Grid::new(index, ty, t, dt, phase);
        if ty == GridType::Lift {
            g.lift_index = Some(self.lift_events.len() - 1);
        }
        self.grids.push(g);
    }

    fn push_event_grid(&mut self, event: (usize, f64, EventType), t: f64, dt: f64, phase: usize) {
        let (seq_index, _, ty) = event;
        debug_assert_eq!(ty, EventType::Impulse);
        let index = self.grids.len();
        // The impulse grid belongs to the post-event phase: its dynamics use
        // the newly activated contacts.
        let mut g = Grid::new(index, GridType::Impulse, t, dt, phase + 1);
        g.impulse_index = Some(self.impulse_events.len());
        self.impulse_events.push(seq_index);
        self.grids.push(g);
    }

    fn push_pending_lift(&mut self, event: (usize, f64, EventType)) {
        debug_assert_eq!(event.2, EventType::Lift);
        self.lift_events.push(event.0);
    }

    fn finalize(&mut self, t_end: f64, terminal_phase: usize) {
        let index = self.grids.len();
        self.grids
            .push(Grid::new(index, GridType::Terminal, t_end, 0.0, terminal_phase));
        // Anticipatory switching constraint: flag the stage two grids before
        // each impulse, provided both intervening grids carry time.
        for g in 0..self.grids.len() {
            if self.grids[g].ty == GridType::Impulse && g >= 2 {
                let ok = self.grids[g - 1].dt > 0.0 && self.grids[g - 2].dt > 0.0;
                if ok {
                    self.grids[g - 2].switching_constraint = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{ContactStatus, ContactType};

    fn empty_sequence() -> ContactSequence {
        ContactSequence::new(ContactStatus::new(vec![ContactType::Point; 2]))
    }

    fn sequence_with_impulse(time: f64) -> ContactSequence {
        let mut seq = empty_sequence();
        let mut status = ContactStatus::new(vec![ContactType::Point; 2]);
        status.set_contact_active(0, true);
        seq.push_back(status, time).unwrap();
        seq
    }

    #[test]
    fn test_zero_events_round_trip() {
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&empty_sequence(), 0.0).unwrap();
        assert_eq!(disc.n_grids(), 11);
        for i in 0..10 {
            assert_eq!(disc.grid(i).ty, GridType::Intermediate);
            assert!((disc.grid(i).dt - 0.1).abs() < 1.0e-12);
        }
        assert_eq!(disc.grid(10).ty, GridType::Terminal);
    }

    #[test]
    fn test_discretize_is_idempotent() {
        let seq = sequence_with_impulse(0.55);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&seq, 0.0).unwrap();
        let first: Vec<_> = disc
            .grids()
            .iter()
            .map(|g| (g.ty, g.t, g.dt, g.contact_phase))
            .collect();
        disc.discretize(&seq, 0.0).unwrap();
        let second: Vec<_> = disc
            .grids()
            .iter()
            .map(|g| (g.ty, g.t, g.dt, g.contact_phase))
            .collect();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
            assert_eq!(a.2, b.2);
            assert_eq!(a.3, b.3);
        }
    }

    #[test]
    fn test_impulse_on_nominal_boundary() {
        let seq = sequence_with_impulse(0.5);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&seq, 0.0).unwrap();

        let impulses: Vec<_> = disc
            .grids()
            .iter()
            .filter(|g| g.ty == GridType::Impulse)
            .collect();
        assert_eq!(impulses.len(), 1);
        let imp = impulses[0];
        assert!((imp.t - 0.5).abs() < 1.0e-12);
        assert_eq!(imp.dt, 0.0);
        // One inserted grid: N + 1 nominal plus the impulse grid.
        assert_eq!(disc.n_grids(), 12);
        // Phase steps by one across the impulse grid.
        let g = imp.index;
        assert_eq!(
            disc.grid(g + 1).contact_phase,
            disc.grid(g - 1).contact_phase + 1
        );
    }

    #[test]
    fn test_impulse_mid_interval_inserts_post_stage() {
        let seq = sequence_with_impulse(0.55);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&seq, 0.0).unwrap();

        let g = disc
            .grids()
            .iter()
            .position(|g| g.ty == GridType::Impulse)
            .unwrap();
        // Shortened pre-impulse stage, zero-duration impulse, post stage.
        assert!((disc.grid(g - 1).dt - 0.05).abs() < 1.0e-12);
        assert_eq!(disc.grid(g).dt, 0.0);
        assert!((disc.grid(g + 1).t - 0.55).abs() < 1.0e-12);
        assert!((disc.grid(g + 1).dt - 0.05).abs() < 1.0e-12);
        assert_eq!(disc.grid(g + 1).ty, GridType::Intermediate);
        assert_eq!(disc.n_grids(), 13);
    }

    #[test]
    fn test_switching_constraint_flag_two_steps_ahead() {
        let seq = sequence_with_impulse(0.5);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&seq, 0.0).unwrap();
        let g = disc
            .grids()
            .iter()
            .position(|g| g.ty == GridType::Impulse)
            .unwrap();
        assert!(disc.grid(g - 2).switching_constraint);
        let flagged = disc
            .grids()
            .iter()
            .filter(|g| g.switching_constraint)
            .count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn test_lift_event_grid() {
        // Start with the contact active, lift it at 0.32.
        let mut active = ContactStatus::new(vec![ContactType::Point; 2]);
        active.set_contact_active(0, true);
        let mut lifted = active.clone();
        lifted.set_contact_active(0, false);
        let mut seq = ContactSequence::new(active);
        seq.push_back(lifted, 0.32).unwrap();

        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.discretize(&seq, 0.0).unwrap();
        let lifts: Vec<_> = disc
            .grids()
            .iter()
            .filter(|g| g.ty == GridType::Lift)
            .collect();
        assert_eq!(lifts.len(), 1);
        assert!((lifts[0].t - 0.32).abs() < 1.0e-12);
        assert!((lifts[0].dt - 0.08).abs() < 1.0e-12);
        // Lift inserts exactly one grid.
        assert_eq!(disc.n_grids(), 12);
    }

    #[test]
    fn test_event_before_horizon_shifts_phase() {
        let seq = sequence_with_impulse(0.5);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        // Horizon starts after the event: no impulse grid, but the phase
        // index accounts for the past event.
        disc.discretize(&seq, 0.6).unwrap();
        assert_eq!(disc.n_grids(), 11);
        assert_eq!(disc.grid(0).contact_phase, 1);
    }

    #[test]
    fn test_reservation_grows_never_truncates() {
        let mut seq = empty_sequence();
        let mut flag = false;
        for k in 0..6 {
            let mut status = ContactStatus::new(vec![ContactType::Point; 2]);
            flag = !flag;
            status.set_contact_active(0, flag);
            seq.push_back(status, 0.1 + 0.12 * k as f64).unwrap();
        }
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::FixedGrid).unwrap();
        disc.reserve(2); // deliberately too small
        disc.discretize(&seq, 0.0).unwrap();
        let n_events = disc.num_impulse_grids() + disc.num_lift_grids();
        assert_eq!(n_events, 6);
    }

    #[test]
    fn test_phase_based_aligns_events_with_boundaries() {
        let seq = sequence_with_impulse(0.47);
        let mut disc = TimeDiscretization::new(1.0, 10, DiscretizationMethod::PhaseBased).unwrap();
        disc.discretize(&seq, 0.0).unwrap();
        let g = disc
            .grids()
            .iter()
            .position(|g| g.ty == GridType::Impulse)
            .unwrap();
        assert!((disc.grid(g).t - 0.47).abs() < 1.0e-12);
        // The grid right before the impulse ends exactly at the event time.
        let before = disc.grid(g - 1);
        assert!((before.t + before.dt - 0.47).abs() < 1.0e-10);
    }

    #[test]
    fn test_mesh_refinement_bounds_dt() {
        let seq = sequence_with_impulse(0.47);
        let mut disc = TimeDiscretization::new(1.0, 4, DiscretizationMethod::PhaseBased).unwrap();
        disc.discretize(&seq, 0.0).unwrap();
        assert!(disc.max_dt() > 0.05);
        disc.mesh_refinement(&seq, 0.0, 0.05).unwrap();
        assert!(disc.max_dt() <= 0.05 + 1.0e-12);
    }
}
