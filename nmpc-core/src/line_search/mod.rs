//! Filter line search with backtracking.

pub mod filter;

pub use filter::LineSearchFilter;

use serde::{Deserialize, Serialize};

/// Line-search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSearchSettings {
    /// Backtracking factor applied to the primal step.
    pub step_size_reduction_rate: f64,
    /// Step floor, accepted as last resort.
    pub min_step_size: f64,
    /// Relative cost-reduction margin of the filter.
    pub cost_reduction_rate: f64,
    /// Relative violation-reduction margin of the filter.
    pub violation_reduction_rate: f64,
}

impl Default for LineSearchSettings {
    fn default() -> Self {
        Self {
            step_size_reduction_rate: 0.75,
            min_step_size: 0.05,
            cost_reduction_rate: 0.005,
            violation_reduction_rate: 0.005,
        }
    }
}

/// Backtracking filter line search.
///
/// The caller supplies a trial oracle mapping a primal step size to the pair
/// (total cost, total constraint violation) of the trial iterate.
#[derive(Debug, Clone)]
pub struct LineSearch {
    settings: LineSearchSettings,
    filter: LineSearchFilter,
}

impl LineSearch {
    pub fn new(settings: LineSearchSettings) -> Self {
        let filter = LineSearchFilter::new(
            settings.cost_reduction_rate,
            settings.violation_reduction_rate,
        );
        Self { settings, filter }
    }

    /// Replace the settings, clearing the filter.
    pub fn set(&mut self, settings: LineSearchSettings) {
        *self = Self::new(settings);
    }

    /// Drop all filter entries (call when the problem changes shape, e.g.
    /// after mesh refinement).
    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    /// Backtrack from `max_step_size` until the filter accepts the trial
    /// pair, or the step floor is hit (the floor step is returned as last
    /// resort; the caller re-checks feasibility next iteration).
    pub fn compute_step_size<F>(&mut self, max_step_size: f64, mut trial: F) -> f64
    where
        F: FnMut(f64) -> (f64, f64),
    {
        debug_assert!(max_step_size > 0.0 && max_step_size <= 1.0);
        if self.filter.is_empty() {
            let (cost, violation) = trial(0.0);
            self.filter.augment(cost, violation);
        }
        let mut alpha = max_step_size;
        while alpha > self.settings.min_step_size {
            let (cost, violation) = trial(alpha);
            if self.filter.is_accepted(cost, violation) {
                self.filter.augment(cost, violation);
                return alpha;
            }
            alpha *= self.settings.step_size_reduction_rate;
        }
        self.settings.min_step_size
    }
}

impl Default for LineSearch {
    fn default() -> Self {
        Self::new(LineSearchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_step_accepted_when_cost_improves() {
        let mut ls = LineSearch::default();
        // Cost decreases linearly with the step.
        let alpha = ls.compute_step_size(1.0, |a| (1.0 - a, 0.0));
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn test_backtracks_on_cost_increase() {
        let mut ls = LineSearch::default();
        let _ = ls.compute_step_size(1.0, |_| (1.0, 1.0)); // seed the filter
        // Cost grows with the step, violation fixed: must backtrack to the
        // floor.
        let alpha = ls.compute_step_size(1.0, |a| (1.0 + a, 1.0));
        assert!((alpha - ls.settings.min_step_size).abs() < 1.0e-12);
    }
}
