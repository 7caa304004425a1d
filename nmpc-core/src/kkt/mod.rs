//! Per-stage KKT blocks.
//!
//! Each grid owns one matrix/residual pair, overwritten every Newton
//! iteration. Block dimensions follow the grid: intermediate and lift grids
//! carry acceleration/force/torque blocks, impulse grids carry a velocity
//! jump and impulse forces, the terminal grid carries state blocks only.

pub mod matrix;
pub mod residual;

pub use matrix::SplitKktMatrix;
pub use residual::SplitKktResidual;

use crate::contact::ContactStatus;
use crate::discretization::{Grid, GridType};

/// Variable-block dimensions of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDims {
    /// Velocity dimension of the model.
    pub dimv: usize,
    /// State dimension (`2 * dimv`).
    pub dimx: usize,
    /// Acceleration block (velocity jump `dv` on impulse grids, zero on the
    /// terminal grid).
    pub dima: usize,
    /// Stacked active contact-force dimension.
    pub dimf: usize,
    /// Torque-input dimension (zero on impulse and terminal grids).
    pub dimu: usize,
    /// Switching-constraint row count (zero unless the grid is flagged).
    pub dims: usize,
}

impl StageDims {
    /// Dimensions for `grid` given its contact status and, when the grid is
    /// flagged for the switching constraint, the impulse status two grids
    /// ahead.
    pub fn new(
        dimv: usize,
        dimu: usize,
        grid: &Grid,
        status: &ContactStatus,
        switching_status: Option<&ContactStatus>,
    ) -> Self {
        let dimx = 2 * dimv;
        match grid.ty {
            GridType::Terminal => Self {
                dimv,
                dimx,
                dima: 0,
                dimf: 0,
                dimu: 0,
                dims: 0,
            },
            GridType::Impulse => Self {
                dimv,
                dimx,
                dima: dimv,
                dimf: status.dimf(),
                dimu: 0,
                dims: 0,
            },
            GridType::Intermediate | GridType::Lift => Self {
                dimv,
                dimx,
                dima: dimv,
                dimf: status.dimf(),
                dimu,
                // Three position rows per newly active contact.
                dims: switching_status.map_or(0, |s| 3 * s.num_active_contacts()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactType;

    fn grid(ty: GridType) -> Grid {
        Grid::new(0, ty, 0.0, 0.1, 0)
    }

    #[test]
    fn test_terminal_dims_have_no_input_or_force_blocks() {
        let status = ContactStatus::new(vec![ContactType::Point; 2]);
        let dims = StageDims::new(6, 6, &grid(GridType::Terminal), &status, None);
        assert_eq!(dims.dima, 0);
        assert_eq!(dims.dimf, 0);
        assert_eq!(dims.dimu, 0);
        assert_eq!(dims.dims, 0);
        assert_eq!(dims.dimx, 12);
    }

    #[test]
    fn test_impulse_dims() {
        let mut status = ContactStatus::new(vec![ContactType::Point; 2]);
        status.set_contact_active(0, true);
        let dims = StageDims::new(6, 6, &grid(GridType::Impulse), &status, None);
        assert_eq!(dims.dima, 6);
        assert_eq!(dims.dimf, 3);
        assert_eq!(dims.dimu, 0);
    }

    #[test]
    fn test_switching_rows() {
        let status = ContactStatus::new(vec![ContactType::Point; 2]);
        let mut impulse_status = ContactStatus::new(vec![ContactType::Point; 2]);
        impulse_status.set_contact_active(1, true);
        let dims = StageDims::new(
            6,
            6,
            &grid(GridType::Intermediate),
            &status,
            Some(&impulse_status),
        );
        assert_eq!(dims.dims, 3);
    }
}
