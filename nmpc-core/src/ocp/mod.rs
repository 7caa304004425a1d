//! Per-grid problem data and horizon-wide shooting operations.

pub mod direct_multiple_shooting;
pub mod performance_index;
pub mod solution;
pub mod split_ocp;

pub use direct_multiple_shooting::DirectMultipleShooting;
pub use performance_index::PerformanceIndex;
pub use solution::{SplitDirection, SplitSolution};
pub use split_ocp::StageData;
