//! nmpc-core: a hybrid Riccati-recursion NMPC solver
//!
//! This library implements a receding-horizon optimal-control solver for
//! constrained, contact-switching rigid-body systems (legged robots). At
//! each control tick it computes a state/input trajectory minimizing a cost
//! functional subject to dynamics, inequality constraints (joint limits,
//! friction cones) and a time-varying contact schedule, using a structured
//! Newton method instead of a generic QP/NLP solver:
//!
//! - **Event-grid discretization**: impulse and lift transitions are
//!   inserted as dedicated grids, never merged into nominal grid points.
//! - **Interior-point constraint handling**: per-stage slack/dual barrier
//!   state condensed into the stage KKT blocks, with fraction-to-boundary
//!   step caps keeping the iterates strictly feasible.
//! - **Contact-dynamics condensation**: accelerations and contact forces
//!   are eliminated per stage through the inverse of the contact-dynamics
//!   matrix, leaving standard state/input LQR stages.
//! - **Hybrid Riccati recursion**: a backward/forward dynamic-programming
//!   sweep over the flat grid array, branching at impulse grids, solving
//!   the condensed KKT system in O(horizon) per Newton iteration and
//!   producing state-feedback gains as a by-product.
//! - **Filter line search** (optional): Pareto acceptance on (cost,
//!   violation) pairs with backtracking to a step floor.
//!
//! # Example
//!
//! ```ignore
//! use nmpc_core::{
//!     ConfigurationSpaceCost, Constraints, ContactSequence, ContactStatus,
//!     CostFunction, OcpSolver, PointMass, SolverSettings,
//! };
//! use nalgebra::DVector;
//!
//! let robot = PointMass::new(1);
//! let sequence = ContactSequence::new(ContactStatus::new(vec![]));
//! let mut cost = CostFunction::new();
//! let mut term = ConfigurationSpaceCost::new(1, 1);
//! term.set_q_ref(DVector::from_element(1, 1.0));
//! term.set_q_weight(DVector::from_element(1, 1.0));
//! term.set_v_weight(DVector::from_element(1, 1.0));
//! cost.push_back("config", Box::new(term));
//!
//! let settings = SolverSettings::default();
//! let mut solver = OcpSolver::new(
//!     robot, sequence, cost, Constraints::new(), 1.0, 10, settings,
//! )?;
//! let stats = solver.solve(0.0, &DVector::zeros(1), &DVector::zeros(1))?;
//! assert!(stats.convergence);
//! ```
//!
//! Robot kinematics/dynamics, cost terms and contact-sequence authoring are
//! external collaborators behind the [`robot::RobotModel`],
//! [`cost::CostTerm`] and contact-sequence interfaces; reference
//! implementations ship for tests and examples.

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // stage evaluation spans many per-grid buffers

pub mod constraints;
pub mod contact;
pub mod cost;
pub mod discretization;
pub mod dynamics;
pub mod error;
pub mod kkt;
pub mod line_search;
pub mod ocp;
pub mod riccati;
pub mod robot;
pub mod settings;
pub mod solver;

// Re-export main types.
pub use constraints::{
    Constraints, FrictionCone, ImpulseFrictionCone, JointPositionLowerLimit,
    JointPositionUpperLimit, JointTorquesLowerLimit, JointTorquesUpperLimit,
    JointVelocityLowerLimit, JointVelocityUpperLimit,
};
pub use contact::{ContactSequence, ContactStatus, ContactType, EventType};
pub use cost::{ConfigurationSpaceCost, ContactForceCost, CostFunction, CostTerm};
pub use discretization::{Grid, GridType, TimeDiscretization};
pub use error::{SolverError, SolverResult};
pub use line_search::LineSearchSettings;
pub use ocp::{PerformanceIndex, SplitDirection, SplitSolution};
pub use robot::{PointFoot, PointMass, RobotModel};
pub use settings::{DiscretizationMethod, SolverSettings};
pub use solver::{OcpSolver, SolverStatistics};
