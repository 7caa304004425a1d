//! Discrete dynamics: state equation, contact-dynamics condensation, and the
//! pre-impulse switching constraint.

pub mod contact_dynamics;
pub mod state_equation;
pub mod switching;

pub use contact_dynamics::ContactDynamicsData;
pub use switching::SwitchingConstraintData;
