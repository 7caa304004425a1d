//! Contact schedule types: per-instant contact status and the time-ordered
//! contact sequence consumed by the discretization.

pub mod sequence;
pub mod status;

pub use sequence::{ContactSequence, DiscreteEvent, EventType};
pub use status::{ContactStatus, ContactType};
