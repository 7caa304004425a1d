//! Robot-model contract consumed by the solver.
//!
//! Rigid-body kinematics and dynamics evaluation is an external collaborator:
//! the solver only requires the interface below. Workers clone the model to
//! obtain private evaluation contexts (the kinematics cache behind
//! `update_kinematics` is mutable state), so implementations must be `Clone`
//! and cheap enough to clone once per worker thread.
//!
//! The stage linearization treats the configuration integrate/subtract
//! Jacobians as identity. This is exact for vector-space configurations and a
//! first-order approximation for manifold bases (e.g. quaternion-based
//! floating bases); residual evaluation always routes through
//! [`RobotModel::integrate_config`] / [`RobotModel::subtract_config`], so
//! manifold models remain consistent.

pub mod point_mass;

pub use point_mass::{PointFoot, PointMass};

use nalgebra::{DMatrix, DVector, Vector3};

use crate::contact::ContactStatus;

/// Interface between the solver and a rigid-body model.
///
/// Contact quantities are stacked over the active contacts of the status
/// passed to each call, in contact-index order; the stacked dimension is
/// `status.dimf()`.
pub trait RobotModel: Clone + Send {
    /// Configuration dimension.
    fn dimq(&self) -> usize;

    /// Velocity (tangent) dimension.
    fn dimv(&self) -> usize;

    /// Input-torque dimension. The core assumes full actuation
    /// (`dimu() == dimv()`), validated at solver construction.
    fn dimu(&self) -> usize;

    /// Number of contact candidates.
    fn max_num_contacts(&self) -> usize;

    /// Contact type/force dimensions per candidate, used to build statuses.
    fn contact_types(&self) -> Vec<crate::contact::ContactType>;

    /// Refresh world-frame kinematics at `(q, v)`. Must be called before any
    /// contact query below.
    fn update_kinematics(&mut self, q: &DVector<f64>, v: &DVector<f64>);

    /// `q_out = q ⊕ scale · dq` on the configuration manifold.
    fn integrate_config(
        &self,
        q: &DVector<f64>,
        dq: &DVector<f64>,
        scale: f64,
        q_out: &mut DVector<f64>,
    );

    /// `out = q_lhs ⊖ q_rhs` (tangent-space difference).
    fn subtract_config(&self, q_lhs: &DVector<f64>, q_rhs: &DVector<f64>, out: &mut DVector<f64>);

    /// Inverse dynamics `tau = ID(q, v, a)` without contact forces.
    fn inverse_dynamics(
        &mut self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        tau_out: &mut DVector<f64>,
    );

    /// Partial derivatives of the inverse dynamics. `did_da` is the joint
    /// inertia matrix.
    fn inverse_dynamics_derivatives(
        &mut self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        did_dq: &mut DMatrix<f64>,
        did_dv: &mut DMatrix<f64>,
        did_da: &mut DMatrix<f64>,
    );

    /// Stacked contact Jacobian of the active contacts (`dimf × dimv`).
    fn contact_jacobian(&mut self, status: &ContactStatus, j_out: &mut DMatrix<f64>);

    /// Contact acceleration residual `J a + γ(q, v)` of the active contacts,
    /// including any Baumgarte stabilization the model applies.
    fn contact_acceleration_residual(
        &mut self,
        status: &ContactStatus,
        a: &DVector<f64>,
        out: &mut DVector<f64>,
    );

    /// Derivatives of the contact acceleration residual w.r.t. `q` and `v`.
    fn contact_acceleration_derivatives(
        &mut self,
        status: &ContactStatus,
        a: &DVector<f64>,
        dq_out: &mut DMatrix<f64>,
        dv_out: &mut DMatrix<f64>,
    );

    /// Contact velocity residual `J v` of the active contacts (post-impulse
    /// contacts must come to rest).
    fn contact_velocity_residual(
        &mut self,
        status: &ContactStatus,
        v: &DVector<f64>,
        out: &mut DVector<f64>,
    );

    /// Derivatives of the contact velocity residual w.r.t. `q` and `v`.
    fn contact_velocity_derivatives(
        &mut self,
        status: &ContactStatus,
        v: &DVector<f64>,
        dq_out: &mut DMatrix<f64>,
        dv_out: &mut DMatrix<f64>,
    );

    /// World-frame position of contact frame `contact` at the configuration
    /// last passed to `update_kinematics`.
    fn contact_position(&self, contact: usize) -> Vector3<f64>;

    /// Jacobian of the contact-frame position (`3 × dimv`).
    fn contact_position_jacobian(&self, contact: usize, j_out: &mut DMatrix<f64>);
}
