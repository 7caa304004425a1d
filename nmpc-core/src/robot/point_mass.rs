//! Reference robot models.
//!
//! These are the models used by the crate's own tests and examples: a
//! contact-free point mass with an arbitrary number of degrees of freedom,
//! and a 3-DoF translating point with a single switchable contact at the
//! point itself. Real robots enter through the same [`RobotModel`] trait,
//! typically backed by a rigid-body dynamics library.

use nalgebra::{DMatrix, DVector, Vector3};

use crate::contact::{ContactStatus, ContactType};
use crate::robot::RobotModel;

/// Contact-free point mass in n dimensions: `M = m·I`, no bias forces.
#[derive(Debug, Clone)]
pub struct PointMass {
    dim: usize,
    mass: f64,
}

impl PointMass {
    /// Unit-mass point with `dim` degrees of freedom.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0);
        Self { dim, mass: 1.0 }
    }

    /// Set the mass.
    pub fn with_mass(mut self, mass: f64) -> Self {
        assert!(mass > 0.0);
        self.mass = mass;
        self
    }
}

impl RobotModel for PointMass {
    fn dimq(&self) -> usize {
        self.dim
    }

    fn dimv(&self) -> usize {
        self.dim
    }

    fn dimu(&self) -> usize {
        self.dim
    }

    fn max_num_contacts(&self) -> usize {
        0
    }

    fn contact_types(&self) -> Vec<ContactType> {
        Vec::new()
    }

    fn update_kinematics(&mut self, _q: &DVector<f64>, _v: &DVector<f64>) {}

    fn integrate_config(
        &self,
        q: &DVector<f64>,
        dq: &DVector<f64>,
        scale: f64,
        q_out: &mut DVector<f64>,
    ) {
        q_out.copy_from(q);
        q_out.axpy(scale, dq, 1.0);
    }

    fn subtract_config(&self, q_lhs: &DVector<f64>, q_rhs: &DVector<f64>, out: &mut DVector<f64>) {
        out.copy_from(q_lhs);
        *out -= q_rhs;
    }

    fn inverse_dynamics(
        &mut self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        a: &DVector<f64>,
        tau_out: &mut DVector<f64>,
    ) {
        tau_out.copy_from(a);
        *tau_out *= self.mass;
    }

    fn inverse_dynamics_derivatives(
        &mut self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
        did_dq: &mut DMatrix<f64>,
        did_dv: &mut DMatrix<f64>,
        did_da: &mut DMatrix<f64>,
    ) {
        did_dq.fill(0.0);
        did_dv.fill(0.0);
        did_da.fill(0.0);
        did_da.fill_diagonal(self.mass);
    }

    fn contact_jacobian(&mut self, status: &ContactStatus, _j_out: &mut DMatrix<f64>) {
        debug_assert_eq!(status.dimf(), 0);
    }

    fn contact_acceleration_residual(
        &mut self,
        status: &ContactStatus,
        _a: &DVector<f64>,
        _out: &mut DVector<f64>,
    ) {
        debug_assert_eq!(status.dimf(), 0);
    }

    fn contact_acceleration_derivatives(
        &mut self,
        status: &ContactStatus,
        _a: &DVector<f64>,
        _dq_out: &mut DMatrix<f64>,
        _dv_out: &mut DMatrix<f64>,
    ) {
        debug_assert_eq!(status.dimf(), 0);
    }

    fn contact_velocity_residual(
        &mut self,
        status: &ContactStatus,
        _v: &DVector<f64>,
        _out: &mut DVector<f64>,
    ) {
        debug_assert_eq!(status.dimf(), 0);
    }

    fn contact_velocity_derivatives(
        &mut self,
        status: &ContactStatus,
        _v: &DVector<f64>,
        _dq_out: &mut DMatrix<f64>,
        _dv_out: &mut DMatrix<f64>,
    ) {
        debug_assert_eq!(status.dimf(), 0);
    }

    fn contact_position(&self, _contact: usize) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn contact_position_jacobian(&self, _contact: usize, _j_out: &mut DMatrix<f64>) {}
}

/// Translating point mass in 3D with one contact candidate at the point.
///
/// The contact Jacobian is the identity and the contact-acceleration residual
/// carries Baumgarte stabilization on the position error to the planned
/// placement:
///
/// ```text
/// J a + γ(q, v) = a + kd·v + kp·(q − p_ref)
/// ```
#[derive(Debug, Clone)]
pub struct PointFoot {
    mass: f64,
    /// Gravitational acceleration along −z.
    gravity: f64,
    baumgarte_kp: f64,
    baumgarte_kd: f64,
    q_cache: Vector3<f64>,
    v_cache: Vector3<f64>,
}

impl PointFoot {
    pub fn new() -> Self {
        Self {
            mass: 1.0,
            gravity: 9.81,
            baumgarte_kp: 25.0,
            baumgarte_kd: 10.0,
            q_cache: Vector3::zeros(),
            v_cache: Vector3::zeros(),
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        assert!(mass > 0.0);
        self.mass = mass;
        self
    }
}

impl Default for PointFoot {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotModel for PointFoot {
    fn dimq(&self) -> usize {
        3
    }

    fn dimv(&self) -> usize {
        3
    }

    fn dimu(&self) -> usize {
        3
    }

    fn max_num_contacts(&self) -> usize {
        1
    }

    fn contact_types(&self) -> Vec<ContactType> {
        vec![ContactType::Point]
    }

    fn update_kinematics(&mut self, q: &DVector<f64>, v: &DVector<f64>) {
        self.q_cache = Vector3::new(q[0], q[1], q[2]);
        self.v_cache = Vector3::new(v[0], v[1], v[2]);
    }

    fn integrate_config(
        &self,
        q: &DVector<f64>,
        dq: &DVector<f64>,
        scale: f64,
        q_out: &mut DVector<f64>,
    ) {
        q_out.copy_from(q);
        q_out.axpy(scale, dq, 1.0);
    }

    fn subtract_config(&self, q_lhs: &DVector<f64>, q_rhs: &DVector<f64>, out: &mut DVector<f64>) {
        out.copy_from(q_lhs);
        *out -= q_rhs;
    }

    fn inverse_dynamics(
        &mut self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        a: &DVector<f64>,
        tau_out: &mut DVector<f64>,
    ) {
        tau_out.copy_from(a);
        *tau_out *= self.mass;
        tau_out[2] += self.mass * self.gravity;
    }

    fn inverse_dynamics_derivatives(
        &mut self,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        _a: &DVector<f64>,
        did_dq: &mut DMatrix<f64>,
        did_dv: &mut DMatrix<f64>,
        did_da: &mut DMatrix<f64>,
    ) {
        did_dq.fill(0.0);
        did_dv.fill(0.0);
        did_da.fill(0.0);
        did_da.fill_diagonal(self.mass);
    }

    fn contact_jacobian(&mut self, status: &ContactStatus, j_out: &mut DMatrix<f64>) {
        if status.is_contact_active(0) {
            j_out.fill(0.0);
            j_out.fill_diagonal(1.0);
        }
    }

    fn contact_acceleration_residual(
        &mut self,
        status: &ContactStatus,
        a: &DVector<f64>,
        out: &mut DVector<f64>,
    ) {
        if status.is_contact_active(0) {
            let p_ref = status.placement(0);
            for i in 0..3 {
                out[i] = a[i]
                    + self.baumgarte_kd * self.v_cache[i]
                    + self.baumgarte_kp * (self.q_cache[i] - p_ref[i]);
            }
        }
    }

    fn contact_acceleration_derivatives(
        &mut self,
        status: &ContactStatus,
        _a: &DVector<f64>,
        dq_out: &mut DMatrix<f64>,
        dv_out: &mut DMatrix<f64>,
    ) {
        if status.is_contact_active(0) {
            dq_out.fill(0.0);
            dq_out.fill_diagonal(self.baumgarte_kp);
            dv_out.fill(0.0);
            dv_out.fill_diagonal(self.baumgarte_kd);
        }
    }

    fn contact_velocity_residual(
        &mut self,
        status: &ContactStatus,
        v: &DVector<f64>,
        out: &mut DVector<f64>,
    ) {
        if status.is_contact_active(0) {
            for i in 0..3 {
                out[i] = v[i];
            }
        }
    }

    fn contact_velocity_derivatives(
        &mut self,
        status: &ContactStatus,
        _v: &DVector<f64>,
        dq_out: &mut DMatrix<f64>,
        dv_out: &mut DMatrix<f64>,
    ) {
        if status.is_contact_active(0) {
            dq_out.fill(0.0);
            dv_out.fill(0.0);
            dv_out.fill_diagonal(1.0);
        }
    }

    fn contact_position(&self, _contact: usize) -> Vector3<f64> {
        self.q_cache
    }

    fn contact_position_jacobian(&self, _contact: usize, j_out: &mut DMatrix<f64>) {
        j_out.fill(0.0);
        j_out.fill_diagonal(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_mass_inverse_dynamics() {
        let mut model = PointMass::new(2).with_mass(2.0);
        let q = DVector::zeros(2);
        let v = DVector::zeros(2);
        let a = DVector::from_vec(vec![1.0, -0.5]);
        let mut tau = DVector::zeros(2);
        model.inverse_dynamics(&q, &v, &a, &mut tau);
        assert_eq!(tau[0], 2.0);
        assert_eq!(tau[1], -1.0);
    }

    #[test]
    fn test_point_mass_integrate_subtract_consistency() {
        let model = PointMass::new(3);
        let q = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let dq = DVector::from_vec(vec![0.1, -0.2, 0.3]);
        let mut q_next = DVector::zeros(3);
        model.integrate_config(&q, &dq, 2.0, &mut q_next);
        let mut diff = DVector::zeros(3);
        model.subtract_config(&q_next, &q, &mut diff);
        for i in 0..3 {
            assert!((diff[i] - 2.0 * dq[i]).abs() < 1.0e-14);
        }
    }

    #[test]
    fn test_point_foot_contact_residuals() {
        let mut model = PointFoot::new();
        let mut status = ContactStatus::new(model.contact_types());
        status.set_contact_active(0, true);
        status.set_placement(0, Vector3::new(0.0, 0.0, 0.0));

        let q = DVector::from_vec(vec![0.1, 0.0, 0.0]);
        let v = DVector::zeros(3);
        model.update_kinematics(&q, &v);

        let a = DVector::zeros(3);
        let mut res = DVector::zeros(3);
        model.contact_acceleration_residual(&status, &a, &mut res);
        assert!((res[0] - 25.0 * 0.1).abs() < 1.0e-12);

        let mut jac = DMatrix::zeros(3, 3);
        model.contact_jacobian(&status, &mut jac);
        assert_eq!(jac[(0, 0)], 1.0);
        assert_eq!(jac[(1, 1)], 1.0);
    }
}
