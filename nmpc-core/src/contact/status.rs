//! Contact activation status at one instant of the horizon.

use nalgebra::Vector3;

/// Kind of a single contact, fixing its force dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactType {
    /// Point contact: 3D force.
    Point,
    /// Surface contact: 6D wrench.
    Surface,
}

impl ContactType {
    /// Force dimension contributed by one active contact of this type.
    pub fn dimf(&self) -> usize {
        match self {
            ContactType::Point => 3,
            ContactType::Surface => 6,
        }
    }
}

/// Activation flags and placements for all contact candidates of a robot.
///
/// A status is immutable data referenced by phase index from each grid; the
/// solver never owns its lifecycle beyond the enclosing contact sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactStatus {
    types: Vec<ContactType>,
    is_active: Vec<bool>,
    placements: Vec<Vector3<f64>>,
    friction_coefficients: Vec<f64>,
}

impl ContactStatus {
    /// Create a status with all contacts inactive.
    pub fn new(types: Vec<ContactType>) -> Self {
        let n = types.len();
        Self {
            types,
            is_active: vec![false; n],
            placements: vec![Vector3::zeros(); n],
            friction_coefficients: vec![0.7; n],
        }
    }

    /// Total number of contact candidates.
    pub fn num_contacts(&self) -> usize {
        self.types.len()
    }

    /// Whether contact `i` is active.
    pub fn is_contact_active(&self, i: usize) -> bool {
        self.is_active[i]
    }

    /// Activation flags slice.
    pub fn active_flags(&self) -> &[bool] {
        &self.is_active
    }

    /// Activate or deactivate contact `i`.
    pub fn set_contact_active(&mut self, i: usize, active: bool) {
        self.is_active[i] = active;
    }

    /// Set the world-frame placement of contact `i`.
    pub fn set_placement(&mut self, i: usize, placement: Vector3<f64>) {
        self.placements[i] = placement;
    }

    /// World-frame placement of contact `i`.
    pub fn placement(&self, i: usize) -> &Vector3<f64> {
        &self.placements[i]
    }

    /// Set the friction coefficient of contact `i`.
    pub fn set_friction_coefficient(&mut self, i: usize, mu: f64) {
        assert!(mu > 0.0, "friction coefficient must be positive");
        self.friction_coefficients[i] = mu;
    }

    /// Friction coefficient of contact `i`.
    pub fn friction_coefficient(&self, i: usize) -> f64 {
        self.friction_coefficients[i]
    }

    /// Type of contact `i`.
    pub fn contact_type(&self, i: usize) -> ContactType {
        self.types[i]
    }

    /// Number of active contacts.
    pub fn num_active_contacts(&self) -> usize {
        self.is_active.iter().filter(|&&a| a).count()
    }

    /// Stacked force dimension over active contacts.
    pub fn dimf(&self) -> usize {
        self.types
            .iter()
            .zip(&self.is_active)
            .filter(|(_, &a)| a)
            .map(|(t, _)| t.dimf())
            .sum()
    }

    /// Whether any contact is active.
    pub fn has_active_contacts(&self) -> bool {
        self.is_active.iter().any(|&a| a)
    }

    /// Offset of contact `i` inside the stacked active-force vector, or
    /// `None` if the contact is inactive.
    pub fn force_segment(&self, i: usize) -> Option<(usize, usize)> {
        if !self.is_active[i] {
            return None;
        }
        let mut offset = 0;
        for j in 0..i {
            if self.is_active[j] {
                offset += self.types[j].dimf();
            }
        }
        Some((offset, self.types[i].dimf()))
    }

    /// Status of the contacts that become active in the transition
    /// `self -> post`: used as the impulse status of an impulse event.
    pub fn impulse_transition(&self, post: &ContactStatus) -> ContactStatus {
        assert_eq!(self.num_contacts(), post.num_contacts());
        let mut impulse = ContactStatus::new(self.types.clone());
        for i in 0..self.num_contacts() {
            if !self.is_active[i] && post.is_active[i] {
                impulse.set_contact_active(i, true);
                impulse.set_placement(i, post.placements[i]);
                impulse.friction_coefficients[i] = post.friction_coefficients[i];
            }
        }
        impulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_point_status() -> ContactStatus {
        ContactStatus::new(vec![ContactType::Point; 3])
    }

    #[test]
    fn test_dimf_counts_active_only() {
        let mut status = three_point_status();
        assert_eq!(status.dimf(), 0);
        status.set_contact_active(0, true);
        status.set_contact_active(2, true);
        assert_eq!(status.dimf(), 6);
        assert_eq!(status.num_active_contacts(), 2);
    }

    #[test]
    fn test_force_segment_offsets() {
        let mut status = three_point_status();
        status.set_contact_active(0, true);
        status.set_contact_active(2, true);
        assert_eq!(status.force_segment(0), Some((0, 3)));
        assert_eq!(status.force_segment(1), None);
        assert_eq!(status.force_segment(2), Some((3, 3)));
    }

    #[test]
    fn test_impulse_transition_keeps_new_contacts_only() {
        let mut pre = three_point_status();
        pre.set_contact_active(0, true);
        let mut post = three_point_status();
        post.set_contact_active(0, true);
        post.set_contact_active(1, true);
        post.set_placement(1, Vector3::new(0.1, 0.2, 0.0));

        let impulse = pre.impulse_transition(&post);
        assert!(!impulse.is_contact_active(0));
        assert!(impulse.is_contact_active(1));
        assert_eq!(impulse.placement(1), &Vector3::new(0.1, 0.2, 0.0));
        assert_eq!(impulse.dimf(), 3);
    }

    #[test]
    fn test_surface_contact_dimf() {
        let mut status = ContactStatus::new(vec![ContactType::Point, ContactType::Surface]);
        status.set_contact_active(1, true);
        assert_eq!(status.dimf(), 6);
    }
}
