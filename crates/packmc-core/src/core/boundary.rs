use crate::core::triclinic::TriclinicBox;
use nalgebra::{Point3, Vector3};

/// The topology of space: pure functions over positions, no failure modes.
///
/// A packing owns its boundary conditions as a trait object selected at
/// construction time; `set_cell` lets the periodic variant follow box
/// deformations applied by scaling trials (a no-op for free boundaries).
pub trait BoundaryConditions: Send + Sync {
    fn set_cell(&mut self, cell: &TriclinicBox);

    /// The translation that folds `position` back into the canonical cell.
    fn correction(&self, position: &Point3<f64>) -> Vector3<f64>;

    /// The offset to add to `p2` to obtain its minimum-image representative
    /// relative to `p1`.
    fn translation(&self, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64>;

    /// Squared minimum-image distance.
    fn distance2(&self, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
        let t = self.translation(p1, p2);
        (p2 + t - p1).norm_squared()
    }
}

/// Open space: every query is the identity/Euclidean one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeBoundaryConditions;

impl BoundaryConditions for FreeBoundaryConditions {
    fn set_cell(&mut self, _cell: &TriclinicBox) {}

    fn correction(&self, _position: &Point3<f64>) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn translation(&self, _p1: &Point3<f64>, _p2: &Point3<f64>) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn distance2(&self, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
        (p2 - p1).norm_squared()
    }
}

/// Periodic wrap and minimum image under a triclinic cell.
///
/// Both queries work in relative coordinates: folding rounds each component
/// into [0, 1), the minimum image rounds the component-wise difference to the
/// nearest integer. For strongly sheared cells the component-wise minimum
/// image is the standard approximation used by the neighbour-grid range
/// checks downstream.
#[derive(Debug, Clone)]
pub struct PeriodicBoundaryConditions {
    cell: TriclinicBox,
}

impl PeriodicBoundaryConditions {
    pub fn new(cell: TriclinicBox) -> Self {
        Self { cell }
    }

    /// Periodic conditions on a cubic cell of side `linear_size`.
    pub fn cubic(linear_size: f64) -> Self {
        Self::new(TriclinicBox::cubic(linear_size))
    }
}

impl BoundaryConditions for PeriodicBoundaryConditions {
    fn set_cell(&mut self, cell: &TriclinicBox) {
        self.cell = cell.clone();
    }

    fn correction(&self, position: &Point3<f64>) -> Vector3<f64> {
        let rel = self.cell.absolute_to_relative(position);
        let shift = -rel.coords.map(f64::floor);
        self.cell.relative_to_absolute_vector(&shift)
    }

    fn translation(&self, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
        let rel = self.cell.absolute_to_relative_vector(&(p2 - p1));
        let shift = -rel.map(f64::round);
        self.cell.relative_to_absolute_vector(&shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn free_bc_is_identity() {
        let bc = FreeBoundaryConditions;
        let p1 = Point3::new(1.0, 2.0, 3.0);
        let p2 = Point3::new(-4.0, 0.0, 10.0);
        assert_eq!(bc.correction(&p2), Vector3::zeros());
        assert_eq!(bc.translation(&p1, &p2), Vector3::zeros());
        assert!((bc.distance2(&p1, &p2) - (p2 - p1).norm_squared()).abs() < TOLERANCE);
    }

    #[test]
    fn periodic_correction_wraps_out_of_range_translation() {
        // Box of side 10, shape at (0.1, 5, 5) translated by (-0.5, 0, 0):
        // the x coordinate must wrap to 9.6.
        let bc = PeriodicBoundaryConditions::cubic(10.0);
        let moved = Point3::new(0.1 - 0.5, 5.0, 5.0);
        let folded = moved + bc.correction(&moved);
        assert!((folded - Point3::new(9.6, 5.0, 5.0)).norm() < TOLERANCE);
    }

    #[test]
    fn periodic_correction_is_zero_inside_the_cell() {
        let bc = PeriodicBoundaryConditions::cubic(10.0);
        let inside = Point3::new(0.1, 5.0, 9.9);
        assert!(bc.correction(&inside).norm() < TOLERANCE);
    }

    #[test]
    fn minimum_image_translation_picks_nearest_copy() {
        let bc = PeriodicBoundaryConditions::cubic(10.0);
        let p1 = Point3::new(0.5, 5.0, 5.0);
        let p2 = Point3::new(9.5, 5.0, 5.0);
        let t = bc.translation(&p1, &p2);
        assert!((p2 + t - p1 - Vector3::new(-1.0, 0.0, 0.0)).norm() < TOLERANCE);
        assert!((bc.distance2(&p1, &p2) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn minimum_image_distance_in_triclinic_cell() {
        let cell = TriclinicBox::from_sides([
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(2.0, 10.0, 0.0),
            Vector3::new(0.0, 0.0, 10.0),
        ]);
        let bc = PeriodicBoundaryConditions::new(cell);
        // p2 sits one y-side away from p1; minimum image must undo that side.
        let p1 = Point3::new(1.0, 1.0, 1.0);
        let p2 = Point3::new(3.0, 11.0, 1.0);
        assert!(bc.distance2(&p1, &p2) < TOLERANCE);
    }

    #[test]
    fn distance2_is_symmetric() {
        let bc = PeriodicBoundaryConditions::cubic(7.0);
        let p1 = Point3::new(0.3, 6.9, 3.5);
        let p2 = Point3::new(6.8, 0.2, 3.6);
        assert!((bc.distance2(&p1, &p2) - bc.distance2(&p2, &p1)).abs() < TOLERANCE);
    }
}
