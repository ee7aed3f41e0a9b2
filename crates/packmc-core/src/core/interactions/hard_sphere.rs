use crate::core::boundary::BoundaryConditions;
use crate::core::interaction::{Interaction, InteractionSite};
use crate::core::shape::ShapeData;
use nalgebra::{Point3, Vector3};

/// Hard spheres of a common radius; purely overlap-forming, no soft part.
///
/// With a non-empty centre list every shape becomes a rigid union of spheres
/// sharing the orientation of the parent body (the polysphere case), which is
/// the simplest model exercising the multi-centre dispatch end to end.
#[derive(Debug, Clone)]
pub struct HardSphere {
    radius: f64,
    centres: Vec<Vector3<f64>>,
}

impl HardSphere {
    pub fn new(radius: f64) -> Self {
        Self::with_centres(radius, Vec::new())
    }

    pub fn with_centres(radius: f64, centres: Vec<Vector3<f64>>) -> Self {
        assert!(radius > 0.0, "sphere radius must be positive");
        Self { radius, centres }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Interaction for HardSphere {
    fn has_hard_part(&self) -> bool {
        true
    }

    fn has_soft_part(&self) -> bool {
        false
    }

    fn range_radius(&self, _data: &ShapeData) -> f64 {
        2.0 * self.radius
    }

    fn interaction_centres(&self, _data: &ShapeData) -> Vec<Vector3<f64>> {
        self.centres.clone()
    }

    fn overlap_between(
        &self,
        site1: InteractionSite,
        site2: InteractionSite,
        bc: &dyn BoundaryConditions,
    ) -> bool {
        let sigma = 2.0 * self.radius;
        // Strict comparison: exactly tangent spheres do not overlap.
        bc.distance2(&site1.position, &site2.position) < sigma * sigma
    }

    fn overlap_with_wall(
        &self,
        site: InteractionSite,
        wall_origin: &Point3<f64>,
        wall_vector: &Vector3<f64>,
    ) -> bool {
        let normal = wall_vector.normalize();
        (site.position - wall_origin).dot(&normal) < self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::boundary::{FreeBoundaryConditions, PeriodicBoundaryConditions};
    use crate::core::shape::Shape;

    fn spheres_at(x1: f64, x2: f64) -> (Shape, Shape) {
        (
            Shape::at(Point3::new(x1, 0.0, 0.0)),
            Shape::at(Point3::new(x2, 0.0, 0.0)),
        )
    }

    #[test]
    fn spheres_closer_than_diameter_overlap() {
        let interaction = HardSphere::new(0.5);
        let (a, b) = spheres_at(0.0, 0.9);
        assert!(interaction.overlap_between_shapes(&a, &b, &FreeBoundaryConditions));
    }

    #[test]
    fn spheres_apart_do_not_overlap() {
        let interaction = HardSphere::new(0.5);
        let (a, b) = spheres_at(0.0, 1.1);
        assert!(!interaction.overlap_between_shapes(&a, &b, &FreeBoundaryConditions));
    }

    #[test]
    fn tangent_spheres_do_not_overlap() {
        let interaction = HardSphere::new(0.5);
        let (a, b) = spheres_at(0.0, 1.0);
        assert!(!interaction.overlap_between_shapes(&a, &b, &FreeBoundaryConditions));
    }

    #[test]
    fn overlap_is_symmetric() {
        let interaction = HardSphere::new(0.5);
        let bc = PeriodicBoundaryConditions::cubic(10.0);
        let (a, b) = spheres_at(0.2, 9.8);
        assert_eq!(
            interaction.overlap_between_shapes(&a, &b, &bc),
            interaction.overlap_between_shapes(&b, &a, &bc),
        );
        // And the pair does overlap through the periodic boundary.
        assert!(interaction.overlap_between_shapes(&a, &b, &bc));
    }

    #[test]
    fn polysphere_dimer_overlaps_through_offset_centre() {
        let interaction = HardSphere::with_centres(
            0.5,
            vec![Vector3::new(0.5, 0.0, 0.0), Vector3::new(-0.5, 0.0, 0.0)],
        );
        // Body centres 2.4 apart: nearest constituent spheres are 1.4 apart,
        // still separated...
        let (a, b) = spheres_at(0.0, 2.4);
        assert!(!interaction.overlap_between_shapes(&a, &b, &FreeBoundaryConditions));
        // ...but at 1.8 the facing spheres are only 0.8 apart.
        let (a, b) = spheres_at(0.0, 1.8);
        assert!(interaction.overlap_between_shapes(&a, &b, &FreeBoundaryConditions));
    }

    #[test]
    fn wall_check_uses_distance_to_plane() {
        let interaction = HardSphere::new(0.5);
        let wall_origin = Point3::origin();
        let inward = Vector3::x();
        let touching = Shape::at(Point3::new(0.5, 1.0, 1.0));
        let sunk = Shape::at(Point3::new(0.4, 1.0, 1.0));
        assert!(!interaction.overlap_with_wall_for_shape(&touching, &wall_origin, &inward));
        assert!(interaction.overlap_with_wall_for_shape(&sunk, &wall_origin, &inward));
    }

    #[test]
    #[should_panic(expected = "sphere radius must be positive")]
    fn non_positive_radius_panics() {
        HardSphere::new(0.0);
    }
}
