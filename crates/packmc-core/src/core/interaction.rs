use crate::core::boundary::BoundaryConditions;
use crate::core::shape::{Shape, ShapeData};
use nalgebra::{Point3, Rotation3, Vector3};

/// One interaction centre of a shape, as seen by the primitive hooks: an
/// absolute centre position, the owning shape's orientation and data, and the
/// centre's index within the shape's decomposition.
#[derive(Debug, Clone, Copy)]
pub struct InteractionSite<'a> {
    pub position: Point3<f64>,
    pub orientation: &'a Rotation3<f64>,
    pub data: &'a ShapeData,
    pub centre: usize,
}

/// Absolute position of one interaction centre of a shape.
pub fn centre_position(shape: &Shape, centre: &Vector3<f64>) -> Point3<f64> {
    shape.position() + shape.orientation() * centre
}

/// A pairwise (and optionally multi-centre) physics model.
///
/// Implementations provide the *centre-level* primitives (`overlap_between`,
/// `energy_between`, `overlap_with_wall`); the whole-shape compositions are
/// derived here by iterating the cross product of the two shapes' centre
/// decompositions. This keeps `Packing` free of any shape-specific branching:
/// a new geometry only has to implement the primitives.
///
/// A model may have a hard (overlap-forbidding) part, a soft (energetic)
/// part, both, or trivially neither; `range_radius` bounds the
/// centre-to-centre distance beyond which both parts are guaranteed inert.
pub trait Interaction: Send + Sync {
    fn has_hard_part(&self) -> bool;

    fn has_soft_part(&self) -> bool;

    /// Centre-to-centre cutoff distance for the shape described by `data`.
    fn range_radius(&self, data: &ShapeData) -> f64;

    /// Rigid offsets of the interaction centres. Empty means the shape is
    /// single-centre with the centre at its origin.
    fn interaction_centres(&self, _data: &ShapeData) -> Vec<Vector3<f64>> {
        Vec::new()
    }

    /// Soft energy between two centres. Must vanish beyond `range_radius`.
    fn energy_between(
        &self,
        _site1: InteractionSite,
        _site2: InteractionSite,
        _bc: &dyn BoundaryConditions,
    ) -> f64 {
        0.0
    }

    /// Hard-core verdict between two centres. Must be symmetric in its
    /// arguments and false beyond `range_radius`.
    fn overlap_between(
        &self,
        _site1: InteractionSite,
        _site2: InteractionSite,
        _bc: &dyn BoundaryConditions,
    ) -> bool {
        false
    }

    /// Hard verdict between one centre and a wall plane given by a point on it
    /// and its inward normal.
    fn overlap_with_wall(
        &self,
        _site: InteractionSite,
        _wall_origin: &Point3<f64>,
        _wall_vector: &Vector3<f64>,
    ) -> bool {
        false
    }

    /// Radius bounding the footprint of the whole (possibly multi-centre)
    /// body: 2 * (max centre offset) + `range_radius`. This is the quantity
    /// checked against box heights and lattice spacings.
    fn total_range_radius(&self, data: &ShapeData) -> f64 {
        let range = self.range_radius(data);
        let centres = self.interaction_centres(data);
        let max_offset2 = centres
            .iter()
            .map(|c| c.norm_squared())
            .fold(0.0, f64::max);
        2.0 * max_offset2.sqrt() + range
    }

    /// Sums `energy_between` over the cross product of both shapes' centres.
    ///
    /// Panics if exactly one of the two shapes reports an empty centre list:
    /// the decomposition granularity must match.
    fn energy_between_shapes(
        &self,
        shape1: &Shape,
        shape2: &Shape,
        bc: &dyn BoundaryConditions,
    ) -> f64 {
        let centres1 = self.interaction_centres(shape1.data());
        let centres2 = self.interaction_centres(shape2.data());
        assert_eq!(
            centres1.is_empty(),
            centres2.is_empty(),
            "mismatched interaction-centre decomposition between shapes"
        );

        if centres1.is_empty() {
            return self.energy_between(site_of(shape1, 0), site_of(shape2, 0), bc);
        }

        let mut energy = 0.0;
        for (i, c1) in centres1.iter().enumerate() {
            let pos1 = centre_position(shape1, c1);
            for (j, c2) in centres2.iter().enumerate() {
                let pos2 = centre_position(shape2, c2);
                energy += self.energy_between(
                    site_at(shape1, pos1, i),
                    site_at(shape2, pos2, j),
                    bc,
                );
            }
        }
        energy
    }

    /// ORs `overlap_between` over the cross product of both shapes' centres,
    /// short-circuiting on the first hit.
    ///
    /// Panics if exactly one of the two shapes reports an empty centre list.
    fn overlap_between_shapes(
        &self,
        shape1: &Shape,
        shape2: &Shape,
        bc: &dyn BoundaryConditions,
    ) -> bool {
        let centres1 = self.interaction_centres(shape1.data());
        let centres2 = self.interaction_centres(shape2.data());
        assert_eq!(
            centres1.is_empty(),
            centres2.is_empty(),
            "mismatched interaction-centre decomposition between shapes"
        );

        if centres1.is_empty() {
            return self.overlap_between(site_of(shape1, 0), site_of(shape2, 0), bc);
        }

        for (i, c1) in centres1.iter().enumerate() {
            let pos1 = centre_position(shape1, c1);
            for (j, c2) in centres2.iter().enumerate() {
                let pos2 = centre_position(shape2, c2);
                if self.overlap_between(site_at(shape1, pos1, i), site_at(shape2, pos2, j), bc) {
                    return true;
                }
            }
        }
        false
    }

    /// Per-centre wall check, OR-reduced across the shape's centres.
    fn overlap_with_wall_for_shape(
        &self,
        shape: &Shape,
        wall_origin: &Point3<f64>,
        wall_vector: &Vector3<f64>,
    ) -> bool {
        let centres = self.interaction_centres(shape.data());
        if centres.is_empty() {
            return self.overlap_with_wall(site_of(shape, 0), wall_origin, wall_vector);
        }
        centres.iter().enumerate().any(|(i, c)| {
            self.overlap_with_wall(
                site_at(shape, centre_position(shape, c), i),
                wall_origin,
                wall_vector,
            )
        })
    }
}

fn site_of(shape: &Shape, centre: usize) -> InteractionSite<'_> {
    InteractionSite {
        position: shape.position(),
        orientation: shape.orientation(),
        data: shape.data(),
        centre,
    }
}

fn site_at(shape: &Shape, position: Point3<f64>, centre: usize) -> InteractionSite<'_> {
    InteractionSite {
        position,
        orientation: shape.orientation(),
        data: shape.data(),
        centre,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::boundary::FreeBoundaryConditions;

    // Counts distance-paired pings at centre granularity so the cross-product
    // dispatch can be verified exactly.
    struct PairCounter {
        centres: Vec<Vector3<f64>>,
    }

    impl Interaction for PairCounter {
        fn has_hard_part(&self) -> bool {
            false
        }

        fn has_soft_part(&self) -> bool {
            true
        }

        fn range_radius(&self, _data: &ShapeData) -> f64 {
            1.0
        }

        fn interaction_centres(&self, _data: &ShapeData) -> Vec<Vector3<f64>> {
            self.centres.clone()
        }

        fn energy_between(
            &self,
            _site1: InteractionSite,
            _site2: InteractionSite,
            _bc: &dyn BoundaryConditions,
        ) -> f64 {
            1.0
        }
    }

    struct MixedCentres;

    impl Interaction for MixedCentres {
        fn has_hard_part(&self) -> bool {
            true
        }

        fn has_soft_part(&self) -> bool {
            false
        }

        fn range_radius(&self, _data: &ShapeData) -> f64 {
            1.0
        }

        fn interaction_centres(&self, data: &ShapeData) -> Vec<Vector3<f64>> {
            if data.is_empty() {
                Vec::new()
            } else {
                vec![Vector3::zeros()]
            }
        }
    }

    #[test]
    fn energy_between_shapes_iterates_full_centre_cross_product() {
        let interaction = PairCounter {
            centres: vec![
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::new(-0.5, 0.0, 0.0),
                Vector3::new(0.0, 0.5, 0.0),
            ],
        };
        let a = Shape::at(Point3::origin());
        let b = Shape::at(Point3::new(5.0, 0.0, 0.0));
        let energy = interaction.energy_between_shapes(&a, &b, &FreeBoundaryConditions);
        assert_eq!(energy, 9.0);
    }

    #[test]
    fn single_centre_shapes_dispatch_once() {
        let interaction = PairCounter { centres: vec![] };
        let a = Shape::at(Point3::origin());
        let b = Shape::at(Point3::new(5.0, 0.0, 0.0));
        let energy = interaction.energy_between_shapes(&a, &b, &FreeBoundaryConditions);
        assert_eq!(energy, 1.0);
    }

    #[test]
    #[should_panic(expected = "mismatched interaction-centre decomposition")]
    fn mixed_decomposition_panics() {
        let interaction = MixedCentres;
        let single = Shape::at(Point3::origin());
        let multi = Shape::new(
            Point3::new(3.0, 0.0, 0.0),
            Rotation3::identity(),
            ShapeData::new(vec![1u8]),
        );
        interaction.overlap_between_shapes(&single, &multi, &FreeBoundaryConditions);
    }

    #[test]
    fn total_range_radius_accounts_for_centre_offsets() {
        let interaction = PairCounter {
            centres: vec![Vector3::new(1.5, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0)],
        };
        // 2 * max offset + range = 2 * 2 + 1.
        assert!((interaction.total_range_radius(&ShapeData::empty()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn total_range_radius_of_single_centre_shape_is_the_range() {
        let interaction = PairCounter { centres: vec![] };
        assert!((interaction.total_range_radius(&ShapeData::empty()) - 1.0).abs() < 1e-12);
    }
}
