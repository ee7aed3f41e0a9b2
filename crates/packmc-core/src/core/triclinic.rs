use crate::core::shape::Shape;
use nalgebra::{Matrix3, Point3, Vector3};

/// One of the three box axes; used to address walls and shrink directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A general parallelepiped simulation cell.
///
/// The columns of the dimension matrix are the box side vectors; the inverse
/// is cached because relative-coordinate mapping sits on the hot path of every
/// boundary-condition query. The matrix must be invertible (non-zero volume).
#[derive(Debug, Clone, PartialEq)]
pub struct TriclinicBox {
    dimensions: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl TriclinicBox {
    pub fn new(dimensions: Matrix3<f64>) -> Self {
        let inverse = dimensions
            .try_inverse()
            .unwrap_or_else(|| panic!("degenerate box matrix: {dimensions}"));
        Self { dimensions, inverse }
    }

    /// An axis-aligned (orthorhombic) box with the given side lengths.
    pub fn from_dimensions(dimensions: [f64; 3]) -> Self {
        Self::new(Matrix3::from_diagonal(&Vector3::from(dimensions)))
    }

    /// A cubic box of side `linear_size`.
    pub fn cubic(linear_size: f64) -> Self {
        Self::from_dimensions([linear_size; 3])
    }

    /// A box spanned by three explicit side vectors.
    pub fn from_sides(sides: [Vector3<f64>; 3]) -> Self {
        Self::new(Matrix3::from_columns(&sides))
    }

    pub fn dimensions(&self) -> &Matrix3<f64> {
        &self.dimensions
    }

    pub fn absolute_to_relative(&self, pos: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse * pos.coords)
    }

    pub fn relative_to_absolute(&self, pos: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.dimensions * pos.coords)
    }

    pub fn absolute_to_relative_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * v
    }

    pub fn relative_to_absolute_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.dimensions * v
    }

    /// Maps every shape position to relative coordinates in place.
    pub fn absolute_to_relative_shapes(&self, shapes: &mut [Shape]) {
        for shape in shapes {
            shape.set_position(self.absolute_to_relative(&shape.position()));
        }
    }

    /// Maps every shape position back to absolute coordinates in place.
    pub fn relative_to_absolute_shapes(&self, shapes: &mut [Shape]) {
        for shape in shapes {
            shape.set_position(self.relative_to_absolute(&shape.position()));
        }
    }

    /// Applies `transformation` to the box (left multiplication of the
    /// dimension matrix).
    pub fn transform(&mut self, transformation: &Matrix3<f64>) {
        *self = Self::new(transformation * self.dimensions);
    }

    /// Scales the box anisotropically. For a sheared box unequal factors also
    /// change the angles between the sides.
    pub fn scale(&mut self, factors: [f64; 3]) {
        self.transform(&Matrix3::from_diagonal(&Vector3::from(factors)));
    }

    pub fn sides(&self) -> [Vector3<f64>; 3] {
        [
            self.dimensions.column(0).into(),
            self.dimensions.column(1).into(),
            self.dimensions.column(2).into(),
        ]
    }

    pub fn volume(&self) -> f64 {
        let [s0, s1, s2] = self.sides();
        s0.cross(&s1).dot(&s2).abs()
    }

    /// Face-to-face distances, one per axis. A height must exceed the
    /// interaction range for a periodic packing not to overlap its own images.
    pub fn heights(&self) -> [f64; 3] {
        let [s0, s1, s2] = self.sides();
        let volume = self.volume();
        [
            volume / s1.cross(&s2).norm(),
            volume / s2.cross(&s0).norm(),
            volume / s0.cross(&s1).norm(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn cubic_box_has_expected_volume_and_heights() {
        let cell = TriclinicBox::cubic(5.0);
        assert!((cell.volume() - 125.0).abs() < TOLERANCE);
        for height in cell.heights() {
            assert!((height - 5.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn orthorhombic_heights_equal_side_lengths() {
        let cell = TriclinicBox::from_dimensions([2.0, 3.0, 4.0]);
        let heights = cell.heights();
        assert!((heights[0] - 2.0).abs() < TOLERANCE);
        assert!((heights[1] - 3.0).abs() < TOLERANCE);
        assert!((heights[2] - 4.0).abs() < TOLERANCE);
    }

    #[test]
    fn sheared_box_heights_are_perpendicular_distances() {
        // x side tilted into y: the y height shrinks, x height stays.
        let cell = TriclinicBox::from_sides([
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(1.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        ]);
        assert!((cell.volume() - 8.0).abs() < TOLERANCE);
        let heights = cell.heights();
        assert!((heights[0] - 2.0).abs() < TOLERANCE);
        assert!((heights[1] - 2.0).abs() < TOLERANCE);
        assert!((heights[2] - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn relative_absolute_roundtrip() {
        let cell = TriclinicBox::from_sides([
            Vector3::new(3.0, 0.1, 0.0),
            Vector3::new(0.0, 4.0, 0.2),
            Vector3::new(0.3, 0.0, 5.0),
        ]);
        let point = Point3::new(1.3, -0.4, 2.2);
        let roundtrip = cell.relative_to_absolute(&cell.absolute_to_relative(&point));
        assert!((roundtrip - point).norm() < TOLERANCE);
    }

    #[test]
    fn bulk_shape_mapping_matches_single_point_mapping() {
        let cell = TriclinicBox::from_dimensions([2.0, 4.0, 8.0]);
        let mut shapes = vec![
            Shape::at(Point3::new(1.0, 1.0, 1.0)),
            Shape::at(Point3::new(0.5, 3.0, 6.0)),
        ];
        cell.absolute_to_relative_shapes(&mut shapes);
        assert!((shapes[0].position() - Point3::new(0.5, 0.25, 0.125)).norm() < TOLERANCE);
        cell.relative_to_absolute_shapes(&mut shapes);
        assert!((shapes[1].position() - Point3::new(0.5, 3.0, 6.0)).norm() < TOLERANCE);
    }

    #[test]
    fn scale_multiplies_volume_by_factor_product() {
        let mut cell = TriclinicBox::cubic(2.0);
        cell.scale([2.0, 1.0, 0.5]);
        assert!((cell.volume() - 8.0).abs() < TOLERANCE);
        let heights = cell.heights();
        assert!((heights[0] - 4.0).abs() < TOLERANCE);
        assert!((heights[2] - 1.0).abs() < TOLERANCE);
    }

    #[test]
    #[should_panic(expected = "degenerate box matrix")]
    fn degenerate_box_panics() {
        TriclinicBox::from_dimensions([1.0, 0.0, 1.0]);
    }
}
