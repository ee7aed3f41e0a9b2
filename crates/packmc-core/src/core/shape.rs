use crate::core::boundary::BoundaryConditions;
use nalgebra::{Point3, Rotation3, Vector3};
use std::sync::Arc;

/// Opaque, cheaply clonable per-shape payload interpreted by an `Interaction`.
///
/// The packing engine never looks inside; it only carries the blob alongside
/// the shape's position and orientation. Single-parameter models (spheres with
/// a fixed radius, for example) leave it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeData(Arc<[u8]>);

impl ShapeData {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Arc::from([] as [u8; 0]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ShapeData {
    fn default() -> Self {
        Self::empty()
    }
}

/// One rigid body instance: a position, an orientation and the opaque
/// shape-specific payload.
///
/// Inside a [`Packing`](crate::engine::packing::Packing) shapes are mutated
/// only through the trial-commit paths; detached clones (as used by the
/// distance optimizer) may be moved freely with the setters below.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    position: Point3<f64>,
    orientation: Rotation3<f64>,
    data: ShapeData,
}

impl Shape {
    pub fn new(position: Point3<f64>, orientation: Rotation3<f64>, data: ShapeData) -> Self {
        Self {
            position,
            orientation,
            data,
        }
    }

    /// A shape at `position` with the identity orientation and empty data.
    pub fn at(position: Point3<f64>) -> Self {
        Self::new(position, Rotation3::identity(), ShapeData::empty())
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn orientation(&self) -> &Rotation3<f64> {
        &self.orientation
    }

    pub fn data(&self) -> &ShapeData {
        &self.data
    }

    pub fn set_position(&mut self, position: Point3<f64>) {
        self.position = position;
    }

    pub fn set_orientation(&mut self, orientation: Rotation3<f64>) {
        self.orientation = orientation;
    }

    /// Translates the shape and folds the result back into the canonical cell.
    pub fn translate(&mut self, translation: Vector3<f64>, bc: &dyn BoundaryConditions) {
        self.position += translation;
        self.position += bc.correction(&self.position);
    }

    /// Rotates the shape about its own position.
    pub fn rotate(&mut self, rotation: &Rotation3<f64>) {
        self.orientation = rotation * self.orientation;
    }
}

impl Default for Shape {
    fn default() -> Self {
        Self::at(Point3::origin())
    }
}

/// Export collaborator: turns one shape into its textual representation.
///
/// Out-of-crate writers (XYZ, Wolfram, OBJ, ...) implement this and are driven
/// by [`Packing::write_shapes`](crate::engine::packing::Packing::write_shapes).
pub trait ShapePrinter {
    fn print(&self, shape: &Shape) -> String;
}
