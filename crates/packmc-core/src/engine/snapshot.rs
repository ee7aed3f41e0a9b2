use crate::core::boundary::BoundaryConditions;
use crate::core::interaction::Interaction;
use crate::core::shape::{Shape, ShapeData};
use crate::core::triclinic::TriclinicBox;
use crate::engine::packing::Packing;
use nalgebra::{Matrix3, Point3, Rotation3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;
use tracing::info;

const FORMAT_VERSION: u32 = 1;
const ORTHONORMALITY_TOLERANCE: f64 = 1e-9;

/// Errors produced while storing or restoring a packing snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] toml::de::Error),
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported snapshot format version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u32),
    #[error("shape {index} carries a non-orthonormal orientation matrix")]
    InvalidOrientation { index: usize },
    #[error("snapshot box matrix is degenerate")]
    DegenerateBox,
    #[error("restored configuration contains hard overlaps")]
    OverlappingConfiguration,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShapeRecord {
    position: [f64; 3],
    orientation: [[f64; 3]; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    format_version: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    aux: BTreeMap<String, String>,
    // box side vectors as rows
    cell: [[f64; 3]; 3],
    shapes: Vec<ShapeRecord>,
}

fn orientation_rows(rotation: &Rotation3<f64>) -> [[f64; 3]; 3] {
    let m = rotation.matrix();
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

fn rows_to_matrix(r: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::new(
        r[0][0], r[0][1], r[0][2],
        r[1][0], r[1][1], r[1][2],
        r[2][0], r[2][1], r[2][2],
    )
}

fn validate_orientation(matrix: &Matrix3<f64>) -> bool {
    let gram = matrix.transpose() * matrix;
    (gram - Matrix3::identity()).norm() < ORTHONORMALITY_TOLERANCE
        && (matrix.determinant() - 1.0).abs() < ORTHONORMALITY_TOLERANCE
}

impl Packing {
    /// Serializes the box, all shapes and `aux` key-value metadata as TOML.
    pub fn store(
        &self,
        out: &mut dyn Write,
        aux: &BTreeMap<String, String>,
    ) -> Result<(), SnapshotError> {
        let sides = self.cell().sides();
        let record = SnapshotRecord {
            format_version: FORMAT_VERSION,
            aux: aux.clone(),
            cell: [sides[0].into(), sides[1].into(), sides[2].into()],
            shapes: self
                .shapes()
                .iter()
                .map(|shape| ShapeRecord {
                    position: shape.position().coords.into(),
                    orientation: orientation_rows(shape.orientation()),
                    data: shape.data().as_bytes().to_vec(),
                })
                .collect(),
        };
        out.write_all(toml::to_string_pretty(&record)?.as_bytes())?;
        Ok(())
    }

    /// Deserializes a snapshot written by [`Packing::store`] into a fresh
    /// packing, returning it together with the stored `aux` metadata.
    ///
    /// Orientations are validated for orthonormality before being accepted as
    /// rotations; positions outside the stored box are folded in by the
    /// constructor as usual. With `validate_overlaps` (and a hard interaction
    /// part) a restored configuration containing overlaps is rejected;
    /// opting out admits deliberately overlapped starting points.
    pub fn restore<I: Interaction + ?Sized>(
        input: &mut dyn Read,
        bc: Box<dyn BoundaryConditions>,
        interaction: &I,
        move_threads: usize,
        scaling_threads: usize,
        validate_overlaps: bool,
    ) -> Result<(Self, BTreeMap<String, String>), SnapshotError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let record: SnapshotRecord = toml::from_str(&text)?;
        if record.format_version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(record.format_version));
        }

        let dimensions = rows_to_matrix(&record.cell).transpose();
        if dimensions.determinant().abs() < f64::EPSILON {
            return Err(SnapshotError::DegenerateBox);
        }
        let cell = TriclinicBox::new(dimensions);

        let mut shapes = Vec::with_capacity(record.shapes.len());
        for (index, shape) in record.shapes.iter().enumerate() {
            let matrix = rows_to_matrix(&shape.orientation);
            if !validate_orientation(&matrix) {
                return Err(SnapshotError::InvalidOrientation { index });
            }
            shapes.push(Shape::new(
                Point3::from(shape.position),
                Rotation3::from_matrix_unchecked(matrix),
                ShapeData::new(shape.data.clone()),
            ));
        }

        let packing = Packing::new(cell, shapes, bc, interaction, move_threads, scaling_threads);
        if validate_overlaps
            && interaction.has_hard_part()
            && packing.count_total_overlaps(interaction, true) > 0
        {
            return Err(SnapshotError::OverlappingConfiguration);
        }
        info!(shapes = packing.len(), "restored packing snapshot");
        Ok((packing, record.aux))
    }
}
