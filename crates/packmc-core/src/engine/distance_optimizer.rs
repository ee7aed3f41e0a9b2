use crate::core::boundary::FreeBoundaryConditions;
use crate::core::interaction::Interaction;
use crate::core::shape::Shape;
use crate::core::triclinic::Axis;
use crate::engine::packing::Packing;
use nalgebra::Vector3;
use thiserror::Error;
use tracing::{debug, info};

// bisection convergence, both for absolute distances and scaling factors
const PRECISION: f64 = 1e-12;
const MAX_SEPARATION: f64 = 1000.0;
// keeps the minimal shrink factor robustly above the self-overlap height
const FLOOR_MARGIN: f64 = 1e-9;

/// Errors from tangent-distance searches and packing shrinking.
#[derive(Debug, Error, PartialEq)]
pub enum OptimizerError {
    #[error("direction vector is degenerate")]
    DegenerateDirection,
    #[error("interaction has no hard part to optimize against")]
    NoHardPart,
    #[error("shapes do not overlap at zero separation")]
    NotOverlapping,
    #[error("shapes still overlap at separation {MAX_SEPARATION}")]
    TangentNotFound,
    #[error("packing contains overlaps and cannot be shrunk")]
    OverlappingPacking,
    #[error("box height along axis {axis:?} is already at the interaction range")]
    BoxTooSmall { axis: Axis },
    #[error("packing stays overlap-free at the minimal box height along axis {axis:?}")]
    PackingTooSparse { axis: Axis },
}

/// Finds the smallest separation along `direction` at which `shape2`, moved to
/// `shape1`'s position plus that separation, no longer overlaps `shape1`.
///
/// Orientations and shape data are taken as given; boundary conditions are
/// free, so the result is a property of the two bodies alone. The search
/// doubles the separation until the overlap clears, then bisects down to
/// absolute precision `1e-12`.
pub fn minimize_for_direction<I: Interaction + ?Sized>(
    shape1: &Shape,
    shape2: &Shape,
    direction: Vector3<f64>,
    interaction: &I,
) -> Result<f64, OptimizerError> {
    let norm = direction.norm();
    if norm < PRECISION {
        return Err(OptimizerError::DegenerateDirection);
    }
    if !interaction.has_hard_part() {
        return Err(OptimizerError::NoHardPart);
    }
    let direction = direction / norm;

    let overlapping = |distance: f64| {
        let mut probe = shape2.clone();
        probe.set_position(shape1.position() + distance * direction);
        interaction.overlap_between_shapes(shape1, &probe, &FreeBoundaryConditions)
    };

    if !overlapping(0.0) {
        return Err(OptimizerError::NotOverlapping);
    }

    let mut hi = 1.0;
    while overlapping(hi) {
        hi *= 2.0;
        if hi > MAX_SEPARATION {
            return Err(OptimizerError::TangentNotFound);
        }
    }
    let mut lo = hi / 2.0;

    while hi - lo > PRECISION {
        let mid = 0.5 * (lo + hi);
        if overlapping(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    debug!(distance = hi, "tangent separation found");
    Ok(hi)
}

/// Tangent separations along the three coordinate axes.
pub fn minimize_for_axes<I: Interaction + ?Sized>(
    shape1: &Shape,
    shape2: &Shape,
    interaction: &I,
) -> Result<[f64; 3], OptimizerError> {
    Ok([
        minimize_for_direction(shape1, shape2, Vector3::x(), interaction)?,
        minimize_for_direction(shape1, shape2, Vector3::y(), interaction)?,
        minimize_for_direction(shape1, shape2, Vector3::z(), interaction)?,
    ])
}

/// Shrinks the box of an overlap-free packing axis by axis, in `axis_order`,
/// each time bisecting the per-axis scaling factor down to the smallest value
/// that introduces no overlap.
///
/// Relative shape coordinates are preserved by the scaling, so this compacts
/// a lattice without disturbing its arrangement. The bisection bracket on each
/// axis runs from the range-derived minimal factor (which must overlap, or the
/// packing is too sparse to reach a tangent configuration on that axis) up to
/// the current box. Axes already shrunk before a failing one stay committed.
pub fn shrink_packing<I: Interaction + ?Sized>(
    packing: &mut Packing,
    interaction: &I,
    axis_order: [Axis; 3],
) -> Result<(), OptimizerError> {
    if !interaction.has_hard_part() {
        return Err(OptimizerError::NoHardPart);
    }
    if packing.count_total_overlaps(interaction, true) > 0 {
        return Err(OptimizerError::OverlappingPacking);
    }

    for axis in axis_order {
        let height = packing.cell().heights()[axis.index()];
        let range = packing.total_interaction_range();
        let floor = (range / height) * (1.0 + FLOOR_MARGIN);
        if floor >= 1.0 {
            return Err(OptimizerError::BoxTooSmall { axis });
        }
        if !scaled_overlapping(packing, interaction, axis, floor) {
            return Err(OptimizerError::PackingTooSparse { axis });
        }

        let mut lo = floor;
        let mut hi = 1.0;
        while hi - lo > PRECISION {
            let mid = 0.5 * (lo + hi);
            if scaled_overlapping(packing, interaction, axis, mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let result = packing.try_scaling(axis_factors(axis, hi), interaction);
        assert!(
            !result.creates_overlap(),
            "converged shrink factor reintroduced an overlap"
        );
        info!(?axis, factor = hi, "shrunk packing axis");
    }
    Ok(())
}

fn axis_factors(axis: Axis, factor: f64) -> [f64; 3] {
    let mut factors = [1.0; 3];
    factors[axis.index()] = factor;
    factors
}

fn scaled_overlapping<I: Interaction + ?Sized>(
    packing: &mut Packing,
    interaction: &I,
    axis: Axis,
    factor: f64,
) -> bool {
    let result = packing.try_scaling(axis_factors(axis, factor), interaction);
    packing.revert_scaling();
    result.creates_overlap()
}
