use crate::core::boundary::BoundaryConditions;
use crate::core::interaction::{Interaction, InteractionSite};
use crate::core::shape::{Shape, ShapePrinter};
use crate::core::triclinic::{Axis, TriclinicBox};
use crate::engine::domain::ActiveDomain;
use crate::engine::neighbour_grid::NeighbourGrid;
use nalgebra::{Point3, Rotation3, Vector3};
use rayon::prelude::*;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome of a trial operation.
///
/// Hard overlaps are an expected sampling outcome, not an error: a trial that
/// introduces one where none existed reports `OverlapCreated`, one that
/// removes a pre-existing overlap reports `OverlapResolved`, and anything else
/// carries the finite soft-energy delta (new minus old; 0.0 when the
/// interaction has no soft part). [`TrialResult::energy_delta`] folds these
/// back into the legacy +/-infinity encoding for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialResult {
    EnergyDelta(f64),
    OverlapCreated,
    OverlapResolved,
}

impl TrialResult {
    /// The numeric view: finite delta, `+inf` for a created overlap, `-inf`
    /// for a resolved one.
    pub fn energy_delta(&self) -> f64 {
        match self {
            TrialResult::EnergyDelta(delta) => *delta,
            TrialResult::OverlapCreated => f64::INFINITY,
            TrialResult::OverlapResolved => f64::NEG_INFINITY,
        }
    }

    pub fn creates_overlap(&self) -> bool {
        matches!(self, TrialResult::OverlapCreated)
    }
}

struct ScalingSnapshot {
    cell: TriclinicBox,
    shapes: Vec<Shape>,
    absolute_centres: Vec<Point3<f64>>,
}

/// The simulated system: shapes, box, boundary conditions and the spatial
/// acceleration structure, exposing the two-phase trial-move protocol.
///
/// The shape list carries `move_threads` extra slots at its tail. Each worker
/// id owns one slot as scratch space: a `try_*` call writes the proposed state
/// there, evaluates it against the canonical state, and leaves the canonical
/// shapes and the neighbour grid untouched. `accept_*` folds the scratch slot
/// back in and incrementally updates the grid; rejection is implicit, the next
/// trial simply overwrites the slot. Scaling trials are the one asymmetry:
/// they apply the new box directly (the whole grid geometry is invalidated
/// anyway) and must be undone with an explicit [`Packing::revert_scaling`].
///
/// The interaction is borrowed per call rather than stored, so it can be
/// swapped on the fly via [`Packing::setup_for_interaction`].
pub struct Packing {
    // canonical shapes followed by move_threads scratch slots
    shapes: Vec<Shape>,
    // orientation-rotated centre offsets, num_centres per slot
    rotated_centres: Vec<Vector3<f64>>,
    // folded absolute centre positions, parallel to rotated_centres
    absolute_centres: Vec<Point3<f64>>,
    cell: TriclinicBox,
    bc: Box<dyn BoundaryConditions>,
    grid: Option<NeighbourGrid>,
    // parked canonical grid during a scaling trial, swapped back on revert
    temp_grid: Option<NeighbourGrid>,
    range: f64,
    total_range: f64,
    num_centres: usize,
    move_threads: usize,
    scaling_threads: usize,
    walls: [bool; 3],
    last_altered: Vec<Option<usize>>,
    scaling_revert: Option<ScalingSnapshot>,
    grid_rebuilds: usize,
    grid_resizes: usize,
    grid_rebuild_time: Duration,
}

impl std::fmt::Debug for Packing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packing")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

impl Packing {
    /// Creates a packing around `shapes` in `cell`, folding every position
    /// into the canonical cell and building the neighbour grid for
    /// `interaction`.
    ///
    /// `move_threads` sizes the scratch arena for concurrent single-particle
    /// trials (worker ids `0..move_threads`); `scaling_threads > 1` switches
    /// whole-packing reductions to parallel iteration.
    pub fn new<I: Interaction + ?Sized>(
        cell: TriclinicBox,
        mut shapes: Vec<Shape>,
        mut bc: Box<dyn BoundaryConditions>,
        interaction: &I,
        move_threads: usize,
        scaling_threads: usize,
    ) -> Self {
        assert!(!shapes.is_empty(), "packing must contain at least one shape");
        assert!(move_threads >= 1, "at least one move worker is required");
        assert!(scaling_threads >= 1, "at least one scaling thread is required");

        bc.set_cell(&cell);
        for shape in &mut shapes {
            let correction = bc.correction(&shape.position());
            shape.set_position(shape.position() + correction);
        }

        let scratch = shapes[0].clone();
        shapes.extend(std::iter::repeat_with(|| scratch.clone()).take(move_threads));

        let mut packing = Self {
            shapes,
            rotated_centres: Vec::new(),
            absolute_centres: Vec::new(),
            cell,
            bc,
            grid: None,
            temp_grid: None,
            range: 0.0,
            total_range: 0.0,
            num_centres: 0,
            move_threads,
            scaling_threads,
            walls: [false; 3],
            last_altered: vec![None; move_threads],
            scaling_revert: None,
            grid_rebuilds: 0,
            grid_resizes: 0,
            grid_rebuild_time: Duration::ZERO,
        };
        packing.setup_for_interaction(interaction);
        packing
    }

    /// Orthorhombic-box convenience constructor.
    pub fn from_dimensions<I: Interaction + ?Sized>(
        dimensions: [f64; 3],
        shapes: Vec<Shape>,
        bc: Box<dyn BoundaryConditions>,
        interaction: &I,
        move_threads: usize,
        scaling_threads: usize,
    ) -> Self {
        Self::new(
            TriclinicBox::from_dimensions(dimensions),
            shapes,
            bc,
            interaction,
            move_threads,
            scaling_threads,
        )
    }

    /// Number of real shapes (the scratch slots are never counted).
    pub fn len(&self) -> usize {
        self.shapes.len() - self.move_threads
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The real shapes, scratch excluded.
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes[..self.len()]
    }

    pub fn cell(&self) -> &TriclinicBox {
        &self.cell
    }

    pub fn boundary_conditions(&self) -> &dyn BoundaryConditions {
        self.bc.as_ref()
    }

    pub fn move_threads(&self) -> usize {
        self.move_threads
    }

    pub fn scaling_threads(&self) -> usize {
        self.scaling_threads
    }

    /// Per-axis cell counts of the neighbour grid, if one is active.
    pub fn neighbour_grid_divisions(&self) -> Option<[usize; 3]> {
        self.grid.as_ref().map(|g| g.divisions())
    }

    /// Centre-to-centre interaction range the grid is sized for.
    pub fn interaction_range(&self) -> f64 {
        self.range
    }

    /// Whole-body interaction range checked against box heights.
    pub fn total_interaction_range(&self) -> f64 {
        self.total_range
    }

    pub fn volume(&self) -> f64 {
        self.cell.volume()
    }

    /// Packing fraction assuming every molecule occupies `shape_volume`.
    pub fn packing_fraction(&self, shape_volume: f64) -> f64 {
        self.len() as f64 * shape_volume / self.volume()
    }

    pub fn number_density(&self) -> f64 {
        self.len() as f64 / self.volume()
    }

    /// Enables or disables the pair of hard walls on the box faces
    /// perpendicular to `axis`.
    pub fn toggle_wall(&mut self, axis: Axis, enabled: bool) {
        self.walls[axis.index()] = enabled;
    }

    /// Reinitializes centre bookkeeping and the neighbour grid for a new (or
    /// changed) interaction. Positions and orientations are kept.
    pub fn setup_for_interaction<I: Interaction + ?Sized>(&mut self, interaction: &I) {
        let n = self.len();
        let num_centres = interaction.interaction_centres(self.shapes[0].data()).len();
        for i in 1..n {
            assert_eq!(
                interaction.interaction_centres(self.shapes[i].data()).len(),
                num_centres,
                "non-uniform interaction-centre count across shapes"
            );
        }
        self.num_centres = num_centres;
        self.range = (0..n)
            .map(|i| interaction.range_radius(self.shapes[i].data()))
            .fold(0.0, f64::max);
        self.total_range = (0..n)
            .map(|i| interaction.total_range_radius(self.shapes[i].data()))
            .fold(0.0, f64::max);

        let slots = self.shapes.len();
        self.rotated_centres = vec![Vector3::zeros(); slots * num_centres];
        self.absolute_centres = vec![Point3::origin(); slots * num_centres];
        for i in 0..n {
            let offsets = interaction.interaction_centres(self.shapes[i].data());
            for (k, offset) in offsets.iter().enumerate() {
                self.rotated_centres[i * num_centres + k] = self.shapes[i].orientation() * offset;
            }
            self.recompute_absolute_centres_for_slot(i);
        }

        self.grid = None;
        self.rebuild_grid();
    }

    /// Tries translating particle `particle_idx` by `translation` using the
    /// scratch slot of `worker`.
    ///
    /// Nothing canonical changes; commit with [`Packing::accept_translation`]
    /// or simply issue another trial to discard. A move landing outside
    /// `boundaries` (when given) is reported as `OverlapCreated`, the
    /// rejected-move channel.
    pub fn try_translation<I: Interaction + ?Sized>(
        &mut self,
        worker: usize,
        particle_idx: usize,
        translation: Vector3<f64>,
        interaction: &I,
        boundaries: Option<&ActiveDomain>,
    ) -> TrialResult {
        self.try_move(
            worker,
            particle_idx,
            translation,
            &Rotation3::identity(),
            interaction,
            boundaries,
        )
    }

    /// Tries rotating particle `particle_idx` about its own position.
    pub fn try_rotation<I: Interaction + ?Sized>(
        &mut self,
        worker: usize,
        particle_idx: usize,
        rotation: &Rotation3<f64>,
        interaction: &I,
    ) -> TrialResult {
        self.try_move(
            worker,
            particle_idx,
            Vector3::zeros(),
            rotation,
            interaction,
            None,
        )
    }

    /// Tries a combined translation and rotation in one scratch write (one
    /// neighbour-grid scan instead of two).
    pub fn try_move<I: Interaction + ?Sized>(
        &mut self,
        worker: usize,
        particle_idx: usize,
        translation: Vector3<f64>,
        rotation: &Rotation3<f64>,
        interaction: &I,
        boundaries: Option<&ActiveDomain>,
    ) -> TrialResult {
        assert!(
            worker < self.move_threads,
            "worker id {worker} out of range (move_threads = {})",
            self.move_threads
        );
        assert!(particle_idx < self.len(), "particle index out of range");

        let mut new_position = self.shapes[particle_idx].position() + translation;
        new_position += self.bc.correction(&new_position);
        if let Some(domain) = boundaries {
            if !domain.contains(&new_position) {
                self.last_altered[worker] = None;
                return TrialResult::OverlapCreated;
            }
        }

        let slot = self.scratch_slot(worker);
        let mut shape = self.shapes[particle_idx].clone();
        shape.set_position(new_position);
        shape.rotate(rotation);
        self.shapes[slot] = shape;
        for k in 0..self.num_centres {
            self.rotated_centres[slot * self.num_centres + k] =
                rotation * self.rotated_centres[particle_idx * self.num_centres + k];
        }
        self.recompute_absolute_centres_for_slot(slot);
        self.last_altered[worker] = Some(particle_idx);

        self.move_overlap_energy(particle_idx, slot, interaction)
    }

    /// Commits the translation proposed by the last
    /// [`Packing::try_translation`] of `worker`.
    pub fn accept_translation(&mut self, worker: usize) {
        self.commit(worker);
    }

    /// Commits the rotation proposed by the last [`Packing::try_rotation`] of
    /// `worker`.
    pub fn accept_rotation(&mut self, worker: usize) {
        self.commit(worker);
    }

    /// Commits the move proposed by the last [`Packing::try_move`] of
    /// `worker`.
    pub fn accept_move(&mut self, worker: usize) {
        self.commit(worker);
    }

    /// Rescales the box by the three per-axis factors. Applied directly;
    /// undo with [`Packing::revert_scaling`].
    pub fn try_scaling<I: Interaction + ?Sized>(
        &mut self,
        factors: [f64; 3],
        interaction: &I,
    ) -> TrialResult {
        assert!(
            factors.iter().all(|&f| f > 0.0),
            "scaling factors must be positive"
        );
        let mut new_cell = self.cell.clone();
        new_cell.scale(factors);
        self.try_scaling_box(new_cell, interaction)
    }

    /// Isotropic special case of [`Packing::try_scaling`].
    pub fn try_scaling_isotropic<I: Interaction + ?Sized>(
        &mut self,
        factor: f64,
        interaction: &I,
    ) -> TrialResult {
        self.try_scaling([factor; 3], interaction)
    }

    /// Replaces the box wholesale, remapping every shape through its relative
    /// coordinates, and returns the total-energy delta with the usual overlap
    /// convention, evaluated over all pairs since scaling affects every distance.
    ///
    /// The neighbour grid is rebuilt for the new geometry; the previous one is
    /// parked so [`Packing::revert_scaling`] can restore it without another
    /// rebuild.
    pub fn try_scaling_box<I: Interaction + ?Sized>(
        &mut self,
        new_cell: TriclinicBox,
        interaction: &I,
    ) -> TrialResult {
        let old_energy = if interaction.has_soft_part() {
            self.total_energy(interaction)
        } else {
            0.0
        };
        let old_overlaps = if interaction.has_hard_part() {
            self.count_total_overlaps(interaction, false) + self.wall_overlap_total(interaction)
        } else {
            0
        };

        self.scaling_revert = Some(ScalingSnapshot {
            cell: self.cell.clone(),
            shapes: self.shapes.clone(),
            absolute_centres: self.absolute_centres.clone(),
        });

        for i in 0..self.len() {
            let rel = self.cell.absolute_to_relative(&self.shapes[i].position());
            self.shapes[i].set_position(new_cell.relative_to_absolute(&rel));
        }
        self.cell = new_cell;
        self.bc.set_cell(&self.cell);
        self.recompute_all_absolute_centres();
        self.temp_grid = self.grid.take();
        self.rebuild_grid();

        if interaction.has_hard_part() {
            // A height at or below the whole-body range means guaranteed
            // self-overlap through the periodic images; no pair scan needed.
            let total_range = self.total_range;
            if self.cell.heights().iter().any(|&h| h <= total_range) {
                trace!("scaling below self-overlap height, rejecting without pair scan");
                return TrialResult::OverlapCreated;
            }
            let new_overlaps =
                self.count_total_overlaps(interaction, false) + self.wall_overlap_total(interaction);
            if new_overlaps > old_overlaps {
                return TrialResult::OverlapCreated;
            }
            if new_overlaps < old_overlaps {
                return TrialResult::OverlapResolved;
            }
        }

        if interaction.has_soft_part() {
            TrialResult::EnergyDelta(self.total_energy(interaction) - old_energy)
        } else {
            TrialResult::EnergyDelta(0.0)
        }
    }

    /// Restores box, positions, interaction centres and the neighbour grid to
    /// their state before the last scaling trial.
    ///
    /// Panics if no scaling trial is pending; box-level trials have no
    /// implicit discard.
    pub fn revert_scaling(&mut self) {
        let snapshot = self
            .scaling_revert
            .take()
            .expect("revert_scaling called without a pending scaling trial");
        self.cell = snapshot.cell;
        self.bc.set_cell(&self.cell);
        self.shapes = snapshot.shapes;
        self.absolute_centres = snapshot.absolute_centres;
        self.grid = self.temp_grid.take();
    }

    /// Total soft energy of the packing (0.0 for hard-only interactions).
    pub fn total_energy<I: Interaction + ?Sized>(&self, interaction: &I) -> f64 {
        if !interaction.has_soft_part() {
            return 0.0;
        }
        let per_particle = |i: usize| self.particle_energy(i, i, interaction);
        let sum: f64 = if self.scaling_threads > 1 {
            (0..self.len()).into_par_iter().map(per_particle).sum()
        } else {
            (0..self.len()).map(per_particle).sum()
        };
        // every pair contributes to both of its particles
        sum / 2.0
    }

    /// Population variance of the per-particle soft energy.
    pub fn particle_energy_fluctuations<I: Interaction + ?Sized>(&self, interaction: &I) -> f64 {
        if !interaction.has_soft_part() || self.is_empty() {
            return 0.0;
        }
        let per_particle = |i: usize| self.particle_energy(i, i, interaction);
        let energies: Vec<f64> = if self.scaling_threads > 1 {
            (0..self.len()).into_par_iter().map(per_particle).collect()
        } else {
            (0..self.len()).map(per_particle).collect()
        };
        let n = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / n;
        let mean_sq = energies.iter().map(|e| e * e).sum::<f64>() / n;
        (mean_sq - mean * mean).max(0.0)
    }

    /// Counts overlapping centre pairs across the whole packing (0 for
    /// soft-only interactions). With `early_exit` the scan stops at the first
    /// hit and reports 1.
    pub fn count_total_overlaps<I: Interaction + ?Sized>(
        &self,
        interaction: &I,
        early_exit: bool,
    ) -> usize {
        if !interaction.has_hard_part() {
            return 0;
        }
        if early_exit {
            for i in 0..self.len() {
                if self.count_particle_overlaps(i, i, interaction, true) > 0 {
                    return 1;
                }
            }
            return 0;
        }
        let per_particle = |i: usize| self.count_particle_overlaps(i, i, interaction, false);
        let sum: usize = if self.scaling_threads > 1 {
            (0..self.len()).into_par_iter().map(per_particle).sum()
        } else {
            (0..self.len()).map(per_particle).sum()
        };
        sum / 2
    }

    /// Counts shape-wall overlaps over all enabled walls.
    pub fn count_wall_overlaps<I: Interaction + ?Sized>(
        &self,
        interaction: &I,
        early_exit: bool,
    ) -> usize {
        let mut count = 0;
        for i in 0..self.len() {
            count += self.count_particle_wall_overlaps(i, interaction, early_exit);
            if early_exit && count > 0 {
                return count;
            }
        }
        count
    }

    /// Writes every shape through the export collaborator, one per line.
    pub fn write_shapes(&self, out: &mut dyn Write, printer: &dyn ShapePrinter) -> io::Result<()> {
        for shape in self.shapes() {
            writeln!(out, "{}", printer.print(shape))?;
        }
        Ok(())
    }

    /// Complete neighbour-grid rebuilds since the last counter reset.
    pub fn neighbour_grid_rebuilds(&self) -> usize {
        self.grid_rebuilds
    }

    /// Rebuilds that changed the grid geometry since the last counter reset.
    pub fn neighbour_grid_resizes(&self) -> usize {
        self.grid_resizes
    }

    /// Cumulative time spent rebuilding the grid since the last counter reset.
    pub fn neighbour_grid_rebuild_time(&self) -> Duration {
        self.grid_rebuild_time
    }

    pub fn reset_counters(&mut self) {
        self.grid_rebuilds = 0;
        self.grid_resizes = 0;
        self.grid_rebuild_time = Duration::ZERO;
    }

    fn scratch_slot(&self, worker: usize) -> usize {
        self.len() + worker
    }

    fn commit(&mut self, worker: usize) {
        assert!(
            worker < self.move_threads,
            "worker id {worker} out of range (move_threads = {})",
            self.move_threads
        );
        let particle_idx = self.last_altered[worker]
            .take()
            .expect("accept called without a pending trial for this worker");
        let slot = self.scratch_slot(worker);

        self.grid_remove_particle(particle_idx);
        self.shapes[particle_idx] = self.shapes[slot].clone();
        for k in 0..self.num_centres {
            let from = slot * self.num_centres + k;
            let to = particle_idx * self.num_centres + k;
            self.rotated_centres[to] = self.rotated_centres[from];
            self.absolute_centres[to] = self.absolute_centres[from];
        }
        self.grid_insert_particle(particle_idx);
    }

    fn grid_remove_particle(&mut self, particle_idx: usize) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if self.num_centres == 0 {
            grid.remove(particle_idx, &self.shapes[particle_idx].position());
        } else {
            for k in 0..self.num_centres {
                let centre = particle_idx * self.num_centres + k;
                grid.remove(centre, &self.absolute_centres[centre]);
            }
        }
    }

    fn grid_insert_particle(&mut self, particle_idx: usize) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if self.num_centres == 0 {
            grid.insert(particle_idx, &self.shapes[particle_idx].position());
        } else {
            for k in 0..self.num_centres {
                let centre = particle_idx * self.num_centres + k;
                grid.insert(centre, &self.absolute_centres[centre]);
            }
        }
    }

    fn rebuild_grid(&mut self) {
        let start = Instant::now();
        let old_divisions = self.grid.as_ref().map(|g| g.divisions());

        let mut grid = if self.range > 0.0 {
            NeighbourGrid::build(&self.cell, self.range)
        } else {
            None
        };
        if let Some(grid) = grid.as_mut() {
            if self.num_centres == 0 {
                for i in 0..self.len() {
                    grid.insert(i, &self.shapes[i].position());
                }
            } else {
                for centre in 0..self.len() * self.num_centres {
                    grid.insert(centre, &self.absolute_centres[centre]);
                }
            }
        }

        let new_divisions = grid.as_ref().map(|g| g.divisions());
        if old_divisions != new_divisions {
            self.grid_resizes += 1;
        }
        self.grid = grid;
        self.grid_rebuilds += 1;
        self.grid_rebuild_time += start.elapsed();
        debug!(
            divisions = ?new_divisions,
            "neighbour grid rebuilt ({} rebuilds so far)",
            self.grid_rebuilds
        );
    }

    fn recompute_absolute_centres_for_slot(&mut self, slot: usize) {
        let base = self.shapes[slot].position();
        for k in 0..self.num_centres {
            let idx = slot * self.num_centres + k;
            let mut pos = base + self.rotated_centres[idx];
            let correction = self.bc.correction(&pos);
            pos += correction;
            self.absolute_centres[idx] = pos;
        }
    }

    fn recompute_all_absolute_centres(&mut self) {
        for i in 0..self.len() {
            self.recompute_absolute_centres_for_slot(i);
        }
    }

    fn single_site(&self, slot: usize) -> InteractionSite<'_> {
        let shape = &self.shapes[slot];
        InteractionSite {
            position: shape.position(),
            orientation: shape.orientation(),
            data: shape.data(),
            centre: 0,
        }
    }

    fn centre_site(&self, slot: usize, centre: usize) -> InteractionSite<'_> {
        let shape = &self.shapes[slot];
        InteractionSite {
            position: self.absolute_centres[slot * self.num_centres + centre],
            orientation: shape.orientation(),
            data: shape.data(),
            centre,
        }
    }

    // `slot` is where the evaluated state lives (a scratch slot mid-trial, or
    // `original` itself for the canonical state); `original` is the particle
    // identity excluded from its own neighbourhood.
    fn count_particle_overlaps<I: Interaction + ?Sized>(
        &self,
        original: usize,
        slot: usize,
        interaction: &I,
        early_exit: bool,
    ) -> usize {
        let mut count = 0;
        if let Some(grid) = &self.grid {
            if self.num_centres == 0 {
                let site1 = self.single_site(slot);
                for j in grid.neighbours_of(&self.shapes[slot].position()) {
                    if j == original {
                        continue;
                    }
                    if interaction.overlap_between(site1, self.single_site(j), self.bc.as_ref()) {
                        count += 1;
                        if early_exit {
                            return count;
                        }
                    }
                }
            } else {
                for k in 0..self.num_centres {
                    let site1 = self.centre_site(slot, k);
                    for c in grid.neighbours_of(&site1.position) {
                        if c / self.num_centres == original {
                            continue;
                        }
                        let site2 = self.centre_site(c / self.num_centres, c % self.num_centres);
                        if interaction.overlap_between(site1, site2, self.bc.as_ref()) {
                            count += 1;
                            if early_exit {
                                return count;
                            }
                        }
                    }
                }
            }
        } else {
            for j in 0..self.len() {
                if j == original {
                    continue;
                }
                count += self.pair_overlap_count(slot, j, interaction, early_exit);
                if early_exit && count > 0 {
                    return count;
                }
            }
        }
        count
    }

    fn pair_overlap_count<I: Interaction + ?Sized>(
        &self,
        slot: usize,
        other: usize,
        interaction: &I,
        early_exit: bool,
    ) -> usize {
        if self.num_centres == 0 {
            return interaction.overlap_between(
                self.single_site(slot),
                self.single_site(other),
                self.bc.as_ref(),
            ) as usize;
        }
        let mut count = 0;
        for k in 0..self.num_centres {
            let site1 = self.centre_site(slot, k);
            for l in 0..self.num_centres {
                if interaction.overlap_between(site1, self.centre_site(other, l), self.bc.as_ref())
                {
                    count += 1;
                    if early_exit {
                        return count;
                    }
                }
            }
        }
        count
    }

    fn particle_energy<I: Interaction + ?Sized>(
        &self,
        original: usize,
        slot: usize,
        interaction: &I,
    ) -> f64 {
        let mut energy = 0.0;
        if let Some(grid) = &self.grid {
            if self.num_centres == 0 {
                let site1 = self.single_site(slot);
                for j in grid.neighbours_of(&self.shapes[slot].position()) {
                    if j == original {
                        continue;
                    }
                    energy +=
                        interaction.energy_between(site1, self.single_site(j), self.bc.as_ref());
                }
            } else {
                for k in 0..self.num_centres {
                    let site1 = self.centre_site(slot, k);
                    for c in grid.neighbours_of(&site1.position) {
                        if c / self.num_centres == original {
                            continue;
                        }
                        let site2 = self.centre_site(c / self.num_centres, c % self.num_centres);
                        energy += interaction.energy_between(site1, site2, self.bc.as_ref());
                    }
                }
            }
        } else {
            for j in 0..self.len() {
                if j == original {
                    continue;
                }
                energy += self.pair_energy(slot, j, interaction);
            }
        }
        energy
    }

    fn pair_energy<I: Interaction + ?Sized>(
        &self,
        slot: usize,
        other: usize,
        interaction: &I,
    ) -> f64 {
        if self.num_centres == 0 {
            return interaction.energy_between(
                self.single_site(slot),
                self.single_site(other),
                self.bc.as_ref(),
            );
        }
        let mut energy = 0.0;
        for k in 0..self.num_centres {
            let site1 = self.centre_site(slot, k);
            for l in 0..self.num_centres {
                energy +=
                    interaction.energy_between(site1, self.centre_site(other, l), self.bc.as_ref());
            }
        }
        energy
    }

    fn wall_planes(&self) -> Vec<(Point3<f64>, Vector3<f64>)> {
        let sides = self.cell.sides();
        let mut planes = Vec::new();
        for i in 0..3 {
            if !self.walls[i] {
                continue;
            }
            let mut normal = sides[(i + 1) % 3].cross(&sides[(i + 2) % 3]).normalize();
            if normal.dot(&sides[i]) < 0.0 {
                normal = -normal;
            }
            planes.push((Point3::origin(), normal));
            planes.push((Point3::from(sides[i]), -normal));
        }
        planes
    }

    fn count_particle_wall_overlaps<I: Interaction + ?Sized>(
        &self,
        slot: usize,
        interaction: &I,
        early_exit: bool,
    ) -> usize {
        if !self.walls.iter().any(|&w| w) {
            return 0;
        }
        let mut count = 0;
        let shape = &self.shapes[slot];
        for (origin, normal) in self.wall_planes() {
            if interaction.overlap_with_wall_for_shape(shape, &origin, &normal) {
                count += 1;
                if early_exit {
                    return count;
                }
            }
        }
        count
    }

    fn wall_overlap_total<I: Interaction + ?Sized>(&self, interaction: &I) -> usize {
        if !self.walls.iter().any(|&w| w) {
            return 0;
        }
        self.count_wall_overlaps(interaction, false)
    }

    fn move_overlap_energy<I: Interaction + ?Sized>(
        &self,
        original: usize,
        slot: usize,
        interaction: &I,
    ) -> TrialResult {
        if interaction.has_hard_part() {
            let old_probe = self.count_particle_overlaps(original, original, interaction, true)
                + self.count_particle_wall_overlaps(original, interaction, true);
            if old_probe == 0 {
                let new_probe = self.count_particle_overlaps(original, slot, interaction, true)
                    + self.count_particle_wall_overlaps(slot, interaction, true);
                if new_probe > 0 {
                    return TrialResult::OverlapCreated;
                }
            } else {
                let old = self.count_particle_overlaps(original, original, interaction, false)
                    + self.count_particle_wall_overlaps(original, interaction, false);
                let new = self.count_particle_overlaps(original, slot, interaction, false)
                    + self.count_particle_wall_overlaps(slot, interaction, false);
                if new > old {
                    return TrialResult::OverlapCreated;
                }
                if new < old {
                    return TrialResult::OverlapResolved;
                }
            }
        }

        if interaction.has_soft_part() {
            let delta = self.particle_energy(original, slot, interaction)
                - self.particle_energy(original, original, interaction);
            TrialResult::EnergyDelta(delta)
        } else {
            TrialResult::EnergyDelta(0.0)
        }
    }
}

impl std::ops::Index<usize> for Packing {
    type Output = Shape;

    fn index(&self, index: usize) -> &Shape {
        assert!(index < self.len(), "shape index out of range");
        &self.shapes[index]
    }
}
