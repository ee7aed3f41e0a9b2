use crate::core::triclinic::TriclinicBox;
use itertools::iproduct;
use nalgebra::Point3;

/// Uniform spatial hash over a triclinic cell.
///
/// Cells are regular in *relative* coordinates, with per-axis divisions chosen
/// so that every cell's face-to-face thickness is at least `cell_bound` (the
/// interaction range). A query for a position then only has to enumerate the
/// 3x3x3 block of cells around it, wrapped periodically, to see every tracked
/// index within `cell_bound`; extra candidates are possible and are
/// re-checked by the caller against the true range, missed ones are not.
///
/// Positions are folded into the cell with `rem_euclid`, so out-of-box
/// positions (free boundary conditions) still map consistently: Euclidean
/// closeness implies modular cell adjacency, which the wrapped neighbourhood
/// covers.
#[derive(Debug, Clone)]
pub struct NeighbourGrid {
    cell: TriclinicBox,
    divisions: [usize; 3],
    cells: Vec<Vec<usize>>,
    tracked: usize,
}

impl NeighbourGrid {
    /// Builds an empty grid, or returns `None` when the box is too small to
    /// host at least 3 cells per axis; callers then fall back to exhaustive
    /// all-pairs queries.
    pub fn build(cell: &TriclinicBox, cell_bound: f64) -> Option<Self> {
        assert!(cell_bound > 0.0, "neighbour grid cell bound must be positive");

        let heights = cell.heights();
        let mut divisions = [0usize; 3];
        for i in 0..3 {
            divisions[i] = (heights[i] / cell_bound).floor() as usize;
            if divisions[i] < 3 {
                return None;
            }
        }

        let num_cells = divisions[0] * divisions[1] * divisions[2];
        Some(Self {
            cell: cell.clone(),
            divisions,
            cells: vec![Vec::new(); num_cells],
            tracked: 0,
        })
    }

    pub fn divisions(&self) -> [usize; 3] {
        self.divisions
    }

    /// Number of indices currently tracked.
    pub fn len(&self) -> usize {
        self.tracked
    }

    pub fn is_empty(&self) -> bool {
        self.tracked == 0
    }

    fn cell_coords(&self, position: &Point3<f64>) -> [usize; 3] {
        let rel = self.cell.absolute_to_relative(position);
        let mut coords = [0usize; 3];
        for i in 0..3 {
            let n = self.divisions[i] as isize;
            let c = (rel[i] * self.divisions[i] as f64).floor() as isize;
            coords[i] = c.rem_euclid(n) as usize;
        }
        coords
    }

    fn cell_index(&self, coords: [usize; 3]) -> usize {
        (coords[2] * self.divisions[1] + coords[1]) * self.divisions[0] + coords[0]
    }

    pub fn insert(&mut self, idx: usize, position: &Point3<f64>) {
        let cell = self.cell_index(self.cell_coords(position));
        self.cells[cell].push(idx);
        self.tracked += 1;
    }

    /// Removes `idx` tracked at `position`. The position must be the one it
    /// was inserted with (it selects the membership list to search).
    pub fn remove(&mut self, idx: usize, position: &Point3<f64>) {
        let cell = self.cell_index(self.cell_coords(position));
        let members = &mut self.cells[cell];
        let at = members
            .iter()
            .position(|&i| i == idx)
            .unwrap_or_else(|| panic!("index {idx} is not tracked in its cell"));
        members.swap_remove(at);
        self.tracked -= 1;
    }

    pub fn clear(&mut self) {
        for members in &mut self.cells {
            members.clear();
        }
        self.tracked = 0;
    }

    /// Enumerates all candidate indices in the 27 wrapped cells around
    /// `position`. Never misses a tracked index within the cell bound.
    pub fn neighbours_of(&self, position: &Point3<f64>) -> impl Iterator<Item = usize> + '_ {
        let centre = self.cell_coords(position);
        let mut block = [0usize; 27];
        for (k, (dz, dy, dx)) in iproduct!(-1isize..=1, -1isize..=1, -1isize..=1).enumerate() {
            block[k] = self.cell_index([
                wrap(centre[0], dx, self.divisions[0]),
                wrap(centre[1], dy, self.divisions[1]),
                wrap(centre[2], dz, self.divisions[2]),
            ]);
        }
        block
            .into_iter()
            .flat_map(move |cell| self.cells[cell].iter().copied())
    }
}

fn wrap(coord: usize, delta: isize, n: usize) -> usize {
    (coord as isize + delta).rem_euclid(n as isize) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::boundary::{BoundaryConditions, PeriodicBoundaryConditions};
    use nalgebra::Vector3;
    use std::collections::HashSet;

    // Deterministic xorshift so the completeness check is reproducible.
    struct SplitMix(u64);

    impl SplitMix {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_add(0x9e3779b97f4a7c15);
            let mut z = self.0;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
            (z ^ (z >> 31)) as f64 / u64::MAX as f64
        }

        fn point_in(&mut self, side: f64) -> Point3<f64> {
            Point3::new(
                self.next_f64() * side,
                self.next_f64() * side,
                self.next_f64() * side,
            )
        }
    }

    #[test]
    fn build_refuses_boxes_with_fewer_than_three_cells_per_axis() {
        let cell = TriclinicBox::cubic(2.5);
        assert!(NeighbourGrid::build(&cell, 1.0).is_none());
        assert!(NeighbourGrid::build(&cell, 0.8).is_some());
    }

    #[test]
    fn divisions_follow_box_heights() {
        let cell = TriclinicBox::from_dimensions([10.0, 5.0, 7.5]);
        let grid = NeighbourGrid::build(&cell, 1.0).unwrap();
        assert_eq!(grid.divisions(), [10, 5, 7]);
    }

    #[test]
    fn insert_remove_updates_membership() {
        let cell = TriclinicBox::cubic(10.0);
        let mut grid = NeighbourGrid::build(&cell, 1.0).unwrap();
        let pos = Point3::new(4.5, 4.5, 4.5);
        grid.insert(7, &pos);
        assert_eq!(grid.len(), 1);
        assert!(grid.neighbours_of(&pos).any(|i| i == 7));
        grid.remove(7, &pos);
        assert!(grid.is_empty());
        assert!(!grid.neighbours_of(&pos).any(|i| i == 7));
    }

    #[test]
    #[should_panic(expected = "is not tracked")]
    fn removing_untracked_index_panics() {
        let cell = TriclinicBox::cubic(10.0);
        let mut grid = NeighbourGrid::build(&cell, 1.0).unwrap();
        grid.remove(3, &Point3::origin());
    }

    #[test]
    fn query_never_misses_a_point_within_the_cell_bound() {
        let side = 10.0;
        let range = 1.3;
        let cell = TriclinicBox::cubic(side);
        let bc = PeriodicBoundaryConditions::cubic(side);
        let mut grid = NeighbourGrid::build(&cell, range).unwrap();

        let mut rng = SplitMix(42);
        let points: Vec<_> = (0..250).map(|_| rng.point_in(side)).collect();
        for (i, p) in points.iter().enumerate() {
            grid.insert(i, p);
        }

        for (i, p) in points.iter().enumerate() {
            let candidates: HashSet<_> = grid.neighbours_of(p).collect();
            for (j, q) in points.iter().enumerate() {
                if i != j && bc.distance2(p, q) < range * range {
                    assert!(
                        candidates.contains(&j),
                        "pair ({i}, {j}) missed by the grid"
                    );
                }
            }
        }
    }

    #[test]
    fn out_of_box_positions_fold_consistently() {
        let cell = TriclinicBox::cubic(9.0);
        let mut grid = NeighbourGrid::build(&cell, 1.0).unwrap();
        // A point just outside the box and one just inside, 0.2 apart.
        let outside = Point3::new(9.1, 4.0, 4.0);
        let inside = Point3::new(8.9, 4.0, 4.0);
        grid.insert(0, &outside);
        assert!(grid.neighbours_of(&inside).any(|i| i == 0));
        grid.remove(0, &outside);
        assert!(grid.is_empty());
    }

    #[test]
    fn works_in_sheared_cells() {
        let cell = TriclinicBox::from_sides([
            Vector3::new(8.0, 0.0, 0.0),
            Vector3::new(2.0, 8.0, 0.0),
            Vector3::new(0.0, 0.0, 8.0),
        ]);
        let mut grid = NeighbourGrid::build(&cell, 1.5).unwrap();
        let p = Point3::new(3.0, 3.0, 3.0);
        let q = Point3::new(3.5, 3.5, 3.5);
        grid.insert(0, &p);
        assert!(grid.neighbours_of(&q).any(|i| i == 0));
    }
}
