use nalgebra::Point3;

/// Half-open interval along one axis; `beg > end` denotes an interval that
/// crosses the periodic boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    pub beg: f64,
    pub end: f64,
}

/// An axis-aligned sub-volume restricting where a trial move may land.
///
/// Domain-decomposition drivers hand each worker such a region so that
/// concurrent moves in disjoint regions cannot interact; a trial that leaves
/// its region is reported as rejected by the packing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveDomain {
    bounds: [RegionBounds; 3],
}

impl ActiveDomain {
    pub fn new(bounds: [RegionBounds; 3]) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &[RegionBounds; 3] {
        &self.bounds
    }

    pub fn contains(&self, position: &Point3<f64>) -> bool {
        self.bounds.iter().enumerate().all(|(i, b)| {
            let x = position[i];
            if b.beg <= b.end {
                b.beg <= x && x < b.end
            } else {
                x >= b.beg || x < b.end
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(x: (f64, f64), y: (f64, f64), z: (f64, f64)) -> ActiveDomain {
        ActiveDomain::new([
            RegionBounds { beg: x.0, end: x.1 },
            RegionBounds { beg: y.0, end: y.1 },
            RegionBounds { beg: z.0, end: z.1 },
        ])
    }

    #[test]
    fn plain_region_contains_interior_points_only() {
        let d = domain((0.0, 5.0), (0.0, 5.0), (0.0, 5.0));
        assert!(d.contains(&Point3::new(2.0, 2.0, 2.0)));
        assert!(!d.contains(&Point3::new(5.5, 2.0, 2.0)));
        assert!(d.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(!d.contains(&Point3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn wrapped_region_crosses_the_boundary() {
        let d = domain((8.0, 2.0), (0.0, 10.0), (0.0, 10.0));
        assert!(d.contains(&Point3::new(9.0, 5.0, 5.0)));
        assert!(d.contains(&Point3::new(1.0, 5.0, 5.0)));
        assert!(!d.contains(&Point3::new(5.0, 5.0, 5.0)));
    }
}
