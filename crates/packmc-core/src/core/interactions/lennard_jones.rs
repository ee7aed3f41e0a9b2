use crate::core::boundary::BoundaryConditions;
use crate::core::interaction::{Interaction, InteractionSite};
use crate::core::shape::ShapeData;

// Beyond this multiple of sigma the potential is below 1e-3 * epsilon and is
// truncated to keep the neighbour-grid range finite.
const CUTOFF_SIGMAS: f64 = 3.0;

/// The 12-6 Lennard-Jones potential, truncated at 3 sigma; purely soft.
#[derive(Debug, Clone, Copy)]
pub struct LennardJones {
    epsilon: f64,
    sigma: f64,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64) -> Self {
        assert!(epsilon > 0.0, "LJ well depth must be positive");
        assert!(sigma > 0.0, "LJ diameter must be positive");
        Self { epsilon, sigma }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Interaction for LennardJones {
    fn has_hard_part(&self) -> bool {
        false
    }

    fn has_soft_part(&self) -> bool {
        true
    }

    fn range_radius(&self, _data: &ShapeData) -> f64 {
        CUTOFF_SIGMAS * self.sigma
    }

    fn energy_between(
        &self,
        site1: InteractionSite,
        site2: InteractionSite,
        bc: &dyn BoundaryConditions,
    ) -> f64 {
        let dist2 = bc.distance2(&site1.position, &site2.position);
        let cutoff = CUTOFF_SIGMAS * self.sigma;
        if dist2 >= cutoff * cutoff {
            return 0.0;
        }
        if dist2 < 1e-12 {
            return 1e10;
        }
        let s2 = self.sigma * self.sigma / dist2;
        let s6 = s2 * s2 * s2;
        4.0 * self.epsilon * (s6 * s6 - s6)
    }
}
