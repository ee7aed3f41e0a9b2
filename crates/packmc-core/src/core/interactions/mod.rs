mod hard_sphere;
mod lennard_jones;

pub use hard_sphere::HardSphere;
pub use lennard_jones::LennardJones;
