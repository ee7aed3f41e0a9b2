pub mod distance_optimizer;
pub mod domain;
pub mod neighbour_grid;
pub mod packing;
pub mod snapshot;
