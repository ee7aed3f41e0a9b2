//! # packmc Core Library
//!
//! A Monte-Carlo particle-packing engine for hard and soft anisotropic shapes
//! under periodic or free boundary conditions.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers with a strict dependency direction,
//! keeping the physics model testable in isolation from the stateful machinery.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Shape`, `TriclinicBox`),
//!   the topology of space (`BoundaryConditions`) and the pairwise physics
//!   contract (`Interaction`) together with the concrete interaction models
//!   shipped with the crate.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer that drives a
//!   simulation: `Packing` with its two-phase (propose/commit) trial-move
//!   protocol, the `NeighbourGrid` spatial index that accelerates pair
//!   queries, snapshot persistence, and the bisection-based
//!   `distance_optimizer` used to build dense initial configurations.
//!
//! Monte-Carlo ensembles, move-selection policies and observable collectors
//! are callers of this crate, not part of it.

pub mod core;
pub mod engine;
