pub mod boundary;
pub mod interaction;
pub mod interactions;
pub mod shape;
pub mod triclinic;
