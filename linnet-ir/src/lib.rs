//! Symbolic modified-nodal-analysis engine: turns a checked [`model::Circuit`] into
//! closed-form s-domain transfer functions.
//!
//! The pipeline (§4 of the design notes) runs `topology` -> `symtab` -> `les` ->
//! `solver` -> `freq` -> `exprmap`, wired together as [`linnet_pass::Pass`]
//! implementations in [`passes`] and driven end to end by [`engine`].

pub mod errors;
pub mod exprmap;
pub mod freq;
pub mod les;
pub mod model;
pub mod passes;
pub mod rational;
pub mod ring;
pub mod solver;
pub mod symtab;
pub mod topology;

pub mod engine;

pub use errors::CoreError;
pub use model::{Circuit, CircuitBuilder, Device, DeviceId, DeviceKind, Node, NodeId};
pub use rational::Rational;
