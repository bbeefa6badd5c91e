//! Transmission models for polarizing elements.
//!
//! Models are small immutable value types. They are built once per reduction
//! run and then shared (read-only) between all spin channels.

pub mod he3;
pub mod opacity;
pub mod polarization;
pub mod supermirror;
pub mod transmission;

pub use he3::*;
pub use opacity::*;
pub use polarization::*;
pub use supermirror::*;
pub use transmission::*;
