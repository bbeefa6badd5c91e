//! Synthetic data for tests and demos.

pub mod synthetic;
