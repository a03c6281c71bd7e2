//! Hyperparameter grids and configuration enumeration.
//!
//! A grid maps each parameter name to an ordered list of candidate values.
//! Parameter names are iterated in sorted order and the cartesian product is
//! taken with the last name varying fastest, so the ordinal of every
//! configuration is stable across runs.

pub mod generator;
pub mod params;

pub use generator::{Configuration, ConfigurationGenerator, ModelConfigurations};
pub use params::{HyperparameterGrid, ModelSpec, ParamSet, ParamValue};
