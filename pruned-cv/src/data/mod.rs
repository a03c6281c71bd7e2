//! Dataset types and loading.

pub mod loader;
pub mod types;

pub use loader::{DatasetLoader, FileFormat, LoaderError};
pub use types::{Dataset, DatasetError};
