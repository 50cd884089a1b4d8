//! Configuration types and loading for silt services.
//!
//! The shapes in [`shared`] are deserialized from a YAML or JSON file and can
//! be overridden through `SILT_`-prefixed environment variables. Everything is
//! validated before the service starts; an invalid configuration is fatal.

mod load;
pub mod shared;

pub use load::{load_config, LoadConfigError};
