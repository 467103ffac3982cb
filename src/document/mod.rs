//! Declarative document loading: `extends` inheritance, `merge` namespaces
//! and `${...}` interpolation over `serde_yaml` value trees.

mod error;
mod interpolate;
mod loader;
mod merge;

pub use error::{ConfigError, ConfigResult};
pub use interpolate::stringify;
pub use loader::ConfigLoader;
