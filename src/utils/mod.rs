pub mod configuration;
pub mod format_writers;

pub use configuration::{BuildConfig, FeaturesConfig};
