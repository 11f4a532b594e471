//! Pipeline assembly: declarative configuration and the builder that turns
//! it into a composed model.

mod builder;
pub mod config;

pub use builder::{Pipeline, PipelineBuilder};
pub use config::{PipelineConfig, RetryScope};
