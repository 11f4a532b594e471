//! Built-in [`LanguageModel`](crate::LanguageModel) implementations.
//!
//! Real provider clients live outside this crate and implement the trait
//! themselves. What ships here is for demos and tests.

pub mod recorded;

pub use recorded::RecordedModel;
