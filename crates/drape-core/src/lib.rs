pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod portfolio;
pub mod relay;
pub mod state;
pub mod strategy;
pub mod studio;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{BackoffConfig, PipelineConfig, RetryMode};
pub use error::{AppError, ErrorKind};
pub use models::{ExtractionAttempt, ExtractionFailure, ExtractionResult, compute_hash};
pub use pipeline::ImagePipeline;
pub use strategy::Strategy;
pub use traits::{Clock, HttpTransport, ImageGenerator, SystemClock};
