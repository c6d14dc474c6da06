use std::time::Duration;

use crate::content::ImageFormat;
use crate::error::AppError;
use crate::normalize::UrlHint;
use crate::strategy::Strategy;

/// Events emitted by the pipeline while an extraction runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Started {
        url: &'a str,
        hint: UrlHint,
    },
    StrategyStarted {
        strategy: Strategy,
        index: usize,
    },
    StrategySucceeded {
        strategy: Strategy,
        bytes: usize,
        format: Option<ImageFormat>,
    },
    StrategyFailed {
        strategy: Strategy,
        error: &'a AppError,
        will_retry: bool,
    },
    BackingOff {
        delay: Duration,
    },
    Exhausted {
        url: &'a str,
        attempts: usize,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Started { url, hint } => {
                tracing::info!(%url, %hint, "Extracting image");
            }
            PipelineEvent::StrategyStarted { strategy, index } => {
                tracing::debug!(%strategy, %index, "Trying strategy");
            }
            PipelineEvent::StrategySucceeded {
                strategy,
                bytes,
                format,
            } => {
                tracing::info!(%strategy, %bytes, ?format, "Strategy succeeded");
            }
            PipelineEvent::StrategyFailed {
                strategy,
                error,
                will_retry,
            } => {
                tracing::warn!(%strategy, kind = %error.kind(), %error, %will_retry, "Strategy failed");
            }
            PipelineEvent::BackingOff { delay } => {
                tracing::debug!(delay_ms = %delay.as_millis(), "Backing off");
            }
            PipelineEvent::Exhausted { url, attempts } => {
                tracing::warn!(%url, %attempts, "All strategies exhausted");
            }
        }
    }
}
