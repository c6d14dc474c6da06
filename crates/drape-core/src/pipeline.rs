use std::time::Instant;

use crate::config::{PipelineConfig, RetryMode};
use crate::content::{self, ImageFormat};
use crate::error::AppError;
use crate::events::{PipelineEvent, PipelineReporter, TracingReporter};
use crate::models::{
    ExtractionAttempt, ExtractionFailure, ExtractionResult, FetchedImage, compute_hash,
};
use crate::normalize::{self, NormalizedUrl};
use crate::state::{ExtractionState, StateEvent};
use crate::strategy::{FetchContext, Strategy};
use crate::traits::{Clock, HttpTransport, SystemClock};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Right-click the image and choose \"Copy image address\", then paste that link instead.",
    "Try a direct link to the image file on its CDN (ending in .jpg, .png or .webp).",
    "Download the image and upload the file directly; this always works.",
];

/// Bytes that survived a strategy run and content validation.
struct Accepted {
    image: FetchedImage,
    format: Option<ImageFormat>,
}

/// Acquires a validated image from a URL by trying strategies in order.
///
/// Generic over the HTTP transport and the clock so tests can script both.
/// Strategies never run concurrently; the first validated result wins.
pub struct ImagePipeline<T, C = SystemClock>
where
    T: HttpTransport,
    C: Clock,
{
    transport: T,
    clock: C,
    config: PipelineConfig,
}

impl<T: HttpTransport> ImagePipeline<T, SystemClock> {
    pub fn new(transport: T, config: PipelineConfig) -> Self {
        Self {
            transport,
            clock: SystemClock,
            config,
        }
    }
}

impl<T, C> ImagePipeline<T, C>
where
    T: HttpTransport,
    C: Clock,
{
    /// Replace the clock used for attempt and result timestamps.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ImagePipeline<T, C2> {
        ImagePipeline {
            transport: self.transport,
            clock,
            config: self.config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for `input`, logging through `tracing`.
    pub async fn extract(&self, input: &str) -> Result<ExtractionResult, AppError> {
        self.extract_reported(input, &TracingReporter).await
    }

    /// Run the pipeline for `input`, sending progress to `reporter`.
    ///
    /// Input rejections (`InvalidInput`, `MalformedUrl`, `BlockedHost`) return
    /// before any network call. Otherwise the outcome is either a result or
    /// [`AppError::AllStrategiesExhausted`].
    pub async fn extract_reported<R: PipelineReporter>(
        &self,
        input: &str,
        reporter: &R,
    ) -> Result<ExtractionResult, AppError> {
        let target = normalize::validate(input)?;
        reporter.report(PipelineEvent::Started {
            url: target.as_str(),
            hint: target.hint,
        });

        let strategies = &self.config.strategies;
        let count = strategies.len();
        let mut attempts = Vec::with_capacity(count);
        let mut accepted = None;
        let mut state = ExtractionState::NotStarted.next(StateEvent::Start, count);

        while let ExtractionState::TryingStrategy(index) = state {
            let strategy = strategies[index];
            reporter.report(PipelineEvent::StrategyStarted { strategy, index });

            let (attempt, outcome) = self.attempt(strategy, &target, reporter).await;
            attempts.push(attempt);

            let event = match outcome {
                Ok(hit) => {
                    reporter.report(PipelineEvent::StrategySucceeded {
                        strategy,
                        bytes: hit.image.byte_length(),
                        format: hit.format,
                    });
                    accepted = Some((strategy, hit));
                    StateEvent::AttemptSucceeded
                }
                Err(_) => StateEvent::AttemptFailed,
            };

            state = state.next(event, count);

            if let ExtractionState::TryingStrategy(_) = state {
                let delay = self.config.backoff.delay(index);
                if !delay.is_zero() {
                    reporter.report(PipelineEvent::BackingOff { delay });
                    tokio::time::sleep(delay).await;
                }
            }
        }

        match (state, accepted) {
            (ExtractionState::Succeeded(_), Some((strategy, hit))) => {
                Ok(self.build_result(&target, strategy, hit, attempts))
            }
            _ => {
                reporter.report(PipelineEvent::Exhausted {
                    url: target.as_str(),
                    attempts: attempts.len(),
                });
                Err(AppError::AllStrategiesExhausted(Box::new(build_failure(
                    &target, attempts,
                ))))
            }
        }
    }

    /// Run one strategy, retrying per [`RetryMode`], and record the attempt.
    async fn attempt<R: PipelineReporter>(
        &self,
        strategy: Strategy,
        target: &NormalizedUrl,
        reporter: &R,
    ) -> (ExtractionAttempt, Result<Accepted, AppError>) {
        let started_at = self.clock.now();
        let timer = Instant::now();
        let max_tries = match self.config.retry_mode {
            RetryMode::SinglePass => 1,
            RetryMode::PerStrategy => self.config.max_retries.saturating_add(1),
        };

        let mut tries = 0;
        let outcome = loop {
            tries += 1;
            match self.run_once(strategy, target).await {
                Ok(hit) => break Ok(hit),
                Err(e) => {
                    let will_retry = tries < max_tries && e.is_retryable();
                    reporter.report(PipelineEvent::StrategyFailed {
                        strategy,
                        error: &e,
                        will_retry,
                    });
                    if !will_retry {
                        break Err(e);
                    }
                    let delay = self.config.backoff.delay(tries as usize - 1);
                    if !delay.is_zero() {
                        reporter.report(PipelineEvent::BackingOff { delay });
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        };

        let attempt = ExtractionAttempt {
            strategy,
            started_at,
            duration_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
            tries,
            succeeded: outcome.is_ok(),
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
            error_kind: outcome.as_ref().err().map(|e| e.kind()),
        };
        (attempt, outcome)
    }

    /// One try under the shared deadline, followed by content validation.
    async fn run_once(
        &self,
        strategy: Strategy,
        target: &NormalizedUrl,
    ) -> Result<Accepted, AppError> {
        let ctx = FetchContext {
            transport: &self.transport,
            relays: &self.config.relays,
            user_agent: &self.config.user_agent,
            timeout: self.config.timeout,
        };

        // Dropping the future on deadline cancels any in-flight request.
        let image = match tokio::time::timeout(self.config.timeout, strategy.fetch(&ctx, target))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::Timeout(
                    u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
                ));
            }
        };

        let format = if self.config.validate_content {
            Some(content::validate_content(
                &image.bytes,
                image.mime_type.as_deref(),
            )?)
        } else {
            None
        };

        Ok(Accepted { image, format })
    }

    fn build_result(
        &self,
        target: &NormalizedUrl,
        strategy: Strategy,
        hit: Accepted,
        attempts: Vec<ExtractionAttempt>,
    ) -> ExtractionResult {
        let Accepted { image, format } = hit;
        let mime_type = match format {
            Some(format) => format.mime_type().to_string(),
            None => image
                .mime_type
                .as_deref()
                .and_then(content::essence)
                .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
        };

        ExtractionResult {
            byte_length: image.bytes.len(),
            content_hash: compute_hash(&image.bytes),
            image_bytes: image.bytes,
            mime_type,
            detected_format: format,
            source_url: target.as_str().to_string(),
            strategy_used: strategy,
            extracted_at: self.clock.now(),
            attempts,
        }
    }
}

fn build_failure(target: &NormalizedUrl, attempts: Vec<ExtractionAttempt>) -> ExtractionFailure {
    let details = attempts
        .iter()
        .map(|a| match a.error_kind {
            Some(kind) => format!("{}: {}", a.strategy, kind),
            None => a.strategy.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    let aggregate_message = if attempts.is_empty() {
        format!(
            "Could not fetch an image from {}: no strategies are configured",
            target.as_str()
        )
    } else {
        format!(
            "Could not fetch an image from {}: all {} strategies failed ({details})",
            target.as_str(),
            attempts.len()
        )
    };

    let mut suggestions = target.hint.suggestions();
    suggestions.extend(GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()));

    ExtractionFailure {
        source_url: target.as_str().to_string(),
        hint: target.hint,
        attempts,
        aggregate_message,
        suggestions,
    }
}
