use serde::Serialize;

use crate::error::AppError;
use crate::models::{ExtractionResult, GenerationOutput, GenerationRequest};
use crate::pipeline::ImagePipeline;
use crate::portfolio::{NewPortfolioEntry, PortfolioEntry, PortfolioStore};
use crate::traits::{Clock, HttpTransport, ImageGenerator};

/// Outcome of one studio run.
#[derive(Debug, Clone, Serialize)]
pub struct StudioOutcome {
    pub source: ExtractionResult,
    pub output: GenerationOutput,
    /// Present when a portfolio is attached.
    pub entry: Option<PortfolioEntry>,
}

/// Orchestrates the studio flow: acquire image → generate → record.
///
/// Generic over the transport, generator and clock, so tests run without
/// real HTTP or model calls.
pub struct StudioService<T, G, C>
where
    T: HttpTransport,
    G: ImageGenerator,
    C: Clock,
{
    pipeline: ImagePipeline<T, C>,
    generator: G,
    portfolio: Option<PortfolioStore<C>>,
}

impl<T, G, C> StudioService<T, G, C>
where
    T: HttpTransport,
    G: ImageGenerator,
    C: Clock,
{
    /// Create a studio that does not keep a portfolio.
    pub fn new(pipeline: ImagePipeline<T, C>, generator: G) -> Self {
        Self {
            pipeline,
            generator,
            portfolio: None,
        }
    }

    /// Create a studio that records every result in `portfolio`.
    pub fn with_portfolio(
        pipeline: ImagePipeline<T, C>,
        generator: G,
        portfolio: PortfolioStore<C>,
    ) -> Self {
        Self {
            pipeline,
            generator,
            portfolio: Some(portfolio),
        }
    }

    pub fn portfolio(&self) -> Option<&PortfolioStore<C>> {
        self.portfolio.as_ref()
    }

    /// Run the studio flow for an image URL and a styling prompt.
    ///
    /// 1. Acquire and validate the source image
    /// 2. Send it with the prompt to the generator
    /// 3. Record the result (if a portfolio is attached)
    pub async fn style(&self, url: &str, prompt: &str) -> Result<StudioOutcome, AppError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::InvalidInput("prompt is empty".into()));
        }

        // 1. Acquire
        let source = self.pipeline.extract(url).await?;
        tracing::info!(
            strategy = %source.strategy_used,
            bytes = source.byte_length,
            hash = %&source.content_hash[..8],
            "Source image acquired"
        );

        // 2. Generate
        let request = GenerationRequest {
            image_bytes: source.image_bytes.clone(),
            mime_type: source.mime_type.clone(),
            prompt: prompt.to_string(),
        };
        let output = self.generator.generate(&request).await?;
        tracing::info!(bytes = output.byte_length(), "Generation complete");

        // 3. Record
        let entry = self.portfolio.as_ref().map(|portfolio| {
            let entry = portfolio.add(NewPortfolioEntry {
                source_url: source.source_url.clone(),
                prompt: prompt.to_string(),
                source_hash: source.content_hash.clone(),
                output: output.clone(),
            });
            tracing::info!(id = %entry.id, "Saved to portfolio");
            entry
        });

        Ok(StudioOutcome {
            source,
            output,
            entry,
        })
    }
}
