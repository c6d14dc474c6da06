use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drape_client::{GeminiGenerator, ReqwestTransport, gemini};
use drape_core::models::GenerationOutput;
use drape_core::normalize;
use drape_core::studio::StudioService;
use drape_core::{AppError, ImagePipeline, PipelineConfig, SystemClock};

#[derive(Parser)]
#[command(name = "drape", version, about = "Fetch garment photos from any link and restyle them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire an image from a URL, trying every strategy in order
    Fetch {
        /// Image or page URL
        #[arg(short, long)]
        url: String,

        /// Write the image bytes to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show how a URL is normalized and classified, without fetching it
    Inspect {
        /// Image or page URL
        #[arg(short, long)]
        url: String,
    },

    /// Acquire an image and send it with a prompt to the generation model
    Style {
        /// Image or page URL
        #[arg(short, long)]
        url: String,

        /// Styling instruction for the model
        #[arg(short, long)]
        prompt: String,

        /// Write a generated image to this file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Generation model
        #[arg(short, long, env = "DRAPE_MODEL", default_value = gemini::DEFAULT_MODEL)]
        model: String,

        /// Generation API base URL
        #[arg(short, long, env = "DRAPE_BASE_URL", default_value = gemini::DEFAULT_BASE_URL)]
        base_url: String,

        /// API key (reads from DRAPE_API_KEY env var if not provided)
        #[arg(short, long, env = "DRAPE_API_KEY")]
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("drape=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { url, out } => cmd_fetch(&url, out.as_deref()).await?,
        Commands::Inspect { url } => cmd_inspect(&url)?,
        Commands::Style {
            url,
            prompt,
            out,
            model,
            base_url,
            api_key,
        } => {
            let generator = GeminiGenerator::with_base_url(&api_key, &model, &base_url)
                .context("Failed to create generation client")?;
            cmd_style(&url, &prompt, out.as_deref(), generator).await?;
        }
    }

    Ok(())
}

fn build_pipeline() -> Result<ImagePipeline<ReqwestTransport>> {
    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    tracing::debug!(
        timeout_ms = millis(config.timeout),
        retry_mode = ?config.retry_mode,
        strategies = config.strategies.len(),
        "Pipeline configured"
    );
    Ok(ImagePipeline::new(transport, config))
}

async fn cmd_fetch(url: &str, out: Option<&Path>) -> Result<()> {
    let pipeline = build_pipeline()?;

    let result = match pipeline.extract(url).await {
        Ok(result) => result,
        Err(e) => return Err(report_failure(e)),
    };

    if let Some(path) = out {
        write_bytes(path, &result.image_bytes)?;
        tracing::info!(path = %path.display(), bytes = result.byte_length, "Image written");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_inspect(url: &str) -> Result<()> {
    let normalized = normalize::validate(url).map_err(|e| anyhow::anyhow!(e))?;
    let report = serde_json::json!({
        "raw_input": normalized.raw_input,
        "resolved_url": normalized.as_str(),
        "hostname": normalized.hostname,
        "hint": normalized.hint,
        "suggestions": normalized.hint.suggestions(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_style(
    url: &str,
    prompt: &str,
    out: Option<&Path>,
    generator: GeminiGenerator,
) -> Result<()> {
    let studio = build_studio(generator)?;

    tracing::info!("Styling {}", url);

    let outcome = match studio.style(url, prompt).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(report_failure(e)),
    };

    match (&outcome.output, out) {
        (GenerationOutput::Image { bytes, .. }, Some(path)) => {
            write_bytes(path, bytes)?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Generated image written");
        }
        (GenerationOutput::Image { .. }, None) => {
            tracing::warn!("Model returned an image; pass --out to save it");
        }
        (GenerationOutput::Text { .. }, Some(_)) => {
            tracing::warn!("Model returned text only; nothing written");
        }
        (GenerationOutput::Text { .. }, None) => {}
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// One-shot runs keep no portfolio; the process exits right after.
fn build_studio(
    generator: GeminiGenerator,
) -> Result<StudioService<ReqwestTransport, GeminiGenerator, SystemClock>> {
    Ok(StudioService::new(build_pipeline()?, generator))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Print the per-strategy breakdown of an exhausted extraction to stderr.
fn report_failure(error: AppError) -> anyhow::Error {
    if let AppError::AllStrategiesExhausted(failure) = &error {
        eprintln!("Could not fetch an image from {}\n", failure.source_url);
        for attempt in &failure.attempts {
            eprintln!(
                "  [{}] {} ({} ms, {} tries)",
                attempt.error_kind.map(|k| k.as_str()).unwrap_or("ok"),
                attempt.strategy,
                attempt.duration_ms,
                attempt.tries,
            );
            if let Some(message) = &attempt.error_message {
                eprintln!("      {message}");
            }
        }
        if !failure.suggestions.is_empty() {
            eprintln!("\nSuggestions:");
            for suggestion in &failure.suggestions {
                eprintln!("  - {suggestion}");
            }
        }
        eprintln!();
    }
    anyhow::anyhow!(error)
}

/// Write `bytes` to `path`, creating missing parent directories.
fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}
