use crate::api::{Backends, GeminiClient};
use crate::config::Config;
use crate::generator::StoryPipeline;
use crate::layout::OutputLayout;
use crate::{logi, logw};
use anyhow::{Context, Result};
use tokio::fs;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; plain `info` otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub async fn ensure_directories(layout: &OutputLayout) -> Result<()> {
    for dir in std::iter::once(layout.root().to_path_buf()).chain(layout.dirs()) {
        if fs::metadata(&dir).await.is_err() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg(ffmpeg_bin: &str) -> bool {
    match tokio::process::Command::new(ffmpeg_bin)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Creates the output tree and wires a Gemini-backed pipeline into it.
pub async fn build_pipeline(cfg: &Config, layout: OutputLayout) -> Result<StoryPipeline> {
    ensure_directories(&layout).await?;
    if !check_ffmpeg(&cfg.ffmpeg_bin).await {
        logw(format!(
            "{} not found; merge commands will be saved for manual runs",
            cfg.ffmpeg_bin
        ));
    }
    let client = GeminiClient::new(cfg)?;
    Ok(StoryPipeline::new(Backends::gemini(client), layout, cfg))
}
