use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use story_reel::generator::{RunMode, StoryRequest};
use story_reel::init;
use story_reel::interactive::{MAX_CLIPS, clips_for_minutes};
use story_reel::layout::OutputLayout;
use story_reel::scene::SceneStub;
use story_reel::Config;
use tracing::{info, warn};

const EXAMPLE_PREMISE: &str = "A brave child discovers a magical forest and makes friends with talking animals who teach them about kindness.";
const DEFAULT_CLIPS: usize = 8;

/// Generates a narrated story video from a premise or a prepared scene list.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Args {
    /// Story idea to expand; the built-in example is used when neither this
    /// nor --scenes is given.
    #[clap(long)]
    premise: Option<String>,

    #[clap(long, conflicts_with = "minutes")]
    clips: Option<usize>,

    /// Target length; converted to whole 8-second clips.
    #[clap(long)]
    minutes: Option<f64>,

    /// Photo of the main subject, used for image generation and consistency.
    #[clap(long)]
    reference: Option<PathBuf>,

    /// JSON array of {"title", "description"} objects to use as-is.
    #[clap(long, conflicts_with_all = ["premise", "clips", "minutes"])]
    scenes: Option<PathBuf>,

    /// Write prompts, narration and sound briefs without images or video.
    #[clap(long)]
    prompts_only: bool,

    #[clap(long, default_value = "story_output")]
    output: PathBuf,

    #[clap(long, default_value = "config.json")]
    config: PathBuf,
}

async fn read_scenes(path: &Path) -> Result<Vec<SceneStub>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read scenes: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse scenes: {}", path.display()))
}

fn clip_count(args: &Args) -> Result<usize> {
    match (args.clips, args.minutes) {
        (Some(clips), _) => Ok(clips),
        (None, Some(minutes)) => clips_for_minutes(minutes)
            .with_context(|| {
                format!("{} minutes does not fit between 1 and {} clips", minutes, MAX_CLIPS)
            }),
        (None, None) => Ok(DEFAULT_CLIPS),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init::init_tracing();
    let args = Args::parse();

    let mut request = match &args.scenes {
        Some(path) => StoryRequest::scenes(read_scenes(path).await?),
        None => {
            let premise = args.premise.clone().unwrap_or_else(|| {
                info!("No premise given; using the example story");
                EXAMPLE_PREMISE.to_string()
            });
            StoryRequest::premise(premise, clip_count(&args)?)
        }
    };
    if let Some(reference) = &args.reference {
        request = request.with_reference(reference);
    }
    if args.prompts_only {
        request = request.with_mode(RunMode::PromptsOnly);
    }

    let cfg = Config::load(&args.config).await?;
    let pipeline = init::build_pipeline(&cfg, OutputLayout::new(&args.output)).await?;
    let report = pipeline.run(request).await?;

    match &report.final_video {
        Some(path) => info!("Your story video is ready: {}", path.display()),
        None if args.prompts_only => info!("Prompts saved in {}", args.output.display()),
        None => warn!(
            "Pipeline completed with {} pending items; see {}",
            report.recovery_artifacts.len(),
            args.output.display()
        ),
    }
    Ok(())
}
