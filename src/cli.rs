use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use story_reel::generator::{RunMode, StoryRequest};
use story_reel::init;
use story_reel::interactive::Prompter;
use story_reel::layout::OutputLayout;
use story_reel::scene::CLIP_SECONDS;
use story_reel::Config;

/// Interactive story video generator.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Args {
    #[clap(long, default_value = "story_output")]
    output: PathBuf,

    #[clap(long, default_value = "config.json")]
    config: PathBuf,

    #[clap(long)]
    prompts_only: bool,
}

fn banner<R: BufRead, W: Write>(p: &mut Prompter<R, W>, title: &str) -> io::Result<()> {
    p.say(&"=".repeat(60))?;
    p.say(title)?;
    p.say(&"=".repeat(60))
}

#[tokio::main]
async fn main() -> Result<()> {
    init::init_tracing();
    let args = Args::parse();
    let cfg = Config::load(&args.config).await?;

    let stdin = io::stdin();
    let mut p = Prompter::new(stdin.lock(), io::stdout());

    banner(&mut p, "STORY VIDEO GENERATOR")?;
    let story = p.story()?;
    let (minutes, clips) = p.duration()?;

    p.say("")?;
    p.say(&format!("Story: {}", story))?;
    p.say(&format!("Duration: {} minutes", minutes))?;
    p.say(&format!(
        "Clips: {} x {} seconds = {} seconds",
        clips,
        CLIP_SECONDS,
        clips.saturating_mul(CLIP_SECONDS as usize)
    ))?;
    if !p.confirm("Proceed? (yes/no): ")? {
        p.say("Cancelled.")?;
        return Ok(());
    }

    let mode = if args.prompts_only { RunMode::PromptsOnly } else { RunMode::Full };
    let request = StoryRequest::premise(story, clips).with_mode(mode);
    let pipeline = init::build_pipeline(&cfg, OutputLayout::new(&args.output)).await?;

    let plan = pipeline.plan(&request).await?;
    banner(&mut p, "EXPANDED STORY")?;
    for scene in &plan.scenes {
        p.say(&format!("{:>3}. {}", scene.index, scene.title))?;
    }
    if !p.confirm(&format!(
        "Continue with prompt generation for {} scenes? (yes/no): ",
        plan.scenes.len()
    ))? {
        p.say(&format!("Story saved in {}", args.output.display()))?;
        return Ok(());
    }

    let report = pipeline.produce(&plan).await?;
    banner(&mut p, "ALL DONE")?;
    p.say(&format!("Scenes detailed: {}/{}", report.packages.len(), report.requested))?;
    match &report.final_video {
        Some(path) => p.say(&format!("Final video: {}", path.display()))?,
        None => p.say(&format!("Outputs and pending prompts: {}", args.output.display()))?,
    }
    Ok(())
}
