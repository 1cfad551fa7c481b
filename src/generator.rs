use crate::api::{Backends, ImageInput};
use crate::assets::AssetGenerator;
use crate::config::Config;
use crate::detailer::PromptDetailer;
use crate::error::{PipelineError, Result};
use crate::expander::SceneExpander;
use crate::ffmpeg::{ClipAssembler, MergeOutcome};
use crate::layout::{OutputLayout, write_json};
use crate::scene::{CLIP_SECONDS, ClipBundle, GenerationResult, ScenePackage, SceneStub, reindex};
use crate::{loge, logi, logok, logw};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Where the scene list comes from.
#[derive(Debug, Clone)]
pub enum SceneSource {
    /// Expanded by the text backend into `clips` scenes.
    Premise { premise: String, clips: usize },
    /// Supplied by the caller; renumbered 1..N in the given order.
    Scenes(Vec<SceneStub>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Full,
    /// Prompts, narration and sound briefs only. No image, video or merge.
    PromptsOnly,
}

#[derive(Debug, Clone)]
pub struct StoryRequest {
    pub source: SceneSource,
    pub reference_image: Option<PathBuf>,
    pub mode: RunMode,
}

impl StoryRequest {
    pub fn premise(premise: impl Into<String>, clips: usize) -> Self {
        Self {
            source: SceneSource::Premise {
                premise: premise.into(),
                clips,
            },
            reference_image: None,
            mode: RunMode::Full,
        }
    }

    pub fn scenes(scenes: Vec<SceneStub>) -> Self {
        Self {
            source: SceneSource::Scenes(scenes),
            reference_image: None,
            mode: RunMode::Full,
        }
    }

    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_image = Some(path.into());
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// The scenes a run will produce, settled before any media is generated.
#[derive(Debug, Clone)]
pub struct StoryPlan {
    pub scenes: Vec<SceneStub>,
    pub reference: Option<ImageInput>,
    pub mode: RunMode,
}

impl StoryPlan {
    pub fn total_seconds(&self) -> u64 {
        self.scenes.len() as u64 * u64::from(CLIP_SECONDS)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub requested: usize,
    pub packages: Vec<ScenePackage>,
    pub results: Vec<GenerationResult>,
    pub merged_clips: Vec<PathBuf>,
    pub final_video: Option<PathBuf>,
    pub recovery_artifacts: Vec<PathBuf>,
}

impl RunReport {
    pub fn failed_results(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }
}

pub struct StoryPipeline {
    layout: OutputLayout,
    expander: SceneExpander,
    detailer: PromptDetailer,
    assets: AssetGenerator,
    assembler: ClipAssembler,
    delay: Duration,
}

impl StoryPipeline {
    pub fn new(backends: Backends, layout: OutputLayout, cfg: &Config) -> Self {
        Self {
            expander: SceneExpander::new(backends.text.clone(), layout.clone()),
            detailer: PromptDetailer::new(backends.text.clone(), layout.clone()),
            assets: AssetGenerator::new(backends, layout.clone(), cfg),
            assembler: ClipAssembler::new(layout.clone(), cfg),
            delay: cfg.inter_scene_delay(),
            layout,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Plans and produces in one go.
    pub async fn run(&self, request: StoryRequest) -> Result<RunReport> {
        let plan = self.plan(&request).await?;
        self.produce(&plan).await
    }

    /// Loads the reference, expands or renumbers scenes, and saves the
    /// resulting story structure.
    pub async fn plan(&self, request: &StoryRequest) -> Result<StoryPlan> {
        let reference = match &request.reference_image {
            Some(path) => Some(load_reference(path).await?),
            None => None,
        };

        let scenes = match &request.source {
            SceneSource::Premise { premise, clips } => {
                let subject = match &reference {
                    Some(image) => self.analyze_reference(image).await,
                    None => None,
                };
                self.expander.expand(premise, *clips, subject.as_ref()).await?
            }
            SceneSource::Scenes(stubs) => {
                if stubs.is_empty() {
                    return Err(PipelineError::InvalidInput("scene list is empty".to_string()));
                }
                reindex(stubs.clone())
            }
        };

        write_json(&self.layout.story_structure(), &scenes).await?;
        for scene in &scenes {
            logi(format!("  {}. {}", scene.index, scene.title));
        }

        Ok(StoryPlan {
            scenes,
            reference,
            mode: request.mode,
        })
    }

    async fn analyze_reference(&self, image: &ImageInput) -> Option<Value> {
        match self.expander.describe_reference(image).await {
            Ok(profile) => Some(profile),
            Err(err) => {
                logw(format!("Reference analysis failed, continuing without it: {}", err));
                None
            }
        }
    }

    /// Runs every scene in order, then concatenates whatever clips merged.
    pub async fn produce(&self, plan: &StoryPlan) -> Result<RunReport> {
        let total = plan.scenes.len();
        let mut report = RunReport {
            requested: total,
            ..RunReport::default()
        };

        for (i, stub) in plan.scenes.iter().enumerate() {
            logi("=".repeat(60));
            logi(format!("PROCESSING CLIP {}/{}", stub.index, total));

            match self.detailer.detail(stub, total).await {
                Ok(package) => {
                    self.produce_scene(&package, plan, &mut report).await?;
                    report.packages.push(package);
                }
                Err(err) => loge(format!("Skipping scene {}: {}", stub.index, err)),
            }

            if i + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        write_json(&self.layout.all_scene_prompts(), &report.packages).await?;
        logok(format!(
            "Scene prompts saved: {}",
            self.layout.display(&self.layout.all_scene_prompts())
        ));

        if plan.mode == RunMode::Full {
            if let MergeOutcome::Merged { output, .. } = self.assembler.merge_all(&report.merged_clips).await? {
                report.final_video = Some(output);
            }
        }

        report.recovery_artifacts = self.layout.recovery_artifacts();
        self.summarize(&report);
        Ok(report)
    }

    async fn produce_scene(
        &self,
        package: &ScenePackage,
        plan: &StoryPlan,
        report: &mut RunReport,
    ) -> Result<()> {
        let index = package.index;
        let mut bundle = ClipBundle::new(index);

        if plan.mode == RunMode::Full {
            let image = self
                .assets
                .generate_image(&package.image_prompt, plan.reference.as_ref(), index)
                .await?;
            let image_path = image.artifact.clone();
            report.results.push(image);

            match image_path {
                Some(path) => {
                    let video = self
                        .assets
                        .generate_video(&path, &package.video_prompt, index)
                        .await?;
                    bundle.video = video.artifact.clone();
                    report.results.push(video);
                }
                None => logw(format!("No image for clip {}; video generation skipped", index)),
            }
        }

        let narration = self
            .assets
            .generate_narration(
                &package.narration_text,
                &package.voice_direction,
                &package.title,
                index,
            )
            .await?;
        bundle.narration = narration.artifact.clone();
        report.results.push(narration);

        let soundfx = self
            .assets
            .generate_soundfx(&package.soundfx_description, index)
            .await?;
        report.results.push(soundfx);
        bundle.soundfx = self.assets.soundfx_audio(index);

        if plan.mode == RunMode::Full {
            if let MergeOutcome::Merged { output, .. } = self.assembler.merge_bundle(&bundle).await? {
                report.merged_clips.push(output);
            }
        }
        Ok(())
    }

    fn summarize(&self, report: &RunReport) {
        logi("=".repeat(60));
        logok(format!(
            "Pipeline complete: {}/{} scenes detailed, {} clips merged",
            report.packages.len(),
            report.requested,
            report.merged_clips.len()
        ));
        logi(format!("All outputs saved in: {}", self.layout.root().display()));
        match &report.final_video {
            Some(path) => logok(format!("Final video: {}", self.layout.display(path))),
            None => logw("No final video yet; check the output directory for prompts and partial results"),
        }
        let failed = report.failed_results().count();
        if failed > 0 {
            logw(format!("{} generations fell back to saved prompts", failed));
        }
        for path in &report.recovery_artifacts {
            logi(format!("  pending: {}", self.layout.display(path)));
        }
    }
}

async fn load_reference(path: &Path) -> Result<ImageInput> {
    let data = fs::read(path).await.map_err(|e| {
        PipelineError::InvalidInput(format!("cannot read reference image {}: {}", path.display(), e))
    })?;
    Ok(ImageInput::from_path_and_bytes(path, data))
}
