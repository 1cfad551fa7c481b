//! Turns prompts into media. Every operation either lands its artifact or
//! leaves the prompt on disk for someone to finish by hand; backend trouble
//! never escapes this module.

use crate::api::{AudioClip, Backends, ImageInput, ImageRequest, VideoRequest};
use crate::config::Config;
use crate::error::{BackendError, Result};
use crate::ffmpeg::ClipAssembler;
use crate::layout::{OutputLayout, write_artifact};
use crate::scene::{AssetKind, CLIP_SECONDS, GenerationResult};
use crate::{loge, logi, logok, logw};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;

/// What a successful call left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Artifact(PathBuf),
    /// The call worked but produced nothing usable; a text stand-in was written.
    Fallback(PathBuf),
}

/// Runs `call`, hands its value to `on_success`, and on any error writes the
/// file described by `on_failure` instead.
///
/// Only a failure to write the fallback itself is returned as an error.
pub async fn attempt<T, C, S, SFut, F>(
    kind: AssetKind,
    index: usize,
    call: C,
    on_success: S,
    on_failure: F,
) -> Result<GenerationResult>
where
    C: Future<Output = std::result::Result<T, BackendError>>,
    S: FnOnce(T) -> SFut,
    SFut: Future<Output = std::result::Result<Delivered, BackendError>>,
    F: FnOnce(&BackendError) -> (PathBuf, String),
{
    let outcome = match call.await {
        Ok(value) => on_success(value).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(Delivered::Artifact(path)) => {
            logok(format!("{} for clip {} saved: {}", kind, index, path.display()));
            Ok(GenerationResult::ok(kind, index, path))
        }
        Ok(Delivered::Fallback(path)) => {
            logw(format!("No {} returned for clip {}; saved {}", kind, index, path.display()));
            Ok(GenerationResult::failed(kind, index, path))
        }
        Err(err) => {
            loge(format!("Error generating {} for clip {}: {}", kind, index, err));
            let (path, contents) = on_failure(&err);
            write_artifact(&path, contents).await?;
            logw(format!("Saved prompt for manual generation: {}", path.display()));
            Ok(GenerationResult::failed(kind, index, path))
        }
    }
}

async fn save_bytes(path: PathBuf, bytes: Vec<u8>, what: &str) -> std::result::Result<Delivered, BackendError> {
    if bytes.is_empty() {
        return Err(BackendError::MissingOutput(what.to_string()));
    }
    write_artifact(&path, bytes).await?;
    Ok(Delivered::Artifact(path))
}

pub fn narration_prompt(narration_text: &str, voice_direction: &str) -> String {
    format!(
        "Voice Direction: {}\n\nNarration: {}\n\nDeliver this narration with the specified voice direction, paced for {} seconds.",
        voice_direction, narration_text, CLIP_SECONDS
    )
}

/// Image, video, narration and sound-effect production for one scene at a time.
pub struct AssetGenerator {
    backends: Backends,
    layout: OutputLayout,
    assembler: ClipAssembler,
    aspect_ratio: String,
    resolution: String,
    tts_temperature: f32,
}

impl AssetGenerator {
    pub fn new(backends: Backends, layout: OutputLayout, cfg: &Config) -> Self {
        Self {
            backends,
            assembler: ClipAssembler::new(layout.clone(), cfg),
            layout,
            aspect_ratio: cfg.aspect_ratio.clone(),
            resolution: cfg.resolution.clone(),
            tts_temperature: cfg.tts_temperature,
        }
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        reference: Option<&ImageInput>,
        index: usize,
    ) -> Result<GenerationResult> {
        logi(format!("Generating image for clip {}...", index));
        let target = self.layout.image(index);
        let request = ImageRequest {
            prompt,
            reference,
            aspect_ratio: &self.aspect_ratio,
        };

        attempt(
            AssetKind::Image,
            index,
            self.backends.image.generate_image(&request),
            |bytes| save_bytes(target, bytes, "image"),
            |_| {
                (
                    self.layout.image_prompt(index),
                    format!("IMAGE PROMPT:\n\n{}", prompt),
                )
            },
        )
        .await
    }

    pub async fn generate_video(
        &self,
        source_image: &Path,
        prompt: &str,
        index: usize,
    ) -> Result<GenerationResult> {
        logi(format!("Generating video for clip {}...", index));
        let target = self.layout.video(index);
        let call = async {
            let data = fs::read(source_image).await.map_err(BackendError::from)?;
            let image = ImageInput::from_path_and_bytes(source_image, data);
            let request = VideoRequest {
                prompt,
                image: &image,
                duration_seconds: CLIP_SECONDS,
                aspect_ratio: &self.aspect_ratio,
                resolution: &self.resolution,
            };
            self.backends.video.generate_video(&request).await
        };

        attempt(
            AssetKind::Video,
            index,
            call,
            |bytes| save_bytes(target, bytes, "video"),
            |_| {
                (
                    self.layout.video_prompt(index),
                    format!("VIDEO PROMPT:\n\n{}", prompt),
                )
            },
        )
        .await
    }

    pub async fn generate_narration(
        &self,
        narration_text: &str,
        voice_direction: &str,
        title: &str,
        index: usize,
    ) -> Result<GenerationResult> {
        logi(format!("Generating narration for clip {}...", index));
        logi(format!("   Text: {}", narration_text));
        let tts_prompt = narration_prompt(narration_text, voice_direction);
        let text_path = self.layout.narration_text(index);
        let header = format!(
            "SCENE {}: {}\n\nNARRATION TEXT:\n{}\n\nVOICE DIRECTION:\n{}\n\n",
            index, title, narration_text, voice_direction
        );

        let prompt_ref = tts_prompt.as_str();
        let header_ref = header.as_str();
        let soft_path = text_path.clone();

        attempt(
            AssetKind::Narration,
            index,
            self.backends
                .narration
                .synthesize(&tts_prompt, self.tts_temperature),
            move |clip: Option<AudioClip>| async move {
                match clip {
                    Some(clip) => self.write_audio(clip, index).await.map(Delivered::Artifact),
                    None => {
                        let body = format!("{}TTS PROMPT:\n{}\n", header_ref, prompt_ref);
                        write_artifact(&soft_path, body).await?;
                        Ok::<_, BackendError>(Delivered::Fallback(soft_path))
                    }
                }
            },
            |err| (text_path, format!("{}ERROR: {}\n", header, err)),
        )
        .await
    }

    /// Stores inline audio as mp3. Raw PCM goes through ffmpeg first.
    async fn write_audio(&self, clip: AudioClip, index: usize) -> std::result::Result<PathBuf, BackendError> {
        let target = self.layout.narration_audio(index);
        if clip.data.is_empty() {
            return Err(BackendError::MissingOutput("audio".to_string()));
        }
        if !clip.is_pcm() {
            write_artifact(&target, &clip.data).await?;
            return Ok(target);
        }

        let pcm = tempfile::Builder::new()
            .prefix("narration-")
            .suffix(".pcm")
            .tempfile()?;
        fs::write(pcm.path(), &clip.data).await?;
        self.assembler
            .transcode_pcm(pcm.path(), clip.sample_rate(), &target)
            .await?;
        Ok(target)
    }

    /// Writes the sound design brief; there is no sound-effects backend.
    pub async fn generate_soundfx(&self, description: &str, index: usize) -> Result<GenerationResult> {
        logi(format!("Preparing sound effects for clip {}...", index));
        let path = self.layout.soundfx_description(index);
        write_artifact(&path, format!("SOUND EFFECTS DESCRIPTION:\n\n{}", description)).await?;
        logok(format!("Sound FX description saved: {}", path.display()));
        Ok(GenerationResult::ok(AssetKind::SoundFx, index, path))
    }

    /// Where a hand-made sound effect for `index` would be picked up.
    pub fn soundfx_audio(&self, index: usize) -> Option<PathBuf> {
        let path = self.layout.soundfx_audio(index);
        path.is_file().then_some(path)
    }
}
