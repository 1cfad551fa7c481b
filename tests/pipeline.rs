use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use story_reel::api::{
    AudioClip, Backends, ImageBackend, ImageInput, ImageRequest, NarrationBackend, TextBackend,
    VideoBackend, VideoRequest,
};
use story_reel::generator::{RunMode, StoryPipeline, StoryRequest};
use story_reel::init::ensure_directories;
use story_reel::layout::OutputLayout;
use story_reel::scene::{AssetKind, GenerationStatus, SceneStub};
use story_reel::{BackendError, Config, PipelineError};
use tempfile::TempDir;

/// Scripted backends. The detailer reply for `broken_scene` is not JSON and
/// the image call for `failing_image` errors out.
#[derive(Default)]
struct Studio {
    scenes: usize,
    broken_scene: Option<usize>,
    failing_image: Option<usize>,
    calls: Mutex<Vec<String>>,
}

impl Studio {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextBackend for Studio {
    async fn generate_text(&self, prompt: &str, _image: Option<&ImageInput>) -> Result<String, BackendError> {
        if prompt.contains("Expand this story") {
            self.record("expand");
            let scenes: Vec<String> = (1..=self.scenes)
                .map(|i| format!(r#"{{"title":"Beat {i}","description":"Something happens {i}."}}"#))
                .collect();
            return Ok(format!("```json\n[{}]\n```", scenes.join(",")));
        }

        let index = (1..=100)
            .find(|i| prompt.contains(&format!("Scene {i} of")))
            .unwrap_or(0);
        self.record(format!("detail {index}"));
        if self.broken_scene == Some(index) {
            return Ok("I'd rather not.".to_string());
        }
        Ok(format!(
            r#"{{"IMAGE_PROMPT":"image {index}","VIDEO_PROMPT":"video {index}","NARRATION_TEXT":"narration {index}","NARRATION_VOICE_DIRECTION":"calm","SOUND_FX":"wind {index}"}}"#
        ))
    }
}

#[async_trait]
impl ImageBackend for Studio {
    async fn generate_image(&self, request: &ImageRequest<'_>) -> Result<Vec<u8>, BackendError> {
        self.record(format!("image {}", request.prompt));
        if self.failing_image.is_some_and(|i| request.prompt == format!("image {i}")) {
            return Err(BackendError::Api("safety filter".to_string()));
        }
        Ok(b"png".to_vec())
    }
}

#[async_trait]
impl VideoBackend for Studio {
    async fn generate_video(&self, request: &VideoRequest<'_>) -> Result<Vec<u8>, BackendError> {
        self.record(format!("video {}", request.prompt));
        Ok(b"mp4".to_vec())
    }
}

#[async_trait]
impl NarrationBackend for Studio {
    async fn synthesize(&self, _prompt: &str, _temperature: f32) -> Result<Option<AudioClip>, BackendError> {
        self.record("narration");
        Ok(Some(AudioClip {
            mime_type: "audio/mpeg".to_string(),
            data: b"ID3".to_vec(),
        }))
    }
}

fn test_config() -> Config {
    Config {
        inter_scene_delay_ms: 0,
        ffmpeg_bin: "definitely-not-ffmpeg-binary".to_string(),
        ffprobe_bin: "definitely-not-ffprobe-binary".to_string(),
        ..Config::default()
    }
}

async fn pipeline(dir: &TempDir, studio: Arc<Studio>) -> (StoryPipeline, OutputLayout) {
    pipeline_with(dir, studio, &test_config()).await
}

async fn pipeline_with(dir: &TempDir, studio: Arc<Studio>, cfg: &Config) -> (StoryPipeline, OutputLayout) {
    let layout = OutputLayout::new(dir.path().join("out"));
    ensure_directories(&layout).await.unwrap();
    let backends = Backends {
        text: studio.clone(),
        image: studio.clone(),
        video: studio.clone(),
        narration: studio,
    };
    (StoryPipeline::new(backends, layout.clone(), cfg), layout)
}

#[tokio::test]
async fn full_run_skips_broken_scene_and_defers_merges() {
    let dir = TempDir::new().unwrap();
    let studio = Arc::new(Studio {
        scenes: 3,
        broken_scene: Some(2),
        ..Studio::default()
    });
    let (pipeline, layout) = pipeline(&dir, studio.clone()).await;

    let report = pipeline
        .run(StoryRequest::premise("A kite escapes.", 3))
        .await
        .unwrap();

    assert_eq!(report.requested, 3);
    assert_eq!(
        report.packages.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![1, 3]
    );
    assert!(report.merged_clips.is_empty());
    assert!(report.final_video.is_none());

    assert!(layout.image(1).is_file());
    assert!(layout.video(3).is_file());
    assert!(layout.narration_audio(3).is_file());
    assert!(!layout.scene_json(2).exists());
    assert!(!layout.image(2).exists());

    // Merge scripts are written even though ffmpeg is unavailable.
    assert!(layout.merge_script(1).is_file());
    assert!(layout.merge_script(3).is_file());
    assert!(report.recovery_artifacts.contains(&layout.merge_script(1)));
    assert!(!layout.final_merge_script().exists());

    assert!(layout.story_structure().is_file());
    assert!(layout.expanded_story().is_file());
    let saved: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(layout.all_scene_prompts()).unwrap()).unwrap();
    assert_eq!(saved.len(), 2);

    // Strictly sequential: every scene finishes before the next detail call.
    let calls = studio.calls();
    let order: Vec<&str> = calls.iter().map(String::as_str).collect();
    assert_eq!(
        order,
        vec![
            "expand",
            "detail 1",
            "image image 1",
            "video video 1",
            "narration",
            "detail 2",
            "detail 3",
            "image image 3",
            "video video 3",
            "narration",
        ]
    );
}

#[tokio::test]
async fn failed_image_skips_video_and_keeps_prompt() {
    let dir = TempDir::new().unwrap();
    let studio = Arc::new(Studio {
        scenes: 2,
        failing_image: Some(1),
        ..Studio::default()
    });
    let (pipeline, layout) = pipeline(&dir, studio.clone()).await;

    let report = pipeline
        .run(StoryRequest::premise("A kite escapes.", 2))
        .await
        .unwrap();

    let image = report
        .results
        .iter()
        .find(|r| r.kind == AssetKind::Image && r.index == 1)
        .unwrap();
    assert_eq!(image.status, GenerationStatus::Failed);
    assert!(layout.image_prompt(1).is_file());
    assert!(!report.results.iter().any(|r| r.kind == AssetKind::Video && r.index == 1));
    assert!(!studio.calls().contains(&"video video 1".to_string()));
    assert!(!layout.merge_script(1).exists());
    assert!(layout.video(2).is_file());
}

#[tokio::test]
async fn prompts_only_run_touches_no_media_backends() {
    let dir = TempDir::new().unwrap();
    let studio = Arc::new(Studio::default());
    let (pipeline, layout) = pipeline(&dir, studio.clone()).await;

    let scenes = vec![
        SceneStub::new(9, "Wake-Up Call", "Sunlight floods the dorm room."),
        SceneStub::new(4, "Late Again", "Sprinting across the quad."),
    ];
    let report = pipeline
        .run(StoryRequest::scenes(scenes).with_mode(RunMode::PromptsOnly))
        .await
        .unwrap();

    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.packages[0].title, "Wake-Up Call");
    assert_eq!(report.packages[0].index, 1);
    assert!(layout.scene_prompt(2, "VIDEO").is_file());
    assert!(layout.soundfx_description(2).is_file());
    assert!(layout.narration_audio(1).is_file());
    assert!(!layout.merge_script(1).exists());
    assert!(
        !studio
            .calls()
            .iter()
            .any(|c| c == "expand" || c.starts_with("image") || c.starts_with("video"))
    );
}

#[tokio::test]
async fn short_expansion_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let studio = Arc::new(Studio {
        scenes: 2,
        ..Studio::default()
    });
    let (pipeline, layout) = pipeline(&dir, studio.clone()).await;

    let err = pipeline
        .run(StoryRequest::premise("A kite escapes.", 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::CountMismatch { requested: 5, received: 2 }
    ));
    assert_eq!(studio.calls(), vec!["expand".to_string()]);
    assert!(!layout.story_structure().exists());
}

#[tokio::test]
async fn unreadable_reference_photo_aborts_before_any_call() {
    let dir = TempDir::new().unwrap();
    let studio = Arc::new(Studio {
        scenes: 1,
        ..Studio::default()
    });
    let (pipeline, _) = pipeline(&dir, studio.clone()).await;

    let request = StoryRequest::premise("A kite escapes.", 1).with_reference(dir.path().join("missing.jpg"));
    assert!(matches!(
        pipeline.run(request).await,
        Err(PipelineError::InvalidInput(_))
    ));
    assert!(studio.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delay_runs_between_scenes_only() {
    let dir = TempDir::new().unwrap();
    let cfg = Config {
        inter_scene_delay_ms: 2_000,
        ..test_config()
    };
    let (pipeline, _) = pipeline_with(&dir, Arc::new(Studio::default()), &cfg).await;

    let stubs = |n: usize| -> Vec<SceneStub> {
        (1..=n).map(|i| SceneStub::new(i, format!("Beat {i}"), "Wind in the trees.")).collect()
    };

    let started = tokio::time::Instant::now();
    let report = pipeline
        .run(StoryRequest::scenes(stubs(3)).with_mode(RunMode::PromptsOnly))
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert_eq!(report.packages.len(), 3);
    assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");

    let started = tokio::time::Instant::now();
    pipeline
        .run(StoryRequest::scenes(stubs(1)).with_mode(RunMode::PromptsOnly))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}
