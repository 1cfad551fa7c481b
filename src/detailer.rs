//! Turns a scene stub into the full production package: image and video
//! prompts, narration with voice direction, and a sound design brief.

use crate::api::TextBackend;
use crate::error::{PipelineError, Result};
use crate::extract::parse_response;
use crate::layout::{OutputLayout, write_artifact, write_json};
use crate::scene::{CLIP_SECONDS, ScenePackage, SceneStub};
use crate::{logi, logok};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn key_separators() -> std::result::Result<&'static Regex, regex::Error> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"[^A-Za-z0-9]+"))
}

/// `image prompt`, `Image-Prompt` and `image_prompt` all become `IMAGE_PROMPT`.
fn normalize_key(key: &str) -> std::result::Result<String, regex::Error> {
    Ok(key_separators()?
        .replace_all(key.trim(), "_")
        .trim_matches('_')
        .to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Image,
    Video,
    Narration,
    Voice,
    SoundFx,
}

fn field_for(key: &str) -> Option<Field> {
    Some(match key {
        "IMAGE_PROMPT" => Field::Image,
        "VIDEO_PROMPT" | "ANIMATION_PROMPT" => Field::Video,
        "NARRATION_TEXT" | "NARRATION" => Field::Narration,
        "NARRATION_VOICE_DIRECTION" | "VOICE_DIRECTION" => Field::Voice,
        "SOUND_FX" | "SOUNDFX" | "SOUNDFX_DESCRIPTION" | "SOUND_FX_DESCRIPTION" | "SOUND_EFFECTS" => {
            Field::SoundFx
        }
        _ => return None,
    })
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn detail_prompt(stub: &SceneStub, total: usize) -> String {
    format!(
        r#"Create ultra-detailed production prompts for this {secs}-second story scene:

Scene {index} of {total}
Title: {title}
Description: {description}

Generate the following with MAXIMUM detail:

1. IMAGE_PROMPT: Ultra-detailed visual prompt (300+ words) covering lighting, camera angle and framing, environment, color palette and mood, character posture, expression and clothing, props, artistic style, depth of field, and atmosphere.

2. VIDEO_PROMPT: Detailed motion prompt (200+ words) covering camera movement and speed, character actions with timing, environmental animation, pacing within the {secs} seconds with key moments at 0s, 2s, 4s, 6s and 8s, and cinematic techniques.

3. NARRATION_TEXT: Engaging {secs}-second narration (20-25 words, 2-3 sentences) in a warm storytelling voice that matches the scene's mood and connects to the visual action.

4. NARRATION_VOICE_DIRECTION: TTS voice direction covering tone and emotion, pacing and pauses, voice character, words to emphasize, and volume dynamics.

5. SOUND_FX: Comprehensive sound design (150+ words) covering ambience, timed action effects, foley, music style and tempo, transitions, stereo placement, and mixing notes.

Return ONLY a JSON object with these 5 fields, no additional text."#,
        secs = CLIP_SECONDS,
        index = stub.index,
        title = stub.title,
        description = stub.description,
    )
}

/// Maps a detailer response onto a package for `stub`.
pub fn package_from_response(stub: &SceneStub, object: &Map<String, Value>) -> Result<ScenePackage> {
    let mut fields: HashMap<Field, String> = HashMap::new();
    for (key, value) in object {
        let key = normalize_key(key).map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        if let Some(field) = field_for(&key) {
            fields.entry(field).or_insert_with(|| render_value(value));
        }
    }

    let mut take = |field: Field| fields.remove(&field).unwrap_or_default();
    let package = ScenePackage {
        index: stub.index,
        title: stub.title.clone(),
        description: stub.description.clone(),
        image_prompt: take(Field::Image),
        video_prompt: take(Field::Video),
        narration_text: take(Field::Narration),
        voice_direction: take(Field::Voice),
        soundfx_description: take(Field::SoundFx),
    };

    for (value, field) in [
        (&package.image_prompt, "image prompt"),
        (&package.video_prompt, "video prompt"),
        (&package.narration_text, "narration text"),
    ] {
        if value.is_empty() {
            return Err(PipelineError::MissingField {
                index: stub.index,
                field,
            });
        }
    }
    Ok(package)
}

pub struct PromptDetailer {
    text: Arc<dyn TextBackend>,
    layout: OutputLayout,
}

impl PromptDetailer {
    pub fn new(text: Arc<dyn TextBackend>, layout: OutputLayout) -> Self {
        Self { text, layout }
    }

    pub async fn detail(&self, stub: &SceneStub, total: usize) -> Result<ScenePackage> {
        logi(format!(
            "Processing scene {}/{}: {}",
            stub.index, total, stub.title
        ));
        let response = self
            .text
            .generate_text(&detail_prompt(stub, total), None)
            .await?;
        let object: Map<String, Value> = parse_response(&response)?;
        let package = package_from_response(stub, &object)?;

        self.save(&package).await?;
        logok(format!("Scene {} prompts generated", package.index));
        Ok(package)
    }

    async fn save(&self, package: &ScenePackage) -> Result<()> {
        let header = format!("SCENE {}: {}\n{}\n\n", package.index, package.title, "=".repeat(80));
        let sections = [
            ("IMAGE", "IMAGE GENERATION PROMPT", &package.image_prompt),
            ("VIDEO", "VIDEO GENERATION PROMPT", &package.video_prompt),
            ("SOUNDFX", "SOUND EFFECTS PROMPT", &package.soundfx_description),
        ];
        for (label, heading, body) in sections {
            let path = self.layout.scene_prompt(package.index, label);
            write_artifact(&path, format!("{header}{heading}\n\n{body}")).await?;
        }
        write_json(&self.layout.scene_json(package.index), package).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ImageInput;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct Reply(std::result::Result<String, String>);

    #[async_trait]
    impl TextBackend for Reply {
        async fn generate_text(
            &self,
            _prompt: &str,
            _image: Option<&ImageInput>,
        ) -> std::result::Result<String, BackendError> {
            self.0.clone().map_err(BackendError::Api)
        }
    }

    fn stub() -> SceneStub {
        SceneStub::new(2, "Into the Woods", "The child steps between tall pines.")
    }

    #[test]
    fn keys_are_case_and_punctuation_insensitive() {
        assert_eq!(normalize_key("image prompt").unwrap(), "IMAGE_PROMPT");
        assert_eq!(
            normalize_key("Narration-Voice Direction").unwrap(),
            "NARRATION_VOICE_DIRECTION"
        );
        assert_eq!(normalize_key(" sound_fx ").unwrap(), "SOUND_FX");
    }

    #[test]
    fn full_video_variant_keys_are_accepted() {
        let object = json!({
            "image_prompt": "pines at dusk",
            "video_prompt": "slow push in",
            "narration_text": "She took a breath.",
            "voice_direction": "hushed",
            "soundfx_description": "wind in needles"
        });
        let package = package_from_response(&stub(), object.as_object().unwrap()).unwrap();
        assert_eq!(package.voice_direction, "hushed");
        assert_eq!(package.soundfx_description, "wind in needles");
        assert_eq!(package.index, 2);
        assert_eq!(package.title, "Into the Woods");
    }

    #[test]
    fn structured_values_are_rendered_as_json() {
        let object = json!({
            "IMAGE_PROMPT": "pines",
            "VIDEO_PROMPT": {"camera": "dolly"},
            "NARRATION_TEXT": "Onward."
        });
        let package = package_from_response(&stub(), object.as_object().unwrap()).unwrap();
        assert!(package.video_prompt.contains("\"camera\": \"dolly\""));
        assert_eq!(package.voice_direction, "");
        assert_eq!(package.soundfx_description, "");
    }

    #[test]
    fn missing_narration_is_an_error() {
        let object = json!({"IMAGE_PROMPT": "pines", "VIDEO_PROMPT": "pan"});
        let err = package_from_response(&stub(), object.as_object().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingField { index: 2, field: "narration text" }
        ));
    }

    #[tokio::test]
    async fn detail_writes_prompt_files_and_json() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path());
        let reply = r#"```json
{"IMAGE_PROMPT":"pines at dusk","VIDEO_PROMPT":"slow push in","NARRATION_TEXT":"She took a breath.","NARRATION_VOICE_DIRECTION":"hushed","SOUND_FX":"owl call"}
```"#;
        let detailer = PromptDetailer::new(Arc::new(Reply(Ok(reply.to_string()))), layout.clone());

        let package = detailer.detail(&stub(), 5).await.unwrap();
        assert_eq!(package.narration_text, "She took a breath.");

        let image = std::fs::read_to_string(layout.scene_prompt(2, "IMAGE")).unwrap();
        assert!(image.starts_with("SCENE 2: Into the Woods\n===="));
        assert!(image.ends_with("IMAGE GENERATION PROMPT\n\npines at dusk"));
        let sfx = std::fs::read_to_string(layout.scene_prompt(2, "SOUNDFX")).unwrap();
        assert!(sfx.ends_with("owl call"));
        let saved: ScenePackage =
            serde_json::from_str(&std::fs::read_to_string(layout.scene_json(2)).unwrap()).unwrap();
        assert_eq!(saved, package);
    }

    #[tokio::test]
    async fn backend_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path());
        let detailer = PromptDetailer::new(Arc::new(Reply(Err("down".into()))), layout.clone());

        let err = detailer.detail(&stub(), 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend(_)));
        assert!(!layout.scene_json(2).exists());
    }
}
