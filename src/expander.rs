use crate::api::{ImageInput, TextBackend};
use crate::error::{PipelineError, Result};
use crate::extract::parse_response;
use crate::layout::{OutputLayout, write_json};
use crate::scene::{CLIP_SECONDS, SceneStub, reindex};
use crate::{logi, logok, logw};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// What `expanded_story.json` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedStory {
    pub run_id: String,
    pub generated_at: DateTime<Local>,
    pub original_idea: String,
    pub num_clips: usize,
    pub total_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    pub scenes: Vec<SceneStub>,
}

fn expansion_prompt(premise: &str, clips: usize, subject: Option<&Value>) -> String {
    let subject_block = match subject {
        Some(profile) => format!(
            "\nMain subject (keep their appearance identical in every scene):\n{}\n",
            serde_json::to_string_pretty(profile).unwrap_or_else(|_| profile.to_string())
        ),
        None => String::new(),
    };

    format!(
        r#"You are a professional storyteller and screenplay writer.

User's Story Idea:
{premise}
{subject_block}
Task: Expand this story into EXACTLY {clips} scenes. Each scene will be {secs} seconds long.

Requirements:
1. Build a complete narrative arc with a beginning, middle, and end
2. Give every scene a clear title (2-5 words) and a vivid description (2-3 sentences)
3. Keep continuity and flow between scenes
4. Include emotional beats and character development
5. Make each scene visually interesting and cinematic

Return ONLY a JSON array with {clips} objects, each containing:
- "title": Scene title
- "description": Detailed scene description

Generate all {clips} scenes now."#,
        secs = CLIP_SECONDS,
    )
}

const REFERENCE_PROMPT: &str = r#"Analyze the person in this photo and describe:
1. Age range
2. Gender
3. Clothing style and colors
4. Expression and mood
5. Physical features (hair color, build, and similar)
6. Any distinctive characteristics

Return as JSON with keys: age, gender, clothing, expression, features, distinctive"#;

/// Breaks a premise into ordered scene stubs through the text backend.
pub struct SceneExpander {
    text: Arc<dyn TextBackend>,
    layout: OutputLayout,
}

impl SceneExpander {
    pub fn new(text: Arc<dyn TextBackend>, layout: OutputLayout) -> Self {
        Self { text, layout }
    }

    /// Returns exactly `clips` stubs numbered 1..=clips.
    ///
    /// Extra scenes from the backend are dropped; too few is an error rather
    /// than something to pad.
    pub async fn expand(
        &self,
        premise: &str,
        clips: usize,
        subject: Option<&Value>,
    ) -> Result<Vec<SceneStub>> {
        let premise = premise.trim();
        if premise.is_empty() {
            return Err(PipelineError::InvalidInput("story premise is empty".to_string()));
        }
        if clips == 0 {
            return Err(PipelineError::InvalidInput("clip count must be at least 1".to_string()));
        }

        logi(format!("Expanding your story into {} scenes...", clips));
        let response = self
            .text
            .generate_text(&expansion_prompt(premise, clips, subject), None)
            .await?;
        let mut scenes: Vec<SceneStub> = parse_response(&response)?;

        if scenes.len() < clips {
            return Err(PipelineError::CountMismatch {
                requested: clips,
                received: scenes.len(),
            });
        }
        if scenes.len() > clips {
            logw(format!(
                "Backend returned {} scenes; keeping the first {}",
                scenes.len(),
                clips
            ));
            scenes.truncate(clips);
        }
        let scenes = reindex(scenes);

        let now = Local::now();
        let story = ExpandedStory {
            run_id: now.format("%Y%m%d_%H%M%S").to_string(),
            generated_at: now,
            original_idea: premise.to_string(),
            num_clips: clips,
            total_duration_seconds: (clips as u64).saturating_mul(u64::from(CLIP_SECONDS)),
            subject: subject.cloned(),
            scenes,
        };
        let path = self.layout.expanded_story();
        write_json(&path, &story).await?;
        logok(format!("Story expanded into {} scenes: {}", clips, self.layout.display(&path)));

        Ok(story.scenes)
    }

    /// Builds a subject profile from a reference photo and saves it to
    /// `reference_analysis.json`.
    pub async fn describe_reference(&self, image: &ImageInput) -> Result<Value> {
        logi("Analyzing reference image...");
        let response = self.text.generate_text(REFERENCE_PROMPT, Some(image)).await?;
        let profile: Value = parse_response(&response)?;
        write_json(&self.layout.reference_analysis(), &profile).await?;
        logok("Reference image analysis complete");
        Ok(profile)
    }
}
