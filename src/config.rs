use crate::logw;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const API_KEY_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "google_api_key", default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_tts_temperature")]
    pub tts_temperature: f32,

    #[serde(default = "default_video_poll_interval_secs")]
    pub video_poll_interval_secs: u64,
    #[serde(default = "default_video_max_wait_secs")]
    pub video_max_wait_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_inter_scene_delay_ms")]
    pub inter_scene_delay_ms: u64,
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_text_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_video_model() -> String {
    "veo-2.0-generate-001".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_voice_name() -> String {
    "Kore".to_string()
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_resolution() -> String {
    "1080p".to_string()
}

fn default_tts_temperature() -> f32 {
    0.7
}

fn default_video_poll_interval_secs() -> u64 {
    10
}

fn default_video_max_wait_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_inter_scene_delay_ms() -> u64 {
    2000
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            tts_model: default_tts_model(),
            voice_name: default_voice_name(),
            aspect_ratio: default_aspect_ratio(),
            resolution: default_resolution(),
            tts_temperature: default_tts_temperature(),
            video_poll_interval_secs: default_video_poll_interval_secs(),
            video_max_wait_secs: default_video_max_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            inter_scene_delay_ms: default_inter_scene_delay_ms(),
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
        }
    }
}

impl Config {
    /// Reads `path` if it exists, then applies environment overrides.
    ///
    /// A `.env` file in the working directory is honoured. The API key must
    /// come from somewhere.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(warning) = dotenv_warning(dotenvy::dotenv()) {
            logw(warning);
        }

        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());

        if config.api_key.trim().is_empty() {
            anyhow::bail!(
                "no API key: set google_api_key in {} or export GOOGLE_API_KEY",
                path.display()
            );
        }

        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = API_KEY_VARS
            .iter()
            .filter_map(|var| lookup(var))
            .find(|v| !v.trim().is_empty())
        {
            self.api_key = key;
        }
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_secs(self.video_poll_interval_secs.max(1))
    }

    pub fn video_max_wait(&self) -> Duration {
        Duration::from_secs(self.video_max_wait_secs)
    }

    pub fn inter_scene_delay(&self) -> Duration {
        Duration::from_millis(self.inter_scene_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// A missing `.env` is normal; anything else is worth a warning.
fn dotenv_warning(result: std::result::Result<PathBuf, dotenvy::Error>) -> Option<String> {
    match result {
        Err(err) if !err.not_found() => Some(format!("Ignoring .env file: {}", err)),
        _ => None,
    }
}
