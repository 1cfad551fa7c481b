//! Backend seams. Each generative service is a trait so the pipeline can be
//! driven by the Gemini client in production and by doubles in tests.

use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod gemini;

pub use gemini::GeminiClient;

/// Raw image bytes plus the MIME type the backend should be told.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Guesses the MIME type from the file extension; defaults to JPEG.
    pub fn from_path_and_bytes(path: &std::path::Path, data: Vec<u8>) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let mime = match ext.as_deref() {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/jpeg",
        };
        Self::new(mime, data)
    }
}

#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub reference: Option<&'a ImageInput>,
    pub aspect_ratio: &'a str,
}

#[derive(Debug, Clone)]
pub struct VideoRequest<'a> {
    pub prompt: &'a str,
    pub image: &'a ImageInput,
    pub duration_seconds: u32,
    pub aspect_ratio: &'a str,
    pub resolution: &'a str,
}

/// Inline audio returned by a speech backend.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AudioClip {
    /// Raw 16-bit PCM (`audio/L16;rate=24000`) rather than an encoded file.
    pub fn is_pcm(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.starts_with("audio/l16") || mime.contains("pcm")
    }

    /// Sample rate from the MIME parameters, 24 kHz when absent.
    pub fn sample_rate(&self) -> u32 {
        self.mime_type
            .split(';')
            .filter_map(|p| p.trim().strip_prefix("rate="))
            .find_map(|r| r.parse().ok())
            .unwrap_or(24_000)
    }
}

#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<String, BackendError>;
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate_image(&self, request: &ImageRequest<'_>) -> Result<Vec<u8>, BackendError>;
}

#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Blocks until the backend finishes or the configured wait runs out.
    async fn generate_video(&self, request: &VideoRequest<'_>) -> Result<Vec<u8>, BackendError>;
}

#[async_trait]
pub trait NarrationBackend: Send + Sync {
    /// `Ok(None)` means the call went through but no audio came back.
    async fn synthesize(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<Option<AudioClip>, BackendError>;
}

/// One handle per backend kind.
#[derive(Clone)]
pub struct Backends {
    pub text: Arc<dyn TextBackend>,
    pub image: Arc<dyn ImageBackend>,
    pub video: Arc<dyn VideoBackend>,
    pub narration: Arc<dyn NarrationBackend>,
}

impl Backends {
    /// All four kinds served by the same Gemini client.
    pub fn gemini(client: GeminiClient) -> Self {
        let client = Arc::new(client);
        Self {
            text: client.clone(),
            image: client.clone(),
            video: client.clone(),
            narration: client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_mime_is_detected_with_rate() {
        let clip = AudioClip {
            mime_type: "audio/L16;codec=pcm;rate=22050".to_string(),
            data: vec![],
        };
        assert!(clip.is_pcm());
        assert_eq!(clip.sample_rate(), 22_050);
    }

    #[test]
    fn encoded_audio_is_not_pcm() {
        let clip = AudioClip {
            mime_type: "audio/mpeg".to_string(),
            data: vec![],
        };
        assert!(!clip.is_pcm());
        assert_eq!(clip.sample_rate(), 24_000);
    }

    #[test]
    fn reference_mime_follows_extension() {
        let img = ImageInput::from_path_and_bytes(std::path::Path::new("kid.PNG"), vec![1]);
        assert_eq!(img.mime_type, "image/png");
        let img = ImageInput::from_path_and_bytes(std::path::Path::new("kid.jpeg"), vec![1]);
        assert_eq!(img.mime_type, "image/jpeg");
    }
}
