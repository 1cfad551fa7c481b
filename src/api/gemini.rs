use super::{
    AudioClip, ImageBackend, ImageInput, ImageRequest, NarrationBackend, TextBackend,
    VideoBackend, VideoRequest,
};
use crate::config::Config;
use crate::error::BackendError;
use crate::{logi, logw};
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

const API_KEY_HEADER: &str = "x-goog-api-key";
const BODY_SNIPPET: usize = 800;

/// REST client for the Gemini API family: text, image, Veo video and TTS.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    text_model: String,
    image_model: String,
    video_model: String,
    tts_model: String,
    voice_name: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.api_key.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
            video_model: cfg.video_model.clone(),
            tts_model: cfg.tts_model.clone(),
            voice_name: cfg.voice_name.clone(),
            poll_interval: cfg.video_poll_interval(),
            max_wait: cfg.video_max_wait(),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, BackendError> {
        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        self.read_json(resp).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, BackendError> {
        let resp = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        self.read_json(resp).await
    }

    async fn read_json(&self, resp: reqwest::Response) -> Result<Value, BackendError> {
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            logw(format!("Gemini HTTP {}", status.as_u16()));
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| api_error_message(&v));
            let body = message.unwrap_or_else(|| raw.chars().take(BODY_SNIPPET).collect());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&raw)?;
        if let Some(message) = api_error_message(&value) {
            return Err(BackendError::Api(message));
        }
        Ok(value)
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .client
            .get(uri)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

fn inline_part(image: &ImageInput) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64.encode(&image.data),
        }
    })
}

/// Logs and summarises an `{"error": {...}}` body.
fn api_error_message(root: &Value) -> Option<String> {
    let err = root.get("error")?;
    let msg = err.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error");
    if let Some(status) = err.get("status").and_then(|v| v.as_str()) {
        logw(format!("Gemini error status: {}", status));
    }
    if let Some(code) = err.get("code").and_then(|v| v.as_i64()) {
        logw(format!("Gemini error code: {}", code));
    }
    logw(format!("Gemini error message: {}", msg));
    Some(msg.to_string())
}

fn candidate_parts(root: &Value) -> impl Iterator<Item = &Value> {
    root.get("candidates")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|c| c.pointer("/content/parts").and_then(|p| p.as_array()))
        .flatten()
}

/// Concatenates the text parts of the first candidate.
fn collect_text(root: &Value) -> Option<String> {
    let parts = root.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// First inline media part: `(mime_type, base64 data)`.
fn first_inline_data(root: &Value) -> Option<(String, String)> {
    candidate_parts(root).find_map(|part| {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
        let data = inline.get("data")?.as_str()?;
        let mime = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(|m| m.as_str())
            .unwrap_or("application/octet-stream");
        Some((mime.to_string(), data.to_string()))
    })
}

/// Where a finished Veo sample can be fetched from.
#[derive(Debug, PartialEq, Eq)]
enum VideoSample {
    Uri(String),
    Inline(String),
}

/// `Ok(None)` while the operation is still running.
fn operation_video_sample(op: &Value) -> Result<Option<VideoSample>, BackendError> {
    if !op.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
        return Ok(None);
    }
    if let Some(err) = op.get("error") {
        let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let msg = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
        return Err(BackendError::Api(format!(
            "video operation failed (code {}): {}",
            code, msg
        )));
    }

    let video = op
        .pointer("/response/generateVideoResponse/generatedSamples/0/video")
        .or_else(|| op.pointer("/response/videos/0"))
        .ok_or_else(|| BackendError::MissingOutput("video sample".to_string()))?;

    if let Some(uri) = video.get("uri").and_then(|u| u.as_str()) {
        return Ok(Some(VideoSample::Uri(uri.to_string())));
    }
    if let Some(data) = video.get("bytesBase64Encoded").and_then(|d| d.as_str()) {
        return Ok(Some(VideoSample::Inline(data.to_string())));
    }
    Err(BackendError::MissingOutput("video uri".to_string()))
}

#[async_trait]
impl TextBackend for GeminiClient {
    async fn generate_text(
        &self,
        prompt: &str,
        image: Option<&ImageInput>,
    ) -> Result<String, BackendError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            parts.push(inline_part(image));
        }
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });

        let url = self.model_url(&self.text_model, "generateContent");
        let resp = self.post_json(&url, &body).await?;
        collect_text(&resp).ok_or_else(|| BackendError::MissingOutput("text".to_string()))
    }
}

#[async_trait]
impl ImageBackend for GeminiClient {
    async fn generate_image(&self, request: &ImageRequest<'_>) -> Result<Vec<u8>, BackendError> {
        let text = format!(
            "{}\n\nAspect ratio: {}. Generate exactly one image.",
            request.prompt, request.aspect_ratio
        );
        let mut parts = vec![json!({ "text": text })];
        if let Some(reference) = request.reference {
            parts.push(inline_part(reference));
        }
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "candidateCount": 1,
            },
        });

        let url = self.model_url(&self.image_model, "generateContent");
        let resp = self.post_json(&url, &body).await?;
        let (_mime, data) = first_inline_data(&resp)
            .ok_or_else(|| BackendError::MissingOutput("image".to_string()))?;
        Ok(BASE64.decode(data)?)
    }
}

#[async_trait]
impl VideoBackend for GeminiClient {
    async fn generate_video(&self, request: &VideoRequest<'_>) -> Result<Vec<u8>, BackendError> {
        let mut parameters = json!({
            "aspectRatio": request.aspect_ratio,
            "durationSeconds": request.duration_seconds,
            "personGeneration": "allow_adult",
            "sampleCount": 1,
        });
        if !request.resolution.is_empty() {
            parameters["resolution"] = json!(request.resolution);
        }
        let body = json!({
            "instances": [{
                "prompt": request.prompt,
                "image": {
                    "bytesBase64Encoded": BASE64.encode(&request.image.data),
                    "mimeType": request.image.mime_type,
                },
            }],
            "parameters": parameters,
        });

        let url = self.model_url(&self.video_model, "predictLongRunning");
        let op = self.post_json(&url, &body).await?;
        let name = op
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| BackendError::MissingOutput("operation name".to_string()))?
            .to_string();
        logi(format!("Video job submitted: {}", name));

        let status_url = format!("{}/{}", self.api_base, name);
        let started = Instant::now();
        let mut status = op;
        loop {
            match operation_video_sample(&status)? {
                Some(VideoSample::Uri(uri)) => return self.download(&uri).await,
                Some(VideoSample::Inline(data)) => return Ok(BASE64.decode(data)?),
                None => {}
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(BackendError::Timeout { waited });
            }
            logi(format!(
                "Waiting for video generation ({}s elapsed)...",
                waited.as_secs()
            ));
            tokio::time::sleep(self.poll_interval.min(self.max_wait - waited)).await;
            status = self.get_json(&status_url).await?;
        }
    }
}

#[async_trait]
impl NarrationBackend for GeminiClient {
    async fn synthesize(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<Option<AudioClip>, BackendError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice_name },
                    },
                },
            },
        });

        let url = self.model_url(&self.tts_model, "generateContent");
        let resp = self.post_json(&url, &body).await?;
        match first_inline_data(&resp) {
            Some((mime_type, data)) => Ok(Some(AudioClip {
                mime_type,
                data: BASE64.decode(data)?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_wait_secs: u64) -> GeminiClient {
        let cfg = Config {
            api_key: "test-key".to_string(),
            api_base: server.uri(),
            video_poll_interval_secs: 1,
            video_max_wait_secs: max_wait_secs,
            ..Config::default()
        };
        GeminiClient::with_client(Client::new(), &cfg)
    }

    async fn submit_video(client: &GeminiClient) -> Result<Vec<u8>, BackendError> {
        let image = ImageInput::new("image/png", vec![1, 2, 3]);
        let request = VideoRequest {
            prompt: "slow push in",
            image: &image,
            duration_seconds: 8,
            aspect_ratio: "16:9",
            resolution: "1080p",
        };
        client.generate_video(&request).await
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "operations/op1" })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn finished_video_operation_downloads_sample() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op1",
                "done": true,
                "response": { "generateVideoResponse": { "generatedSamples": [
                    { "video": { "uri": format!("{}/files/clip.mp4", server.uri()) } }
                ] } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/clip.mp4"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = submit_video(&client_for(&server, 30)).await.unwrap();
        assert_eq!(bytes, b"mp4data");
    }

    #[tokio::test]
    async fn unfinished_video_operation_times_out() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "name": "operations/op1", "done": false })),
            )
            .expect(1..)
            .mount(&server)
            .await;

        let err = submit_video(&client_for(&server, 1)).await.unwrap_err();
        match err {
            BackendError::Timeout { waited } => assert!(waited >= Duration::from_secs(1)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn video_submit_error_body_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let err = submit_video(&client_for(&server, 30)).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 429, ref body } if body == "quota"));
    }

    #[test]
    fn text_parts_are_concatenated() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n[" }, { "text": "]\n```" }] }
            }]
        });
        assert_eq!(collect_text(&resp).unwrap(), "```json\n[]\n```");
    }

    #[test]
    fn empty_candidates_have_no_text() {
        assert!(collect_text(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn inline_data_is_found_after_text_parts() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here is your image" },
                    { "inlineData": { "mimeType": "image/png", "data": "AAEC" } }
                ] }
            }]
        });
        let (mime, data) = first_inline_data(&resp).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(BASE64.decode(data).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn error_body_is_summarised() {
        let body = json!({ "error": { "code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED" } });
        assert_eq!(api_error_message(&body).unwrap(), "quota");
        assert!(api_error_message(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn running_operation_has_no_sample() {
        let op = json!({ "name": "models/veo/operations/1" });
        assert_eq!(operation_video_sample(&op).unwrap(), None);
    }

    #[test]
    fn finished_operation_yields_uri() {
        let op = json!({
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://example.test/v.mp4" } }
            ] } }
        });
        assert_eq!(
            operation_video_sample(&op).unwrap(),
            Some(VideoSample::Uri("https://example.test/v.mp4".to_string()))
        );
    }

    #[test]
    fn failed_operation_is_an_api_error() {
        let op = json!({ "done": true, "error": { "code": 3, "message": "blocked" } });
        assert!(matches!(
            operation_video_sample(&op),
            Err(BackendError::Api(msg)) if msg.contains("blocked")
        ));
    }

    #[test]
    fn model_urls_join_base_and_method() {
        let cfg = Config {
            api_base: "https://example.test/v1beta/".to_string(),
            ..Config::default()
        };
        let client = GeminiClient::with_client(Client::new(), &cfg);
        assert_eq!(
            client.model_url("m", "generateContent"),
            "https://example.test/v1beta/models/m:generateContent"
        );
    }
}
