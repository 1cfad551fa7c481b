pub mod api;
pub mod assets;
pub mod config;
pub mod detailer;
pub mod error;
pub mod expander;
pub mod extract;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod interactive;
pub mod layout;
pub mod scene;

pub use config::Config;
pub use error::{BackendError, ParseError, PipelineError};
pub use generator::{RunMode, RunReport, SceneSource, StoryPipeline, StoryPlan, StoryRequest};

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("[{}] {}", tag, message),
        "FAIL" => tracing::error!("[{}] {}", tag, message),
        _ => tracing::info!("[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    logv("FAIL", message.as_ref());
}
