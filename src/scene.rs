use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Every clip covers this many seconds of the finished story.
pub const CLIP_SECONDS: u32 = 8;

/// A scene as planned by the expander: just enough to write prompts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStub {
    #[serde(default)]
    pub index: usize,
    pub title: String,
    pub description: String,
}

impl SceneStub {
    pub fn new(index: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Renumbers stubs 1..N in their current order.
pub fn reindex(stubs: Vec<SceneStub>) -> Vec<SceneStub> {
    stubs
        .into_iter()
        .enumerate()
        .map(|(i, stub)| SceneStub { index: i + 1, ..stub })
        .collect()
}

/// A stub plus everything the detailer wrote for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePackage {
    pub index: usize,
    pub title: String,
    pub description: String,
    pub image_prompt: String,
    pub video_prompt: String,
    pub narration_text: String,
    pub voice_direction: String,
    pub soundfx_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Narration,
    SoundFx,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Narration => "narration",
            AssetKind::SoundFx => "soundfx",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub kind: AssetKind,
    pub index: usize,
    pub status: GenerationStatus,
    pub artifact: Option<PathBuf>,
    pub fallback: Option<PathBuf>,
}

impl GenerationResult {
    pub fn ok(kind: AssetKind, index: usize, artifact: PathBuf) -> Self {
        Self {
            kind,
            index,
            status: GenerationStatus::Ok,
            artifact: Some(artifact),
            fallback: None,
        }
    }

    pub fn failed(kind: AssetKind, index: usize, fallback: PathBuf) -> Self {
        Self {
            kind,
            index,
            status: GenerationStatus::Failed,
            artifact: None,
            fallback: Some(fallback),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == GenerationStatus::Ok
    }
}

/// The media for one scene, as far as it got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipBundle {
    pub index: usize,
    pub video: Option<PathBuf>,
    pub narration: Option<PathBuf>,
    pub soundfx: Option<PathBuf>,
}

impl ClipBundle {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn can_merge(&self) -> bool {
        self.video.as_ref().is_some_and(|p| p.is_file())
    }
}
