//! Where every artifact of a run lives, relative to the output root.
//!
//! The tree doubles as the manual-recovery surface: when a backend call
//! fails the prompt lands next to where the media would have been.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SUBDIRS: &[&str] = &["images", "videos", "narration", "soundfx", "prompts", "final"];

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        SUBDIRS.iter().map(|d| self.root.join(d)).collect()
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn image(&self, index: usize) -> PathBuf {
        self.dir("images").join(format!("clip_{index:02}.png"))
    }

    pub fn image_prompt(&self, index: usize) -> PathBuf {
        self.dir("images").join(format!("clip_{index:02}_prompt.txt"))
    }

    pub fn video(&self, index: usize) -> PathBuf {
        self.dir("videos").join(format!("clip_{index:02}.mp4"))
    }

    pub fn video_prompt(&self, index: usize) -> PathBuf {
        self.dir("videos").join(format!("clip_{index:02}_prompt.txt"))
    }

    pub fn narration_audio(&self, index: usize) -> PathBuf {
        self.dir("narration").join(format!("narration_{index:02}.mp3"))
    }

    pub fn narration_text(&self, index: usize) -> PathBuf {
        self.dir("narration").join(format!("narration_{index:02}.txt"))
    }

    /// Not produced by the pipeline; dropped in by hand for the merge script.
    pub fn soundfx_audio(&self, index: usize) -> PathBuf {
        self.dir("soundfx").join(format!("soundfx_{index:02}.mp3"))
    }

    pub fn soundfx_description(&self, index: usize) -> PathBuf {
        self.dir("soundfx")
            .join(format!("soundfx_{index:02}_description.txt"))
    }

    pub fn scene_prompt(&self, index: usize, label: &str) -> PathBuf {
        self.dir("prompts")
            .join(format!("scene_{index:02}_{label}.txt"))
    }

    pub fn scene_json(&self, index: usize) -> PathBuf {
        self.dir("prompts").join(format!("scene_{index:02}.json"))
    }

    pub fn merged_clip(&self, index: usize) -> PathBuf {
        self.dir("final").join(format!("merged_clip_{index:02}.mp4"))
    }

    pub fn merge_script(&self, index: usize) -> PathBuf {
        self.dir("final").join(format!("merge_cmd_{index:02}.sh"))
    }

    pub fn concat_list(&self) -> PathBuf {
        self.dir("final").join("concat_list.txt")
    }

    pub fn final_video(&self) -> PathBuf {
        self.dir("final").join("final_story_video.mp4")
    }

    pub fn final_merge_script(&self) -> PathBuf {
        self.dir("final").join("final_merge_cmd.sh")
    }

    pub fn story_structure(&self) -> PathBuf {
        self.root.join("story_structure.json")
    }

    pub fn expanded_story(&self) -> PathBuf {
        self.root.join("expanded_story.json")
    }

    pub fn all_scene_prompts(&self) -> PathBuf {
        self.root.join("all_scene_prompts.json")
    }

    pub fn reference_analysis(&self) -> PathBuf {
        self.root.join("reference_analysis.json")
    }

    /// Prompt files and command scripts left behind for manual completion.
    pub fn recovery_artifacts(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_recovery_artifact(p))
            .collect();
        out.sort();
        out
    }

    /// `path` relative to the output root, for log lines.
    pub fn display(&self, path: &Path) -> String {
        pathdiff::diff_paths(path, &self.root)
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }
}

/// Writes an artifact, creating its directory if a previous step removed it.
pub(crate) async fn write_artifact(path: &Path, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}

pub(crate) async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    write_artifact(path, text).await
}

fn is_recovery_artifact(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let in_dir = |dir: &str| {
        path.parent()
            .and_then(|p| p.file_name())
            .is_some_and(|n| n == dir)
    };

    (name.ends_with("_prompt.txt") && (in_dir("images") || in_dir("videos")))
        || (name.starts_with("narration_") && name.ends_with(".txt"))
        || (name.ends_with(".sh") && in_dir("final"))
}
