use crate::config::Config;
use crate::error::{BackendError, Result};
use crate::layout::{OutputLayout, write_artifact};
use crate::scene::ClipBundle;
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

const MIX_FILTER: &str = "[1:a][2:a]amix=inputs=2:duration=longest[aout]";

pub(crate) async fn run_cmd(args: &[String]) -> std::result::Result<(), BackendError> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };

    let output = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| BackendError::Command(format!("failed to start {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let skip = stderr.chars().count().saturating_sub(400);
        let tail: String = stderr.chars().skip(skip).collect();
        return Err(BackendError::Command(format!(
            "{} exited with {}: {}",
            program, output.status, tail
        )));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(ffprobe_bin: &str, path: &Path) -> std::result::Result<f64, BackendError> {
    let output = Command::new(ffprobe_bin)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| BackendError::Command(format!("ffprobe execution failed: {}", e)))?;

    if !output.status.success() {
        return Err(BackendError::Command("ffprobe failed".to_string()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(BackendError::Command(format!("invalid duration {:?}", text)));
    }
    Ok(duration)
}

/// Quotes one argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// A runnable `sh` script for `args`, kept as the manual fallback.
pub fn render_script(args: &[String]) -> String {
    let line = args
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    format!("#!/bin/sh\nset -e\n{}\n", line)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to merge; no script written, nothing run.
    Skipped,
    Merged { output: PathBuf, script: PathBuf },
    /// The command failed or never ran; the script is left for a manual run.
    Deferred { script: PathBuf, reason: String },
}

impl MergeOutcome {
    pub fn output(&self) -> Option<&Path> {
        match self {
            MergeOutcome::Merged { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Mixes each clip's audio onto its video and joins the clips.
#[derive(Debug, Clone)]
pub struct ClipAssembler {
    layout: OutputLayout,
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl ClipAssembler {
    pub fn new(layout: OutputLayout, cfg: &Config) -> Self {
        Self {
            layout,
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
            ffprobe_bin: cfg.ffprobe_bin.clone(),
        }
    }

    pub fn mix_args(&self, video: &Path, narration: &Path, soundfx: &Path, out: &Path) -> Vec<String> {
        vec![
            self.ffmpeg_bin.clone(),
            "-i".to_string(),
            absolute(video).display().to_string(),
            "-i".to_string(),
            absolute(narration).display().to_string(),
            "-i".to_string(),
            absolute(soundfx).display().to_string(),
            "-filter_complex".to_string(),
            MIX_FILTER.to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-y".to_string(),
            absolute(out).display().to_string(),
        ]
    }

    pub fn concat_args(&self, list_txt: &Path, out: &Path) -> Vec<String> {
        vec![
            self.ffmpeg_bin.clone(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            absolute(list_txt).display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            absolute(out).display().to_string(),
        ]
    }

    /// Writes the script, then tries to run it.
    async fn persist_and_run(&self, args: &[String], script: PathBuf, out: PathBuf) -> Result<MergeOutcome> {
        write_artifact(&script, render_script(args)).await?;

        let reason = match run_cmd(args).await {
            Ok(()) => {
                if is_file(&out).await {
                    return Ok(MergeOutcome::Merged { output: out, script });
                }
                format!("{} finished without producing {}", args[0], out.display())
            }
            Err(err) => err.to_string(),
        };

        logw(format!("Command saved to: {}", script.display()));
        logw(format!("Run manually: sh {}", script.display()));
        Ok(MergeOutcome::Deferred { script, reason })
    }

    /// Mixes narration and sound effects under the clip's video track.
    ///
    /// A missing or absent video skips the clip without touching disk. Missing
    /// audio inputs are pointed at their expected locations so the saved
    /// script works once those files are supplied.
    pub async fn merge_clip(
        &self,
        index: usize,
        video: Option<&Path>,
        narration: Option<&Path>,
        soundfx: Option<&Path>,
    ) -> Result<MergeOutcome> {
        let video = match video {
            Some(v) if v.is_file() => v,
            _ => {
                logw(format!("Video not yet generated, skipping merge for clip {}", index));
                return Ok(MergeOutcome::Skipped);
            }
        };

        logi(format!("Merging media for clip {}...", index));
        let narration = narration
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.narration_audio(index));
        let soundfx = soundfx
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.soundfx_audio(index));
        let out = self.layout.merged_clip(index);
        let args = self.mix_args(video, &narration, &soundfx, &out);

        let outcome = self
            .persist_and_run(&args, self.layout.merge_script(index), out)
            .await?;
        if let MergeOutcome::Merged { output, .. } = &outcome {
            logok(format!("Clip merged: {}", self.layout.display(output)));
        }
        Ok(outcome)
    }

    pub async fn merge_bundle(&self, bundle: &ClipBundle) -> Result<MergeOutcome> {
        self.merge_clip(
            bundle.index,
            bundle.video.as_deref(),
            bundle.narration.as_deref(),
            bundle.soundfx.as_deref(),
        )
        .await
    }

    /// Concatenates the clips that exist, in the order given.
    pub async fn merge_all(&self, clips: &[PathBuf]) -> Result<MergeOutcome> {
        let mut valid = Vec::with_capacity(clips.len());
        for clip in clips {
            if is_file(clip).await {
                valid.push(absolute(clip));
            }
        }

        if valid.is_empty() {
            logw("No valid clips to merge yet");
            return Ok(MergeOutcome::Skipped);
        }

        logi(format!("Merging {} clips into the final video...", valid.len()));
        let list = self.layout.concat_list();
        let manifest: String = valid
            .iter()
            .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', r"'\''")))
            .collect();
        write_artifact(&list, manifest).await?;

        let out = self.layout.final_video();
        let args = self.concat_args(&list, &out);
        let outcome = self
            .persist_and_run(&args, self.layout.final_merge_script(), out)
            .await?;

        if let MergeOutcome::Merged { output, .. } = &outcome {
            logok(format!("Final video created: {}", self.layout.display(output)));
            match ffprobe_duration_seconds(&self.ffprobe_bin, output).await {
                Ok(dur) => logok(format!("Final duration: {:.2} seconds", dur)),
                Err(err) => logw(format!("Could not probe final duration: {}", err)),
            }
        }
        Ok(outcome)
    }

    /// Encodes raw 16-bit mono PCM to mp3.
    pub async fn transcode_pcm(
        &self,
        pcm: &Path,
        sample_rate: u32,
        out: &Path,
    ) -> std::result::Result<(), BackendError> {
        let args = vec![
            self.ffmpeg_bin.clone(),
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            pcm.display().to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            out.display().to_string(),
        ];
        run_cmd(&args).await?;
        if !is_file(out).await {
            return Err(BackendError::Command(format!("{} was not produced", out.display())));
        }
        Ok(())
    }
}
