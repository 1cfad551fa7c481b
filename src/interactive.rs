//! Line-oriented prompting for the interactive binary.

use crate::scene::CLIP_SECONDS;
use std::io::{self, BufRead, Write};

/// Durations above this many minutes need an explicit yes.
pub const CONFIRM_ABOVE_MINUTES: f64 = 30.0;

/// Parses a positive number of minutes.
pub fn parse_duration_minutes(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite() && *m > 0.0)
}

pub fn needs_confirmation(minutes: f64) -> bool {
    minutes > CONFIRM_ABOVE_MINUTES
}

/// Upper bound on clips per run, a little over 22 hours of video.
pub const MAX_CLIPS: usize = 10_000;

/// Whole clips that fit in `minutes`; `None` when not even one fits or the
/// count would exceed [`MAX_CLIPS`].
pub fn clips_for_minutes(minutes: f64) -> Option<usize> {
    let clips = (minutes * 60.0 / f64::from(CLIP_SECONDS)).floor();
    (1.0..=MAX_CLIPS as f64)
        .contains(&clips)
        .then_some(clips as usize)
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y")
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `question` and reads one line. End of input is an error so
    /// callers that loop cannot spin forever.
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    pub fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message)
    }

    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        Ok(is_yes(&self.ask(question)?))
    }

    pub fn story(&mut self) -> io::Result<String> {
        loop {
            let story = self.ask("Enter your story idea: ")?;
            if !story.is_empty() {
                return Ok(story);
            }
            self.say("Please enter a story idea.")?;
        }
    }

    /// Asks until the answer is a usable duration. Long videos must be
    /// confirmed, otherwise the question is asked again.
    pub fn duration(&mut self) -> io::Result<(f64, usize)> {
        loop {
            let answer = self.ask("Video duration in minutes (e.g. 1, 2.5): ")?;
            let Some(minutes) = parse_duration_minutes(&answer) else {
                self.say("Please enter a number greater than 0.")?;
                continue;
            };
            if needs_confirmation(minutes)
                && !self.confirm(&format!(
                    "{} minutes is a long video. Continue? (yes/no): ",
                    minutes
                ))?
            {
                continue;
            }
            match clips_for_minutes(minutes) {
                Some(clips) => return Ok((minutes, clips)),
                None if minutes * 60.0 < f64::from(CLIP_SECONDS) => self.say(&format!(
                    "That is shorter than one {}-second clip; try a longer duration.",
                    CLIP_SECONDS
                ))?,
                None => self.say(&format!(
                    "That is more than {} clips; try a shorter duration.",
                    MAX_CLIPS
                ))?,
            }
        }
    }
}
