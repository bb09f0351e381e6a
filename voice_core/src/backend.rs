//! Speech engines the queue can drive.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;

/// Speaks one utterance. The future resolves when playback has finished;
/// dropping it must stop playback.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// Runs an external text-to-speech program with the utterance as its last
/// argument, e.g. `espeak-ng -v en` or `say -v Samantha`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Split a command line on whitespace.
    pub fn parse(command_line: &str) -> anyhow::Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("TTS command is empty");
        };
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SpeechBackend for CommandBackend {
    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }
}

/// Produces no audio; takes a fixed time per word.
#[derive(Debug, Clone)]
pub struct PacedBackend {
    per_word: Duration,
}

impl PacedBackend {
    pub fn new(per_word: Duration) -> Self {
        Self { per_word }
    }

    /// Roughly 150 words per minute.
    pub fn conversational() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait]
impl SpeechBackend for PacedBackend {
    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        let words = text.split_whitespace().count().max(1) as u32;
        tokio::time::sleep(self.per_word * words).await;
        Ok(())
    }
}
