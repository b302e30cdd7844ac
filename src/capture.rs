use anyhow::{Context, Result};
use biogate_engine::CaptureSource;
use std::collections::VecDeque;
use std::path::PathBuf;

/// Serves pre-recorded feature buffers, one file per capture, in order.
pub struct FileCaptureSource {
    label: String,
    queue: VecDeque<PathBuf>,
}

impl FileCaptureSource {
    pub fn new(label: impl Into<String>, files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            label: label.into(),
            queue: files.into_iter().collect(),
        }
    }
}

impl CaptureSource for FileCaptureSource {
    fn open(&mut self) -> Result<()> {
        if let Some(missing) = self.queue.iter().find(|p| !p.exists()) {
            anyhow::bail!("{}: capture file {} not found", self.label, missing.display());
        }
        log::debug!("{}: {} capture file(s) queued", self.label, self.queue.len());
        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        let next = self
            .queue
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("{}: no more captures queued", self.label))?;
        std::fs::read(&next).with_context(|| format!("reading {}", next.display()))
    }

    fn release(&mut self) {
        self.queue.clear();
    }
}
