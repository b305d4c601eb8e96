use std::path::PathBuf;

use crate::buffer::PixelBuffer;
use crate::codec;
use crate::foundation::core::Dims;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};
use crate::sequence::FrameDescriptor;

/// Configuration handed to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Dimensions shared by every frame.
    pub dims: Dims,
    /// Number of frames that will be pushed.
    pub frame_count: u64,
}

/// Consumer of assembled frames.
///
/// Ordering contract: `push_frame` is called in strictly increasing frame index order.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> GrayfadeResult<()>;
    /// Push one complete frame.
    fn push_frame(&mut self, frame: FrameDescriptor, buffer: &PixelBuffer) -> GrayfadeResult<()>;
    /// Called once after the last frame is pushed.
    fn end(&mut self) -> GrayfadeResult<()>;
}

/// In-memory sink for tests and timing runs.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameDescriptor, PixelBuffer)>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Frames in the order they were pushed.
    pub fn frames(&self) -> &[(FrameDescriptor, PixelBuffer)] {
        &self.frames
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> GrayfadeResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameDescriptor, buffer: &PixelBuffer) -> GrayfadeResult<()> {
        self.frames.push((frame, buffer.clone()));
        Ok(())
    }

    fn end(&mut self) -> GrayfadeResult<()> {
        Ok(())
    }
}

/// Where [`PngSequenceSink`] writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOpts {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for OutputOpts {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: "frame".to_owned(),
        }
    }
}

/// `<prefix>_<index>.png`, the index zero-padded to the width of the last index.
pub fn frame_file_name(prefix: &str, index: u64, frame_count: u64) -> String {
    let width = frame_count.saturating_sub(1).max(1).to_string().len();
    format!("{prefix}_{index:0width$}.png")
}

/// Writes every frame as its own PNG file.
#[derive(Debug)]
pub struct PngSequenceSink {
    opts: OutputOpts,
    frame_count: u64,
    written: Vec<PathBuf>,
}

impl PngSequenceSink {
    pub fn new(opts: OutputOpts) -> Self {
        Self {
            opts,
            frame_count: 0,
            written: Vec::new(),
        }
    }

    /// Paths written so far, in frame order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn begin(&mut self, cfg: SinkConfig) -> GrayfadeResult<()> {
        std::fs::create_dir_all(&self.opts.dir).map_err(|e| {
            GrayfadeError::encode(format!(
                "create output dir '{}': {e}",
                self.opts.dir.display()
            ))
        })?;
        self.frame_count = cfg.frame_count;
        self.written.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameDescriptor, buffer: &PixelBuffer) -> GrayfadeResult<()> {
        let name = frame_file_name(&self.opts.prefix, frame.index.0, self.frame_count);
        let path = self.opts.dir.join(name);
        codec::encode(&path, buffer)?;
        tracing::debug!(path = %path.display(), "wrote frame");
        self.written.push(path);
        Ok(())
    }

    fn end(&mut self) -> GrayfadeResult<()> {
        Ok(())
    }
}
