use crate::foundation::core::FrameIndex;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// Default frame count: 4 seconds at 24 fps.
pub const DEFAULT_FRAME_COUNT: u64 = 96;

/// One frame of the fade: its index and how much of the color image it keeps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameDescriptor {
    pub index: FrameIndex,
    /// `1.0` is the untouched color image, `0.0` the fully desaturated one.
    pub mix: f64,
}

/// Mix factor of frame `index`: `1 - index / (frame_count - 1)`, or `1.0` for a single frame.
pub fn mix_factor(index: u64, frame_count: u64) -> GrayfadeResult<f64> {
    if frame_count == 0 {
        return Err(GrayfadeError::configuration("frame count must be >= 1"));
    }
    if index >= frame_count {
        return Err(GrayfadeError::invalid_argument(format!(
            "frame {index} out of range for {frame_count} frames"
        )));
    }
    Ok(unchecked_mix(index, frame_count))
}

fn unchecked_mix(index: u64, frame_count: u64) -> f64 {
    if frame_count == 1 {
        1.0
    } else {
        1.0 - index as f64 / (frame_count - 1) as f64
    }
}

/// Finite, restartable sequence of [`FrameDescriptor`]s in increasing index order.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    frame_count: u64,
    next: u64,
}

impl FrameSequence {
    pub fn new(frame_count: u64) -> GrayfadeResult<Self> {
        if frame_count == 0 {
            return Err(GrayfadeError::configuration("frame count must be >= 1"));
        }
        Ok(Self {
            frame_count,
            next: 0,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Rewind to frame 0.
    pub fn restart(&mut self) {
        self.next = 0;
    }
}

impl Iterator for FrameSequence {
    type Item = FrameDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.frame_count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(FrameDescriptor {
            index: FrameIndex(index),
            mix: unchecked_mix(index, self.frame_count),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.frame_count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FrameSequence {}
