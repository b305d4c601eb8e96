use crate::foundation::core::{Dims, RowRange};
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// Bytes per picture element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Channels {
    /// One luma byte.
    Gray,
    /// Three bytes in R, G, B order.
    Rgb,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
        }
    }
}

/// Dense row-major pixel buffer.
///
/// `data.len() == rows * cols * channels` is checked at construction and kept by every mutator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    dims: Dims,
    channels: Channels,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Zero-filled buffer.
    pub fn new(dims: Dims, channels: Channels) -> Self {
        Self {
            dims,
            channels,
            data: vec![0; dims.pixel_count() * channels.count()],
        }
    }

    /// Wrap raw bytes, checking their length against `dims` and `channels`.
    pub fn from_raw(dims: Dims, channels: Channels, data: Vec<u8>) -> GrayfadeResult<Self> {
        let expected = dims.pixel_count() * channels.count();
        if data.len() != expected {
            return Err(GrayfadeError::invalid_argument(format!(
                "{}x{} {:?} buffer needs {expected} bytes, got {}",
                dims.rows,
                dims.cols,
                channels,
                data.len()
            )));
        }
        Ok(Self {
            dims,
            channels,
            data,
        })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn rows(&self) -> usize {
        self.dims.rows
    }

    pub fn cols(&self) -> usize {
        self.dims.cols
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Length of one row in bytes.
    pub fn row_bytes(&self) -> usize {
        self.dims.cols * self.channels.count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of the rows in `range`.
    pub fn rows_slice(&self, range: RowRange) -> GrayfadeResult<&[u8]> {
        range.check_within(self.dims.rows)?;
        Ok(&self.data[range.byte_span(self.row_bytes())])
    }

    /// Mutable bytes of the rows in `range`; nothing outside it is reachable.
    pub fn rows_slice_mut(&mut self, range: RowRange) -> GrayfadeResult<&mut [u8]> {
        range.check_within(self.dims.rows)?;
        let span = range.byte_span(self.row_bytes());
        Ok(&mut self.data[span])
    }

    /// Pixel at `(row, col)` as a channel slice.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[u8]> {
        if row >= self.dims.rows || col >= self.dims.cols {
            return None;
        }
        let n = self.channels.count();
        let at = (row * self.dims.cols + col) * n;
        Some(&self.data[at..at + n])
    }

    /// Replicate a gray buffer's value into all three channels.
    pub fn expand_gray_to_rgb(&self) -> GrayfadeResult<PixelBuffer> {
        if self.channels != Channels::Gray {
            return Err(GrayfadeError::invalid_argument(
                "expand_gray_to_rgb expects a 1-channel buffer",
            ));
        }
        let mut data = Vec::with_capacity(self.data.len() * 3);
        for &g in &self.data {
            data.extend_from_slice(&[g, g, g]);
        }
        Ok(PixelBuffer {
            dims: self.dims,
            channels: Channels::Rgb,
            data,
        })
    }

    pub(crate) fn ensure_shape(&self, dims: Dims, channels: Channels, what: &str) -> GrayfadeResult<()> {
        if self.dims != dims || self.channels != channels {
            return Err(GrayfadeError::invalid_argument(format!(
                "{what} must be {}x{} {:?}, got {}x{} {:?}",
                dims.rows, dims.cols, channels, self.dims.rows, self.dims.cols, self.channels
            )));
        }
        Ok(())
    }
}
