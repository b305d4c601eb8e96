use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// 0-based index of a frame in the output sequence.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Half-open row interval `[start, end)` assigned to one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RowRange {
    /// Inclusive first row.
    pub start: usize,
    /// Exclusive end row.
    pub end: usize,
}

impl RowRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: usize, end: usize) -> GrayfadeResult<Self> {
        if start > end {
            return Err(GrayfadeError::invalid_argument(format!(
                "row range start {start} must be <= end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of rows in the range.
    pub fn len(self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    pub fn contains(self, row: usize) -> bool {
        self.start <= row && row < self.end
    }

    /// Byte span of this range inside a row-major buffer whose rows are `row_bytes` long.
    pub fn byte_span(self, row_bytes: usize) -> std::ops::Range<usize> {
        self.start * row_bytes..self.end * row_bytes
    }

    /// Fail unless the range lies within `[0, rows)`.
    pub fn check_within(self, rows: usize) -> GrayfadeResult<()> {
        if self.end > rows {
            return Err(GrayfadeError::invalid_argument(format!(
                "row range [{}, {}) exceeds image height {rows}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// How a row kernel walks its rows.
///
/// `Parallel` splits rows across the rayon pool the caller is running in (see
/// `rayon::ThreadPool::install`); the output is byte-identical to `Sequential`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Exec {
    #[default]
    Sequential,
    Parallel,
}

/// Image dimensions shared by every buffer derived from one source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dims {
    pub rows: usize,
    pub cols: usize,
}

impl Dims {
    /// Wire size of [`Dims::to_le_bytes`].
    pub const WIRE_LEN: usize = 8;

    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn pixel_count(self) -> usize {
        self.rows * self.cols
    }

    /// `rows` then `cols`, each as little-endian `u32`.
    pub fn to_le_bytes(self) -> GrayfadeResult<[u8; Self::WIRE_LEN]> {
        let rows = u32::try_from(self.rows)
            .map_err(|_| GrayfadeError::configuration("image height exceeds u32"))?;
        let cols = u32::try_from(self.cols)
            .map_err(|_| GrayfadeError::configuration("image width exceeds u32"))?;
        let mut out = [0u8; Self::WIRE_LEN];
        out[..4].copy_from_slice(&rows.to_le_bytes());
        out[4..].copy_from_slice(&cols.to_le_bytes());
        Ok(out)
    }

    pub fn from_le_bytes(bytes: &[u8]) -> GrayfadeResult<Self> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(GrayfadeError::transport(format!(
                "dimension header must be {} bytes, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        let rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let cols = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            rows: rows as usize,
            cols: cols as usize,
        })
    }
}
