use rayon::prelude::*;

use crate::buffer::{Channels, PixelBuffer};
use crate::foundation::core::{Exec, RowRange};
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// BT.601 luma, `floor(0.299 R + 0.587 G + 0.114 B)`, evaluated exactly in integers.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    // 299 + 587 + 114 = 1000, so the quotient never exceeds 255.
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
}

fn luma_row(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.chunks_exact(3).zip(dst.iter_mut()) {
        *out = luma(px[0], px[1], px[2]);
    }
}

/// Convert rows `range` of `color` into `out`, which holds exactly those rows of a 1-channel image.
pub fn luma_region(
    color: &PixelBuffer,
    range: RowRange,
    out: &mut [u8],
    exec: Exec,
) -> GrayfadeResult<()> {
    if color.channels() != Channels::Rgb {
        return Err(GrayfadeError::invalid_argument(
            "luma conversion expects a 3-channel source",
        ));
    }
    let src = color.rows_slice(range)?;
    let cols = color.cols();
    if out.len() != range.len() * cols {
        return Err(GrayfadeError::invalid_argument(format!(
            "luma output for {} rows of width {cols} needs {} bytes, got {}",
            range.len(),
            range.len() * cols,
            out.len()
        )));
    }
    if cols == 0 {
        return Ok(());
    }

    let src_row_bytes = color.row_bytes();
    match exec {
        Exec::Sequential => out
            .chunks_exact_mut(cols)
            .zip(src.chunks_exact(src_row_bytes))
            .for_each(|(dst, src)| luma_row(src, dst)),
        Exec::Parallel => out
            .par_chunks_exact_mut(cols)
            .zip(src.par_chunks_exact(src_row_bytes))
            .for_each(|(dst, src)| luma_row(src, dst)),
    }
    Ok(())
}

/// Fill rows `range` of `gray` from the same rows of `color`; other rows are left untouched.
pub fn convert_rows(
    color: &PixelBuffer,
    gray: &mut PixelBuffer,
    range: RowRange,
    exec: Exec,
) -> GrayfadeResult<()> {
    gray.ensure_shape(color.dims(), Channels::Gray, "grayscale destination")?;
    let dst = gray.rows_slice_mut(range)?;
    luma_region(color, range, dst, exec)
}

/// Whole-image conversion.
pub fn to_grayscale(color: &PixelBuffer, exec: Exec) -> GrayfadeResult<PixelBuffer> {
    let mut gray = PixelBuffer::new(color.dims(), Channels::Gray);
    let all = RowRange::new(0, color.rows())?;
    convert_rows(color, &mut gray, all, exec)?;
    Ok(gray)
}
