use rayon::prelude::*;

use crate::buffer::{Channels, PixelBuffer};
use crate::foundation::core::{Exec, RowRange};
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// `round(color * p + gray * (1 - p))` with ties to even, clamped to a byte.
pub fn mix(color: u8, gray: u8, p: f64) -> u8 {
    let v = f64::from(color) * p + f64::from(gray) * (1.0 - p);
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

fn blend_row(color: &[u8], gray: &[u8], p: f64, dst: &mut [u8]) {
    for ((out, &c), &g) in dst.iter_mut().zip(color).zip(gray) {
        *out = mix(c, g, p);
    }
}

/// Blend rows `range` of `color` and `gray3` at mix factor `p` into `out`.
///
/// `out` holds exactly the rows of `range` of a 3-channel image with the inputs' width.
pub fn blend_region(
    color: &PixelBuffer,
    gray3: &PixelBuffer,
    p: f64,
    range: RowRange,
    out: &mut [u8],
    exec: Exec,
) -> GrayfadeResult<()> {
    if !p.is_finite() {
        return Err(GrayfadeError::invalid_argument(format!(
            "mix factor must be finite, got {p}"
        )));
    }
    if color.channels() != Channels::Rgb {
        return Err(GrayfadeError::invalid_argument(
            "blend expects a 3-channel color buffer",
        ));
    }
    gray3.ensure_shape(color.dims(), Channels::Rgb, "3-channel grayscale")?;

    let color_rows = color.rows_slice(range)?;
    let gray_rows = gray3.rows_slice(range)?;
    if out.len() != color_rows.len() {
        return Err(GrayfadeError::invalid_argument(format!(
            "blend output for {} rows needs {} bytes, got {}",
            range.len(),
            color_rows.len(),
            out.len()
        )));
    }

    let row_bytes = color.row_bytes();
    if row_bytes == 0 {
        return Ok(());
    }
    match exec {
        Exec::Sequential => out
            .chunks_exact_mut(row_bytes)
            .zip(color_rows.chunks_exact(row_bytes))
            .zip(gray_rows.chunks_exact(row_bytes))
            .for_each(|((dst, c), g)| blend_row(c, g, p, dst)),
        Exec::Parallel => out
            .par_chunks_exact_mut(row_bytes)
            .zip(color_rows.par_chunks_exact(row_bytes))
            .zip(gray_rows.par_chunks_exact(row_bytes))
            .for_each(|((dst, c), g)| blend_row(c, g, p, dst)),
    }
    Ok(())
}

/// Write the blended rows `range` into the same rows of `dst`.
pub fn blend_rows(
    color: &PixelBuffer,
    gray3: &PixelBuffer,
    p: f64,
    range: RowRange,
    dst: &mut PixelBuffer,
    exec: Exec,
) -> GrayfadeResult<()> {
    dst.ensure_shape(color.dims(), Channels::Rgb, "blend destination")?;
    let out = dst.rows_slice_mut(range)?;
    blend_region(color, gray3, p, range, out, exec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Dims;

    fn pair() -> (PixelBuffer, PixelBuffer) {
        let dims = Dims::new(4, 5);
        let color = (0..dims.pixel_count() * 3)
            .map(|i| (i * 37 % 256) as u8)
            .collect();
        let gray = (0..dims.pixel_count() * 3)
            .map(|i| (i * 11 % 256) as u8)
            .collect();
        (
            PixelBuffer::from_raw(dims, Channels::Rgb, color).unwrap(),
            PixelBuffer::from_raw(dims, Channels::Rgb, gray).unwrap(),
        )
    }

    fn blend_all(color: &PixelBuffer, gray: &PixelBuffer, p: f64) -> PixelBuffer {
        let mut dst = PixelBuffer::new(color.dims(), Channels::Rgb);
        let all = RowRange::new(0, color.rows()).unwrap();
        blend_rows(color, gray, p, all, &mut dst, Exec::Sequential).unwrap();
        dst
    }

    #[test]
    fn p_1_is_color_and_p_0_is_gray() {
        let (color, gray) = pair();
        assert_eq!(blend_all(&color, &gray, 1.0), color);
        assert_eq!(blend_all(&color, &gray, 0.0), gray);
    }

    #[test]
    fn mix_rounds_ties_to_even() {
        assert_eq!(mix(0, 149, 0.5), 74);
        assert_eq!(mix(0, 29, 0.5), 14);
        assert_eq!(mix(255, 76, 0.5), 166);
        assert_eq!(mix(0, 151, 0.5), 76);
        assert_eq!(mix(100, 140, 0.5), 120);
        assert_eq!(mix(0, 150, 0.3), 105);
    }

    #[test]
    fn out_of_range_mix_factors_clamp() {
        assert_eq!(mix(255, 0, 2.0), 255);
        assert_eq!(mix(0, 255, 2.0), 0);
        assert_eq!(mix(255, 0, -1.0), 0);
    }

    #[test]
    fn blend_rejects_bad_rows_and_factors() {
        let (color, gray) = pair();
        let mut dst = PixelBuffer::new(color.dims(), Channels::Rgb);
        let beyond = RowRange::new(2, 5).unwrap();
        let err = blend_rows(&color, &gray, 0.5, beyond, &mut dst, Exec::Sequential).unwrap_err();
        assert!(matches!(err, GrayfadeError::InvalidArgument(_)));

        let all = RowRange::new(0, 4).unwrap();
        assert!(blend_rows(&color, &gray, f64::NAN, all, &mut dst, Exec::Sequential).is_err());
    }

    #[test]
    fn blend_rows_leaves_other_rows_untouched() {
        let (color, gray) = pair();
        let mut dst = PixelBuffer::from_raw(color.dims(), Channels::Rgb, vec![9; 60]).unwrap();
        blend_rows(&color, &gray, 1.0, RowRange::new(1, 2).unwrap(), &mut dst, Exec::Sequential)
            .unwrap();
        assert!(dst.as_bytes()[..15].iter().all(|&b| b == 9));
        assert_eq!(&dst.as_bytes()[15..30], &color.as_bytes()[15..30]);
        assert!(dst.as_bytes()[30..].iter().all(|&b| b == 9));
    }

    #[test]
    fn parallel_matches_sequential() {
        let (color, gray) = pair();
        let all = RowRange::new(0, 4).unwrap();
        let mut a = vec![0; 60];
        let mut b = vec![0; 60];
        blend_region(&color, &gray, 0.37, all, &mut a, Exec::Sequential).unwrap();
        blend_region(&color, &gray, 0.37, all, &mut b, Exec::Parallel).unwrap();
        assert_eq!(a, b);
    }
}
