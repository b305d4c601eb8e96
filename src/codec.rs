//! Image file boundary.
//!
//! In-memory color buffers are always RGB ordered: decoding converts whatever the file holds to
//! `Rgb8`, and the luma weights read channel 0 as red.

use std::path::Path;

use crate::buffer::{Channels, PixelBuffer};
use crate::foundation::core::Dims;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// Decode an image file into an RGB buffer.
pub fn decode(path: &Path) -> GrayfadeResult<PixelBuffer> {
    let img = image::open(path)
        .map_err(|e| GrayfadeError::decode(format!("open image '{}': {e}", path.display())))?;
    let rgb = img.to_rgb8();
    let dims = Dims::new(rgb.height() as usize, rgb.width() as usize);
    if dims.pixel_count() == 0 {
        return Err(GrayfadeError::decode(format!(
            "image '{}' has no pixels",
            path.display()
        )));
    }
    PixelBuffer::from_raw(dims, Channels::Rgb, rgb.into_raw())
}

/// Write `buffer` to `path`; the format follows the extension and falls back to PNG.
pub fn encode(path: &Path, buffer: &PixelBuffer) -> GrayfadeResult<()> {
    let (width, height) = wh(buffer).map_err(|e| GrayfadeError::encode(e.to_string()))?;
    let color = match buffer.channels() {
        Channels::Gray => image::ColorType::L8,
        Channels::Rgb => image::ColorType::Rgb8,
    };
    let format = image::ImageFormat::from_path(path).unwrap_or(image::ImageFormat::Png);
    image::save_buffer_with_format(path, buffer.as_bytes(), width, height, color, format)
        .map_err(|e| GrayfadeError::encode(format!("write image '{}': {e}", path.display())))
}

/// Bilinear resize of an RGB buffer to `size x size`; buffers already that size are cloned.
pub fn resize_square(buffer: &PixelBuffer, size: u32) -> GrayfadeResult<PixelBuffer> {
    if size == 0 {
        return Err(GrayfadeError::configuration("image size must be >= 1"));
    }
    if buffer.channels() != Channels::Rgb {
        return Err(GrayfadeError::invalid_argument(
            "resize_square expects a 3-channel buffer",
        ));
    }
    let (width, height) = wh(buffer)?;
    if width == size && height == size {
        return Ok(buffer.clone());
    }

    let img = image::RgbImage::from_raw(width, height, buffer.as_bytes().to_vec())
        .ok_or_else(|| GrayfadeError::invalid_argument("buffer does not match its dimensions"))?;
    let resized =
        image::imageops::resize(&img, size, size, image::imageops::FilterType::Triangle);
    PixelBuffer::from_raw(
        Dims::new(size as usize, size as usize),
        Channels::Rgb,
        resized.into_raw(),
    )
}

fn wh(buffer: &PixelBuffer) -> GrayfadeResult<(u32, u32)> {
    let width = u32::try_from(buffer.cols())
        .map_err(|_| GrayfadeError::invalid_argument("image width exceeds u32"))?;
    let height = u32::try_from(buffer.rows())
        .map_err(|_| GrayfadeError::invalid_argument("image height exceeds u32"))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from("target").join("codec_tests").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn png_round_trip_keeps_rgb_order() {
        let dir = scratch_dir("round_trip");
        let path = dir.join("px.png");
        let buf = PixelBuffer::from_raw(
            Dims::new(1, 2),
            Channels::Rgb,
            vec![255, 0, 0, 0, 0, 255],
        )
        .unwrap();
        encode(&path, &buf).unwrap();
        assert_eq!(decode(&path).unwrap(), buf);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = decode(Path::new("target/codec_tests/does-not-exist.png")).unwrap_err();
        assert!(matches!(err, GrayfadeError::Decode(_)));
    }

    #[test]
    fn unwritable_path_is_an_encode_error() {
        let dir = scratch_dir("unwritable");
        let path = dir.join("missing-subdir").join("x.png");
        let buf = PixelBuffer::new(Dims::new(1, 1), Channels::Rgb);
        let err = encode(&path, &buf).unwrap_err();
        assert!(matches!(err, GrayfadeError::Encode(_)));
    }

    #[test]
    fn resize_square_changes_dimensions_only_when_needed() {
        let buf = PixelBuffer::from_raw(Dims::new(2, 4), Channels::Rgb, vec![128; 24]).unwrap();
        let out = resize_square(&buf, 3).unwrap();
        assert_eq!(out.dims(), Dims::new(3, 3));
        assert!(out.as_bytes().iter().all(|&b| b == 128));

        let square = PixelBuffer::new(Dims::new(3, 3), Channels::Rgb);
        assert_eq!(resize_square(&square, 3).unwrap(), square);
        assert!(resize_square(&square, 0).is_err());
    }
}
