//! Grayscale conversion and downscaling for e-ink targets.
//!
//! Images are decoded with the auto-detecting decoder (PNG, JPEG, GIF, and
//! WebP are enabled), converted to 16-bit grayscale, optionally downscaled
//! with area-weighted resampling, and re-encoded as JPEG.

use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, ImageResult, Luma};

/// 16-bit grayscale pixel buffer.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Decode raw image data into 16-bit grayscale.
///
/// The format is detected from the payload's magic bytes. The standard
/// luminance mapping is applied per pixel.
pub fn decode(data: &[u8]) -> ImageResult<Gray16Image> {
    Ok(image::load_from_memory(data)?.to_luma16())
}

/// Downscale `img` to fit in `fit`x`fit`, preserving the aspect ratio.
///
/// Returns the image unchanged when `fit` is 0 or the image already fits.
/// Resampling is area-weighted: every source pixel a destination pixel
/// covers contributes in proportion to the covered fraction, with boundary
/// columns/rows weighted `floor(min+1)-min` and `max-floor(max)`.
pub fn downscale(img: Gray16Image, fit: u32) -> Gray16Image {
    if fit == 0 {
        return img;
    }
    let (width, height) = img.dimensions();
    let ratio = f64::min(
        1.0,
        f64::min(fit as f64 / width as f64, fit as f64 / height as f64),
    );
    if ratio >= 1.0 {
        return img;
    }
    let new_width = (width as f64 * ratio).round() as u32;
    let new_height = (height as f64 * ratio).round() as u32;

    // Per-column and per-row source spans are computed once.
    let x_spans: Vec<Span> = (0..new_width).map(|x| span_weights(x, ratio, width)).collect();
    let y_spans: Vec<Span> = (0..new_height)
        .map(|y| span_weights(y, ratio, height))
        .collect();

    let mut out = Gray16Image::new(new_width, new_height);
    for (x, x_span) in x_spans.iter().enumerate() {
        for (y, y_span) in y_spans.iter().enumerate() {
            let mut sum = 0.0;
            let mut total = 0.0;
            for (i, wx) in x_span.weights.iter().enumerate() {
                for (j, wy) in y_span.weights.iter().enumerate() {
                    let weight = wx * wy;
                    let source = img.get_pixel(x_span.start + i as u32, y_span.start + j as u32);
                    total += weight;
                    sum += source[0] as f64 * weight;
                }
            }
            let value = if total > 0.0 {
                (sum / total).round() as u16
            } else {
                0
            };
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

struct Span {
    start: u32,
    weights: Vec<f64>,
}

fn span_weights(index: u32, ratio: f64, size: u32) -> Span {
    let min = index as f64 / ratio;
    let min_int = min as u32;
    let max = f64::min((index + 1) as f64 / ratio, size as f64);
    let max_int = max as u32;
    let len = (max_int - min_int).max(1) as usize;
    let mut weights = vec![1.0; len];
    weights[0] = (min + 1.0).floor() - min;
    weights[len - 1] = max - max.floor();
    Span {
        start: min_int,
        weights,
    }
}

/// Encode the image as JPEG with default quality.
///
/// JPEG is 8 bits per sample, so each 16-bit sample is reduced at encode
/// time (the high byte is kept).
pub fn to_jpeg(img: &Gray16Image) -> ImageResult<Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut luma8 = ImageBuffer::<Luma<u8>, Vec<u8>>::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        luma8.put_pixel(x, y, Luma([(pixel[0] >> 8) as u8]));
    }
    let mut buf = Cursor::new(Vec::new());
    luma8.write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}

/// Full transform: decode, downscale, and encode as grayscale JPEG.
///
/// Returns the decode error untouched so the caller can fall back to the
/// original payload.
pub fn transform(data: &[u8], fit: u32) -> ImageResult<Vec<u8>> {
    let img = decode(data)?;
    to_jpeg(&downscale(img, fit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255u8, 255, 255])
            } else {
                image::Rgb([0u8, 0, 0])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_produces_gray16() {
        let img = decode(&checkerboard(8, 8)).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
        assert_eq!(img.get_pixel(0, 0)[0], u16::MAX);
    }

    #[test]
    fn test_decode_failure_on_garbage() {
        assert!(decode(b"definitely not an image").is_err());
        assert!(transform(b"", 100).is_err());
    }

    #[test]
    fn test_downscale_disabled() {
        let img = decode(&checkerboard(8, 8)).unwrap();
        let out = downscale(img, 0);
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn test_downscale_noop_when_already_fits() {
        let img = decode(&checkerboard(8, 8)).unwrap();
        let out = downscale(img, 8);
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let img = decode(&checkerboard(1024, 768)).unwrap();
        let out = downscale(img, 200);
        assert_eq!(out.dimensions(), (200, 150));

        let img = decode(&checkerboard(768, 1024)).unwrap();
        let out = downscale(img, 200);
        assert_eq!(out.dimensions(), (150, 200));
    }

    #[test]
    fn test_downscale_constant_image_stays_constant() {
        let img = Gray16Image::from_pixel(10, 7, Luma([12345u16]));
        let out = downscale(img, 4);
        assert_eq!(out.dimensions(), (4, 3));
        for pixel in out.pixels() {
            assert_eq!(pixel[0], 12345);
        }
    }

    #[test]
    fn test_downscale_exact_halving_point_samples() {
        // At an exact 2:1 ratio the boundary weight of the trailing pixel is
        // zero, so each destination pixel takes the top-left source pixel.
        // On a checkerboard those are all white.
        let img = decode(&checkerboard(4, 4)).unwrap();
        let out = downscale(img, 2);
        assert_eq!(out.dimensions(), (2, 2));
        for pixel in out.pixels() {
            assert_eq!(pixel[0], u16::MAX);
        }
    }

    #[test]
    fn test_transform_emits_decodable_jpeg() {
        let jpeg = transform(&checkerboard(100, 60), 50).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 30);
    }
}
