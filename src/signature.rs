use crate::error::FormStampError;
use base64::Engine;
use image::GenericImageView;
use image::imageops::FilterType;

/// A signature image scaled to fit its box and flattened onto opaque white.
/// `rgb` holds 3 bytes per pixel, row-major, no transparency.
#[derive(Debug, Clone)]
pub struct FittedSignature {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Scale arbitrary signature bytes to fit inside `max_width` x `max_height`
/// while preserving aspect ratio, then flatten any transparency onto a white
/// background.
///
/// The scale factor is `min(max_width / w, max_height / h)`, so images
/// smaller than the box are scaled up to fill it, matching the intake form's
/// historical behavior. The result never exceeds the box in either dimension
/// and is always at least 1x1.
pub fn fit_signature(
    bytes: &[u8],
    max_width: f32,
    max_height: f32,
) -> Result<FittedSignature, FormStampError> {
    if max_width <= 0.0 || max_height <= 0.0 {
        return Err(FormStampError::InvalidConfiguration(format!(
            "signature box dimensions must be positive: {}x{}",
            max_width, max_height
        )));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|err| FormStampError::SignatureDecode(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(FormStampError::SignatureDecode(
            "image has a zero dimension".to_string(),
        ));
    }

    let scale = (max_width / width as f32).min(max_height / height as f32);
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    let resized = decoded
        .resize_exact(new_width, new_height, FilterType::Lanczos3)
        .to_rgba8();

    let mut rgb = Vec::with_capacity((new_width * new_height * 3) as usize);
    for pixel in resized.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let inverse = 255 - alpha;
        rgb.push(((r as u32 * alpha + 255 * inverse) / 255) as u8);
        rgb.push(((g as u32 * alpha + 255 * inverse) / 255) as u8);
        rgb.push(((b as u32 * alpha + 255 * inverse) / 255) as u8);
    }

    Ok(FittedSignature {
        width: new_width,
        height: new_height,
        rgb,
    })
}

/// Decode a `data:` URI (as produced by browser signature pads) into raw
/// bytes. Returns `None` when `source` is not a data URI.
pub fn decode_data_uri(source: &str) -> Option<Vec<u8>> {
    if !source.starts_with("data:") {
        return None;
    }
    let (header, data_part) = source.split_once(',')?;
    if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .ok()
    } else {
        Some(data_part.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, pixel));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).expect("encode");
        out.into_inner()
    }

    #[test]
    fn fitted_image_never_exceeds_the_box() {
        let bytes = png_bytes(400, 90, Rgba([0, 0, 0, 255]));
        let fitted = fit_signature(&bytes, 200.0, 45.0).expect("fit");
        assert_eq!((fitted.width, fitted.height), (200, 45));
        assert_eq!(fitted.rgb.len(), 200 * 45 * 3);
    }

    #[test]
    fn aspect_ratio_is_preserved_within_a_pixel() {
        let bytes = png_bytes(300, 100, Rgba([10, 20, 30, 255]));
        let fitted = fit_signature(&bytes, 200.0, 45.0).expect("fit");
        // Height is the binding constraint: scale = 0.45.
        assert_eq!(fitted.height, 45);
        assert_eq!(fitted.width, 135);
        let input_ratio = 300.0 / 100.0;
        let output_ratio = fitted.width as f32 / fitted.height as f32;
        assert!((input_ratio - output_ratio).abs() < input_ratio / 45.0);
    }

    #[test]
    fn small_images_are_scaled_up() {
        let bytes = png_bytes(20, 10, Rgba([0, 0, 0, 255]));
        let fitted = fit_signature(&bytes, 200.0, 45.0).expect("fit");
        assert_eq!((fitted.width, fitted.height), (90, 45));
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let bytes = png_bytes(40, 10, Rgba([0, 0, 0, 0]));
        let fitted = fit_signature(&bytes, 200.0, 45.0).expect("fit");
        assert!(
            fitted.rgb.iter().all(|&channel| channel == 255),
            "fully transparent input must flatten to white"
        );
    }

    #[test]
    fn opaque_pixels_keep_their_color() {
        let bytes = png_bytes(40, 10, Rgba([12, 34, 56, 255]));
        let fitted = fit_signature(&bytes, 40.0, 10.0).expect("fit");
        assert_eq!(&fitted.rgb[..3], &[12, 34, 56]);
    }

    #[test]
    fn undecodable_bytes_are_a_decode_error() {
        let err = fit_signature(b"definitely not an image", 200.0, 45.0).expect_err("reject");
        assert!(matches!(err, FormStampError::SignatureDecode(_)));
    }

    #[test]
    fn non_positive_box_is_a_configuration_error() {
        let bytes = png_bytes(10, 10, Rgba([0, 0, 0, 255]));
        let err = fit_signature(&bytes, 0.0, 45.0).expect_err("reject");
        assert!(matches!(err, FormStampError::InvalidConfiguration(_)));
    }

    #[test]
    fn data_uri_round_trips_png_bytes() {
        let bytes = png_bytes(10, 10, Rgba([0, 0, 0, 255]));
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let decoded = decode_data_uri(&uri).expect("decode");
        assert_eq!(decoded, bytes);
        assert!(decode_data_uri("not a data uri").is_none());
    }
}
