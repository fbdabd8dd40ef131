//! Figure encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! Hosted vision models accept images as base64 payloads inside the JSON
//! request body. PNG keeps plot axes and tick labels crisp, which matters
//! more than payload size when the model has to read numbers off a chart.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a figure as a base64 PNG ready for the model API.
///
/// Figures whose longest edge exceeds `max_pixels` are downscaled first,
/// preserving aspect ratio; embedded scans can be several thousand pixels
/// wide and would blow through upload limits.
pub fn encode_image(img: &DynamicImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let scaled;
    let img = if img.width() > max_pixels || img.height() > max_pixels {
        scaled = img.thumbnail(max_pixels, max_pixels);
        &scaled
    } else {
        img
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} figure → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_image(&img, 1536).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn encode_downscales_large_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 100, Rgba([0, 0, 255, 255])));
        let data = encode_image(&img, 200).unwrap();
        let decoded = STANDARD.decode(&data.data).unwrap();
        let round = image::load_from_memory(&decoded).unwrap();
        assert_eq!(round.width(), 200);
        assert_eq!(round.height(), 50);
    }
}
