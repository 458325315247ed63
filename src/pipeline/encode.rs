//! Image encoding: `DynamicImage` → base64 PNG or JPEG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. PNG is the default because it is lossless and keeps thin glyphs
//! crisp; JPEG trades a little fidelity for much smaller uploads on
//! photo-heavy scans. `detail: "high"` asks GPT-4-class models to use the
//! full tile budget so fine print and small tables survive.

use crate::config::PageImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page for the vision request.
pub fn encode_page(
    img: &DynamicImage,
    format: PageImageFormat,
) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    let mime = match format {
        PageImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
            "image/png"
        }
        PageImageFormat::Jpeg { quality } => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
            "image/jpeg"
        }
    };

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image ({}) → {} bytes base64", mime, b64.len());

    Ok(ImageData::new(b64, mime).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn png_is_default_and_valid_base64() {
        let data = encode_page(&red_square(), PageImageFormat::default()).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn jpeg_drops_alpha_and_sets_mime() {
        let data = encode_page(&red_square(), PageImageFormat::Jpeg { quality: 85 }).unwrap();
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }
}
