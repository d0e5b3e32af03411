// frame.rs — Freezes a native-resolution frame into the fixed square JPEG
// sent to the vision endpoint. The frame is scaled to fill the square; if
// the aspect ratios differ the picture is distorted, not cropped.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView};

use crate::ai::EncodedImage;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("jpeg encode: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Scale `frame` onto a `size`×`size` canvas and JPEG/base64-encode it.
pub fn encode_square(frame: &DynamicImage, size: u32, jpeg_quality: u8) -> Result<EncodedImage, EncodeError> {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 || size == 0 {
        return Err(EncodeError::EmptyFrame);
    }

    let square = if (w, h) == (size, size) {
        frame.clone()
    } else {
        frame.resize_exact(size, size, imageops::FilterType::Triangle)
    };

    let mut jpeg_buf: Vec<u8> = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buf, jpeg_quality.clamp(1, 100));
        encoder.encode(
            square.to_rgb8().as_raw(),
            size,
            size,
            image::ExtendedColorType::Rgb8,
        )?;
    }

    log::debug!(
        "Encoded {}x{} frame into {}px square ({} bytes)",
        w,
        h,
        size,
        jpeg_buf.len()
    );

    Ok(EncodedImage {
        base64: BASE64.encode(&jpeg_buf),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn solid_image(r: u8, g: u8, b: u8, w: u32, h: u32) -> DynamicImage {
        let mut img = RgbaImage::new(w, h);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgba([r, g, b, 255]);
        }
        DynamicImage::ImageRgba8(img)
    }

    fn decode(encoded: &EncodedImage) -> DynamicImage {
        let bytes = BASE64.decode(&encoded.base64).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn wide_frame_is_stretched_into_square() {
        let frame = solid_image(200, 30, 30, 1280, 720);
        let encoded = encode_square(&frame, 512, 70).unwrap();
        assert_eq!(encoded.size, 512);
        assert_eq!(decode(&encoded).dimensions(), (512, 512));
    }

    #[test]
    fn output_is_jpeg() {
        let frame = solid_image(10, 10, 10, 64, 48);
        let encoded = encode_square(&frame, 32, 70).unwrap();
        let bytes = BASE64.decode(&encoded.base64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(encode_square(&frame, 512, 70), Err(EncodeError::EmptyFrame)));
    }
}
