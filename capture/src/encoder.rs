use dni_capture_common::frame::FrameBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::debug;

/// Encode a captured frame as a baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(frame: &FrameBuffer, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = frame.to_rgb();
    let mut jpeg = Vec::with_capacity(rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
        &rgb,
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    debug!(
        width = frame.width(),
        height = frame.height(),
        quality,
        bytes = jpeg.len(),
        "encoded capture"
    );
    Ok(jpeg)
}
