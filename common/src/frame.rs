/// One decoded video frame.
///
/// Pixels are RGBA8, row-major, `width * height * 4` bytes. Alpha is
/// carried through from the decoder but nothing downstream reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

pub const BYTES_PER_PIXEL: usize = 4;

impl FrameBuffer {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if rgba.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                got: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A frame where every pixel has the same color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel = [rgb[0], rgb[1], rgb[2], 255];
        let rgba = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Build a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                let [r, g, b] = f(x, y);
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when either dimension is zero (the stream has not produced a picture).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// One row of RGBA bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.rgba[start..start + stride]
    }

    /// Pixels with the alpha channel dropped, for encoders that take RGB.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.rgba.chunks_exact(BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&px[..3]);
        }
        rgb
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{width}x{height} RGBA frame needs {expected} bytes, got {got}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },
}
