use std::path::Path;

use crate::Result;

/// Borrowed view of a decoded 8-bit grayscale (luma) frame.
///
/// `stride` is the number of bytes between the starts of two consecutive rows and may be
/// larger than `width` when the decoder pads its buffers.
#[derive(Copy, Clone, Debug)]
pub struct GrayFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> GrayFrame<'a> {
    /// Builds a tightly packed frame (`stride == width`).
    pub fn packed(width: u32, height: u32, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            stride: width as usize,
            data,
        }
    }

    #[inline(always)]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride + x as usize]
    }

    /// Copies the visible area of the frame into a packed buffer.
    pub(crate) fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.width as usize {
            return self.data[..self.width as usize * self.height as usize].to_vec();
        }
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            out.extend_from_slice(&row[..self.width as usize]);
        }
        out
    }
}

// Wraps a gray frame to implement [blockhash::Image].
impl<'a> blockhash::Image for GrayFrame<'a> {
    #[inline(always)]
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline(always)]
    fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let mut data = [0xFF; 4]; // alpha defaults to 0xFF
        data[0] = self.luma(x, y);
        data[1] = data[0];
        data[2] = data[0];
        data
    }
}

/// Produces sampled frames for a video.
///
/// Implementations decode `path`, sample it at `hash_fps` frames per second from the start
/// of the video and call `on_frame` for at most `budget` frames, in presentation order.
/// The number of frames delivered is returned. Decoding is external to the engine; see
/// [FfmpegFrameSource](super::FfmpegFrameSource) for the bundled implementation.
pub trait FrameSource: Send + Sync {
    fn decode(
        &self,
        path: &Path,
        hash_fps: u32,
        budget: usize,
        on_frame: &mut dyn FnMut(GrayFrame<'_>),
    ) -> Result<usize>;
}
