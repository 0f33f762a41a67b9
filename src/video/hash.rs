use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer};
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

use super::{FrameHash, GrayFrame};

/// Perceptual hash used to reduce a frame to a [FrameHash].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Difference hash: the frame is shrunk to 9x8 and each bit records whether
    /// brightness increases between horizontally adjacent cells.
    #[default]
    Gradient,
    /// 64-bit blockhash computed over the full frame.
    Block,
}

/// Returns the perceptual hash of the given frame.
///
/// Degenerate frames hash to zero.
pub fn hash_frame(frame: &GrayFrame<'_>, algorithm: HashAlgorithm) -> FrameHash {
    if frame.width == 0 || frame.height == 0 || frame.stride < frame.width as usize {
        return FrameHash::default();
    }
    let required = (frame.height as usize - 1) * frame.stride + frame.width as usize;
    if frame.data.len() < required {
        return FrameHash::default();
    }

    match algorithm {
        HashAlgorithm::Gradient => gradient_hash(frame),
        HashAlgorithm::Block => {
            // Blockhash64 displays as exactly 16 hex digits.
            let hash = blockhash::blockhash64(frame);
            u64::from_str_radix(&hash.to_string(), 16)
                .map(FrameHash)
                .unwrap_or_default()
        }
    }
}

fn gradient_hash(frame: &GrayFrame<'_>) -> FrameHash {
    let img: Option<GrayImage> = ImageBuffer::from_raw(frame.width, frame.height, frame.to_packed());
    let img = match img {
        Some(img) => DynamicImage::ImageLuma8(img),
        None => return FrameHash::default(),
    };

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Gradient)
        .hash_size(8, 8)
        .resize_filter(FilterType::Triangle)
        .to_hasher();
    let hash = hasher.hash_image(&img);

    // 8x8 bits.
    match <[u8; 8]>::try_from(hash.as_bytes()) {
        Ok(bytes) => FrameHash(u64::from_be_bytes(bytes)),
        Err(_) => FrameHash::default(),
    }
}
