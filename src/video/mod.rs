mod aligner;
mod cache;
mod data;
#[cfg(feature = "ffmpeg")]
mod decoder;
mod extractor;
mod hash;
mod source;

pub use aligner::{Alignment, PairAligner, Side};
pub use cache::FingerprintCache;
pub use data::{Fingerprint, FrameHash, HASH_CODE_LEN};
#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegFrameSource;
pub use extractor::FingerprintExtractor;
pub use hash::{hash_frame, HashAlgorithm};
pub use source::{FrameSource, GrayFrame};

static FINGERPRINT_FILE_NAME: &str = "fingerprint.txt";
static FINGERPRINT_META_FILE_NAME: &str = "fingerprint.json";
