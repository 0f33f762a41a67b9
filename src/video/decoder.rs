extern crate ffmpeg_next;

use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use super::{FrameSource, GrayFrame};
use crate::{Error, Profile, Result};

/// Frames are scaled down to this size before hashing.
const SAMPLE_WIDTH: u32 = 384;
const SAMPLE_HEIGHT: u32 = 216;

/// Thin wrapper around the native `FFmpeg` video decoder.
struct Decoder {
    decoder: ffmpeg_next::codec::decoder::Video,
}

impl Decoder {
    fn build_threading_config() -> ffmpeg_next::codec::threading::Config {
        let mut config = ffmpeg_next::codec::threading::Config::default();
        config.count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        config.kind = ffmpeg_next::codec::threading::Type::Frame;
        config
    }

    fn from_stream(stream: ffmpeg_next::format::stream::Stream, threaded: bool) -> Result<Self> {
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let mut decoder = ctx.decoder();

        if threaded {
            decoder.set_threading(Self::build_threading_config());
        }

        let decoder = decoder.video()?;

        Ok(Self { decoder })
    }

    fn scaler(&self) -> Result<scaling::Context> {
        Ok(scaling::Context::get(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            Pixel::GRAY8,
            SAMPLE_WIDTH,
            SAMPLE_HEIGHT,
            scaling::Flags::BILINEAR,
        )?)
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::packet::Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    fn receive_frame(&mut self, frame: &mut ffmpeg_next::frame::Video) -> Result<()> {
        Ok(self.decoder.receive_frame(frame)?)
    }
}

// Picks decoded frames at a fixed rate based on their presentation time.
struct Sampler {
    time_base: f64,
    // Native frame rate, used to place frames without a timestamp.
    frame_rate: f64,
    period: f64,
    next_sample: f64,
    seen: u64,
    count: usize,
    budget: usize,
}

impl Sampler {
    fn new(time_base: f64, frame_rate: f64, hash_fps: u32, budget: usize) -> Self {
        Self {
            time_base,
            frame_rate,
            period: 1.0 / f64::from(hash_fps.max(1)),
            next_sample: 0.0,
            seen: 0,
            count: 0,
            budget,
        }
    }

    fn done(&self) -> bool {
        self.count >= self.budget
    }

    // Returns true if the frame at raw timestamp `ts` should be sampled.
    fn take(&mut self, ts: Option<i64>) -> bool {
        let position = self.seen;
        self.seen += 1;
        let ts = match ts {
            Some(ts) => ts as f64 * self.time_base,
            None if self.frame_rate > 0.0 => position as f64 / self.frame_rate,
            None => self.next_sample,
        };
        if ts < self.next_sample {
            return false;
        }
        self.next_sample = ((ts / self.period).floor() + 1.0) * self.period;
        self.count += 1;
        true
    }
}

// Average frame rate of a stream, or its base rate if the average is unknown.
fn frame_rate(stream: &ffmpeg_next::format::stream::Stream<'_>) -> f64 {
    let fps = f64::from(stream.avg_frame_rate());
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        f64::from(stream.rate())
    }
}

/// [FrameSource] backed by FFmpeg.
///
/// Decodes the best video stream of a file from the start, converts frames to 384x216
/// grayscale and samples them at the requested rate.
#[derive(Debug, Default)]
pub struct FfmpegFrameSource {
    threaded: bool,
}

impl FfmpegFrameSource {
    /// Initializes FFmpeg and constructs a new source. If `threaded` is set, the decoder uses
    /// frame-level threading.
    pub fn new(threaded: bool) -> Result<Self> {
        ffmpeg_next::init()?;
        Ok(Self { threaded })
    }

    /// Builds an unprocessed [Profile] for a video from its container metadata.
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<Profile> {
        let path = path.as_ref();
        let ctx = ffmpeg_next::format::input(&path)?;
        let stream = ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| Error::FrameSource {
                path: path.to_owned(),
                reason: "no video stream".to_owned(),
            })?;

        let fps = frame_rate(&stream);

        // Matroska does not store the frame count or the duration in the stream; fall back
        // to the format context, where the duration is in microseconds.
        let total_frames = if stream.frames() > 0 {
            stream.frames() as u64
        } else if stream.duration() > 0 {
            (stream.duration() as f64 * f64::from(stream.time_base()) * fps) as u64
        } else {
            (ctx.duration().max(0) as f64 / 1_000_000.0 * fps) as u64
        };

        Profile::new(path, fps, total_frames)
    }

    fn drain(
        decoder: &mut Decoder,
        scaler: &mut scaling::Context,
        sampler: &mut Sampler,
        frame: &mut ffmpeg_next::frame::Video,
        gray: &mut ffmpeg_next::frame::Video,
        on_frame: &mut dyn FnMut(GrayFrame<'_>),
    ) -> Result<()> {
        while !sampler.done() && decoder.receive_frame(frame).is_ok() {
            if !sampler.take(frame.timestamp()) {
                continue;
            }
            scaler.run(frame, gray)?;
            on_frame(GrayFrame {
                width: gray.width(),
                height: gray.height(),
                stride: gray.stride(0),
                data: gray.data(0),
            });
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn decode(
        &self,
        path: &Path,
        hash_fps: u32,
        budget: usize,
        on_frame: &mut dyn FnMut(GrayFrame<'_>),
    ) -> Result<usize> {
        let span = tracing::span!(tracing::Level::TRACE, "decode", budget);
        let _enter = span.enter();

        let mut ctx = ffmpeg_next::format::input(&path)?;
        let stream = ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| Error::FrameSource {
                path: path.to_owned(),
                reason: "no video stream".to_owned(),
            })?;
        let stream_idx = stream.index();
        let time_base = f64::from(stream.time_base());
        let rate = frame_rate(&stream);
        let mut decoder = Decoder::from_stream(stream, self.threaded)?;
        let mut scaler = decoder.scaler()?;

        let mut sampler = Sampler::new(time_base, rate, hash_fps, budget);
        let mut frame = ffmpeg_next::frame::Video::empty();
        let mut gray = ffmpeg_next::frame::Video::empty();

        for (s, p) in ctx.packets() {
            if sampler.done() {
                break;
            }
            if s.index() != stream_idx {
                continue;
            }
            if let Err(e) = decoder.send_packet(&p) {
                tracing::trace!("skipping undecodable packet: {}", e);
                continue;
            }
            Self::drain(
                &mut decoder,
                &mut scaler,
                &mut sampler,
                &mut frame,
                &mut gray,
                on_frame,
            )?;
        }

        if !sampler.done() {
            decoder.send_eof()?;
            Self::drain(
                &mut decoder,
                &mut scaler,
                &mut sampler,
                &mut frame,
                &mut gray,
                on_frame,
            )?;
        }

        tracing::debug!(path = %path.display(), frames = sampler.count, "decoded frames");

        Ok(sampler.count)
    }
}
