//! Converter module: Media Probe, Process Controller and Progress Parser.
//!
//! The [`Transcoder`] trait is the seam between task orchestration and the
//! external engine. [`FfmpegTranscoder`] drives ffmpeg/ffprobe; tests use
//! `testing::MockTranscoder`.
//!
//! # Example
//!
//! ```ignore
//! use avcnv_core::converter::{FfmpegTranscoder, ProgressParser, Transcoder};
//!
//! let transcoder = FfmpegTranscoder::with_defaults();
//! transcoder.validate().await?;
//!
//! let info = transcoder.probe(&job.input_path).await?;
//! let mut parser = ProgressParser::new(job.options.output_duration(info.usable_duration()));
//!
//! let mut handle = transcoder.start(&job).await?;
//! while let Some(line) = handle.next_line().await {
//!     if let Some(fraction) = parser.feed(&line) {
//!         println!("{:.1}%", fraction * 100.0);
//!     }
//! }
//! handle.wait().await?;
//! ```

mod capabilities;
mod config;
mod error;
mod ffmpeg;
mod options;
mod process;
mod progress;
mod traits;
mod types;

pub use capabilities::{EncoderCapabilities, FormatCatalog};
pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegTranscoder;
pub use options::{check_category, ConversionOptions};
pub use process::{
    spawn_supervised, LineSink, ProcessDriver, ProcessExit, ProcessHandle, Terminator,
};
pub use progress::{parse_elapsed_secs, ProgressParser, RUNNING_CAP};
pub use traits::Transcoder;
pub use types::{
    AudioCodec, HwAccel, MediaCategory, MediaInfo, OutputFormat, Resolution, TranscodeJob,
    VideoCodec, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS,
};
