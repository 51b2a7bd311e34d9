//! Per-request conversion options.
//!
//! Every field is optional. An absent numeric field means the source value
//! passes through untouched; an absent codec means the output format's
//! default encoder.

use serde::{Deserialize, Serialize};

use super::error::ConverterError;
use super::types::{AudioCodec, HwAccel, MediaCategory, OutputFormat, Resolution, VideoCodec};

const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=192_000;
const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 1..=8;
const BIT_DEPTHS: &[u8] = &[16, 24, 32];
const MAX_GAIN_PERCENT: u32 = 1000;
const MAX_FRAME_RATE: f64 = 240.0;
const RESOLUTION_SIDE_RANGE: std::ops::RangeInclusive<u32> = 16..=8192;

/// Codec and numeric parameters shared by every file of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionOptions {
    // Video stream
    pub video_codec: Option<VideoCodec>,
    pub video_bitrate_kbps: Option<u32>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub hwaccel: Option<HwAccel>,

    // Audio stream
    pub audio_codec: Option<AudioCodec>,
    pub audio_bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    /// Only meaningful for lossless codecs.
    pub bit_depth: Option<u8>,
    /// Volume in percent of the source, 100 = unchanged.
    pub gain_percent: Option<u32>,

    // Trim
    pub trim_start_secs: Option<f64>,
    pub trim_end_secs: Option<f64>,
}

impl ConversionOptions {
    /// The audio encoder that will actually run.
    pub fn effective_audio_codec(&self, format: OutputFormat) -> AudioCodec {
        self.audio_codec
            .unwrap_or_else(|| format.default_audio_codec())
    }

    /// The video encoder that will actually run, `None` for audio targets.
    pub fn effective_video_codec(&self, format: OutputFormat) -> Option<VideoCodec> {
        match format.category() {
            MediaCategory::Audio => None,
            MediaCategory::Video => self.video_codec.or_else(|| format.default_video_codec()),
        }
    }

    /// Length of the output given the source duration, after trimming.
    ///
    /// `None` when the length is unknown or the trim leaves nothing.
    pub fn output_duration(&self, source_secs: Option<f64>) -> Option<f64> {
        let start = self.trim_start_secs.unwrap_or(0.0);
        let end = match (self.trim_end_secs, source_secs) {
            (Some(end), Some(source)) => end.min(source),
            (Some(end), None) => end,
            (None, Some(source)) => source,
            (None, None) => return None,
        };
        Some(end - start).filter(|d| d.is_finite() && *d > 0.0)
    }

    fn has_video_params(&self) -> bool {
        self.video_bitrate_kbps.is_some() || self.resolution.is_some() || self.frame_rate.is_some()
    }

    fn has_audio_params(&self) -> bool {
        self.audio_bitrate_kbps.is_some()
            || self.sample_rate.is_some()
            || self.channels.is_some()
            || self.bit_depth.is_some()
            || self.gain_percent.is_some()
    }

    /// Checks the options against the target format.
    pub fn validate(&self, format: OutputFormat) -> Result<(), ConverterError> {
        if format.category() == MediaCategory::Audio
            && (self.video_codec.is_some() || self.has_video_params() || self.hwaccel.is_some())
        {
            return Err(ConverterError::validation(format!(
                "video options cannot be used with audio format {}",
                format
            )));
        }

        self.validate_video(format)?;
        self.validate_audio(format)?;
        self.validate_trim()
    }

    fn validate_video(&self, format: OutputFormat) -> Result<(), ConverterError> {
        let Some(codec) = self.effective_video_codec(format) else {
            return Ok(());
        };

        if codec == VideoCodec::Copy {
            if self.has_video_params() {
                return Err(ConverterError::validation(
                    "video codec 'copy' cannot be combined with video bitrate, resolution or frame rate",
                ));
            }
        } else if !format.video_codecs().contains(&codec.family()) {
            return Err(ConverterError::validation(format!(
                "video codec {} is not supported in {}",
                codec.ffmpeg_codec(),
                format
            )));
        }

        if self.video_bitrate_kbps == Some(0) {
            return Err(ConverterError::validation("video bitrate must be positive"));
        }

        if let Some(fps) = self.frame_rate {
            if !(fps > 0.0 && fps <= MAX_FRAME_RATE) {
                return Err(ConverterError::validation(format!(
                    "frame rate must be in (0, {}], got {}",
                    MAX_FRAME_RATE, fps
                )));
            }
        }

        if let Some(res) = self.resolution {
            if !RESOLUTION_SIDE_RANGE.contains(&res.width)
                || !RESOLUTION_SIDE_RANGE.contains(&res.height)
            {
                return Err(ConverterError::validation(format!(
                    "resolution sides must be within {}..={}, got {}",
                    RESOLUTION_SIDE_RANGE.start(),
                    RESOLUTION_SIDE_RANGE.end(),
                    res
                )));
            }
        }

        Ok(())
    }

    fn validate_audio(&self, format: OutputFormat) -> Result<(), ConverterError> {
        let codec = self.effective_audio_codec(format);

        if codec == AudioCodec::Copy {
            if self.has_audio_params() {
                return Err(ConverterError::validation(
                    "audio codec 'copy' cannot be combined with audio bitrate, sample rate, channels, bit depth or gain",
                ));
            }
            return Ok(());
        }

        if !format.audio_codecs().contains(&codec) {
            return Err(ConverterError::validation(format!(
                "audio codec {} is not supported in {}",
                codec.ffmpeg_codec(None),
                format
            )));
        }

        if self.audio_bitrate_kbps == Some(0) {
            return Err(ConverterError::validation("audio bitrate must be positive"));
        }

        if let Some(rate) = self.sample_rate {
            if !SAMPLE_RATE_RANGE.contains(&rate) {
                return Err(ConverterError::validation(format!(
                    "sample rate must be within {}..={} Hz, got {}",
                    SAMPLE_RATE_RANGE.start(),
                    SAMPLE_RATE_RANGE.end(),
                    rate
                )));
            }
        }

        if let Some(channels) = self.channels {
            if !CHANNEL_RANGE.contains(&channels) {
                return Err(ConverterError::validation(format!(
                    "channel count must be within 1..=8, got {}",
                    channels
                )));
            }
        }

        if let Some(depth) = self.bit_depth {
            if !BIT_DEPTHS.contains(&depth) {
                return Err(ConverterError::validation(format!(
                    "bit depth must be 16, 24 or 32, got {}",
                    depth
                )));
            }
            if !codec.is_lossless() {
                return Err(ConverterError::validation(format!(
                    "bit depth only applies to lossless codecs, not {}",
                    codec.ffmpeg_codec(None)
                )));
            }
        }

        if let Some(gain) = self.gain_percent {
            if gain > MAX_GAIN_PERCENT {
                return Err(ConverterError::validation(format!(
                    "gain must be within 0..={} percent, got {}",
                    MAX_GAIN_PERCENT, gain
                )));
            }
        }

        Ok(())
    }

    fn validate_trim(&self) -> Result<(), ConverterError> {
        if let Some(start) = self.trim_start_secs {
            if !start.is_finite() || start < 0.0 {
                return Err(ConverterError::validation(format!(
                    "trim start must be >= 0, got {}",
                    start
                )));
            }
        }

        if let Some(end) = self.trim_end_secs {
            let start = self.trim_start_secs.unwrap_or(0.0);
            if !end.is_finite() || end <= start {
                return Err(ConverterError::validation(format!(
                    "trim end must be after trim start ({}), got {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}

/// Rejects pairings the engine cannot produce, such as audio to video.
pub fn check_category(source: MediaCategory, format: OutputFormat) -> Result<(), ConverterError> {
    if source == MediaCategory::Audio && format.category() == MediaCategory::Video {
        return Err(ConverterError::validation(format!(
            "cannot convert audio sources to video format {}",
            format
        )));
    }
    Ok(())
}
