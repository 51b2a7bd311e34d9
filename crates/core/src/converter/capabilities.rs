//! Hardware encoder capability detection.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use super::config::ConverterConfig;
use super::types::{OutputFormat, VideoCodec};

/// Available hardware encoders detected on the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// NVIDIA NVENC H.264 available
    pub h264_nvenc: bool,
    /// NVIDIA NVENC H.265/HEVC available
    pub hevc_nvenc: bool,
    /// NVIDIA NVENC AV1 available (RTX 40 series+)
    pub av1_nvenc: bool,
    /// Intel Quick Sync H.264 available
    pub h264_qsv: bool,
    /// Intel Quick Sync H.265/HEVC available
    pub hevc_qsv: bool,
    /// VA-API H.264 available (Linux)
    pub h264_vaapi: bool,
    /// VA-API H.265/HEVC available (Linux)
    pub hevc_vaapi: bool,
}

impl EncoderCapabilities {
    /// Detect available hardware encoders by probing ffmpeg.
    ///
    /// Any failure to run ffmpeg reports no hardware encoders.
    pub async fn detect(config: &ConverterConfig) -> Self {
        let output = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::from_encoder_list(&String::from_utf8_lossy(&o.stdout)),
            _ => Self::default(),
        }
    }

    /// Parses the output of `ffmpeg -encoders`.
    pub fn from_encoder_list(listing: &str) -> Self {
        let has = |name: &str| {
            listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name))
        };

        Self {
            h264_nvenc: has("h264_nvenc"),
            hevc_nvenc: has("hevc_nvenc"),
            av1_nvenc: has("av1_nvenc"),
            h264_qsv: has("h264_qsv"),
            hevc_qsv: has("hevc_qsv"),
            h264_vaapi: has("h264_vaapi"),
            hevc_vaapi: has("hevc_vaapi"),
        }
    }

    /// Returns all selectable video codecs, including detected hardware encoders.
    pub fn available_video_codecs(&self) -> Vec<VideoCodec> {
        let mut codecs = vec![
            VideoCodec::Copy,
            VideoCodec::H264,
            VideoCodec::H265,
            VideoCodec::Vp8,
            VideoCodec::Vp9,
            VideoCodec::Av1,
            VideoCodec::Mpeg4,
            VideoCodec::Mpeg2,
            VideoCodec::Wmv2,
            VideoCodec::Flv1,
        ];

        let hardware = [
            (self.h264_nvenc, VideoCodec::H264Nvenc),
            (self.hevc_nvenc, VideoCodec::HevcNvenc),
            (self.av1_nvenc, VideoCodec::Av1Nvenc),
            (self.h264_qsv, VideoCodec::H264Qsv),
            (self.hevc_qsv, VideoCodec::HevcQsv),
            (self.h264_vaapi, VideoCodec::H264Vaapi),
            (self.hevc_vaapi, VideoCodec::HevcVaapi),
        ];
        codecs.extend(hardware.into_iter().filter(|(on, _)| *on).map(|(_, c)| c));

        codecs
    }

    /// Check if any hardware encoder is available.
    pub fn has_hardware_encoder(&self) -> bool {
        self.available_video_codecs().iter().any(|c| c.is_hardware())
    }
}

/// Supported formats and encoders, as reported by `GET /capabilities`.
#[derive(Debug, Clone, Serialize)]
pub struct FormatCatalog {
    pub audio_formats: Vec<OutputFormat>,
    pub video_formats: Vec<OutputFormat>,
    pub video_codecs: Vec<VideoCodec>,
    pub hardware: EncoderCapabilities,
}

impl FormatCatalog {
    pub fn new(hardware: EncoderCapabilities) -> Self {
        let (audio_formats, video_formats): (Vec<_>, Vec<_>) = OutputFormat::ALL
            .iter()
            .copied()
            .partition(|f| f.category() == super::types::MediaCategory::Audio);
        Self {
            audio_formats,
            video_formats,
            video_codecs: hardware.available_video_codecs(),
            hardware,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D hevc_vaapi           H.265/HEVC (VAAPI) (codec hevc)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_default_capabilities() {
        let caps = EncoderCapabilities::default();
        assert!(!caps.h264_nvenc);
        assert!(!caps.has_hardware_encoder());
    }

    #[test]
    fn test_parse_encoder_list() {
        let caps = EncoderCapabilities::from_encoder_list(LISTING);
        assert!(caps.h264_nvenc);
        assert!(caps.hevc_vaapi);
        assert!(!caps.hevc_nvenc);
        assert!(!caps.h264_qsv);
        assert!(caps.has_hardware_encoder());
    }

    #[test]
    fn test_available_codecs_with_nvenc() {
        let caps = EncoderCapabilities {
            h264_nvenc: true,
            ..Default::default()
        };
        let codecs = caps.available_video_codecs();
        assert!(codecs.contains(&VideoCodec::H264));
        assert!(codecs.contains(&VideoCodec::H264Nvenc));
        assert!(!codecs.contains(&VideoCodec::HevcNvenc));
    }

    #[test]
    fn test_format_catalog_split() {
        let catalog = FormatCatalog::new(EncoderCapabilities::default());
        assert_eq!(catalog.audio_formats.len(), 7);
        assert_eq!(catalog.video_formats.len(), 8);
        assert!(catalog.video_formats.contains(&OutputFormat::Webm));
    }

    #[tokio::test]
    async fn test_detect_without_ffmpeg() {
        let config = ConverterConfig::with_paths(
            "/nonexistent/ffmpeg".into(),
            "/nonexistent/ffprobe".into(),
        );
        let caps = EncoderCapabilities::detect(&config).await;
        assert_eq!(caps, EncoderCapabilities::default());
    }
}
