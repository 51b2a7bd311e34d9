//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::options::ConversionOptions;

/// Media category of a source file or output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Audio,
    Video,
}

/// Source file extensions recognised as audio.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "flac", "ogg", "m4a", "wma"];

/// Source file extensions recognised as video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm", "flv", "wmv", "mpeg"];

impl MediaCategory {
    /// Classifies a bare extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Classifies a file by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target container, named by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    // Audio
    Mp3,
    Wav,
    Aac,
    Flac,
    Ogg,
    M4a,
    Wma,
    // Video
    Mp4,
    Avi,
    Mkv,
    Mov,
    Webm,
    Flv,
    Wmv,
    Mpeg,
}

impl OutputFormat {
    pub const ALL: &'static [OutputFormat] = &[
        Self::Mp3,
        Self::Wav,
        Self::Aac,
        Self::Flac,
        Self::Ogg,
        Self::M4a,
        Self::Wma,
        Self::Mp4,
        Self::Avi,
        Self::Mkv,
        Self::Mov,
        Self::Webm,
        Self::Flv,
        Self::Wmv,
        Self::Mpeg,
    ];

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
            Self::Wma => "wma",
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
            Self::Webm => "webm",
            Self::Flv => "flv",
            Self::Wmv => "wmv",
            Self::Mpeg => "mpeg",
        }
    }

    pub fn category(&self) -> MediaCategory {
        match self {
            Self::Mp3 | Self::Wav | Self::Aac | Self::Flac | Self::Ogg | Self::M4a | Self::Wma => {
                MediaCategory::Audio
            }
            _ => MediaCategory::Video,
        }
    }

    /// Encoder used when the request names no audio codec.
    pub fn default_audio_codec(&self) -> AudioCodec {
        match self {
            Self::Mp3 => AudioCodec::Mp3,
            Self::Wav => AudioCodec::Pcm,
            Self::Aac | Self::M4a => AudioCodec::Aac,
            Self::Flac => AudioCodec::Flac,
            Self::Ogg => AudioCodec::Vorbis,
            Self::Wma | Self::Wmv => AudioCodec::Wma,
            Self::Mp4 | Self::Mkv | Self::Mov | Self::Flv => AudioCodec::Aac,
            Self::Avi => AudioCodec::Mp3,
            Self::Webm => AudioCodec::Opus,
            Self::Mpeg => AudioCodec::Mp2,
        }
    }

    /// Encoder used when the request names no video codec.
    pub fn default_video_codec(&self) -> Option<VideoCodec> {
        match self {
            Self::Mp4 | Self::Mkv | Self::Mov | Self::Flv => Some(VideoCodec::H264),
            Self::Avi => Some(VideoCodec::Mpeg4),
            Self::Webm => Some(VideoCodec::Vp9),
            Self::Wmv => Some(VideoCodec::Wmv2),
            Self::Mpeg => Some(VideoCodec::Mpeg2),
            _ => None,
        }
    }

    /// Audio codecs this container can carry.
    pub fn audio_codecs(&self) -> &'static [AudioCodec] {
        use AudioCodec::*;
        match self {
            Self::Mp3 => &[Mp3],
            Self::Wav => &[Pcm],
            Self::Aac => &[Aac],
            Self::Flac => &[Flac],
            Self::Ogg => &[Vorbis, Opus, Flac],
            Self::M4a => &[Aac, Alac],
            Self::Wma | Self::Wmv => &[Wma],
            Self::Mp4 => &[Aac, Mp3, Opus, Flac, Alac],
            Self::Avi => &[Mp3, Aac, Pcm],
            Self::Mkv => &[Aac, Mp3, Opus, Vorbis, Flac, Pcm, Alac, Mp2],
            Self::Mov => &[Aac, Alac, Pcm, Mp3],
            Self::Webm => &[Opus, Vorbis],
            Self::Flv => &[Aac, Mp3],
            Self::Mpeg => &[Mp2, Mp3],
        }
    }

    /// Video codec families this container can carry; empty for audio formats.
    pub fn video_codecs(&self) -> &'static [VideoCodec] {
        use VideoCodec::*;
        match self {
            Self::Mp4 => &[H264, H265, Av1, Mpeg4],
            Self::Avi => &[Mpeg4, H264],
            Self::Mkv => &[H264, H265, Vp8, Vp9, Av1, Mpeg4, Mpeg2],
            Self::Mov => &[H264, H265, Mpeg4],
            Self::Webm => &[Vp8, Vp9, Av1],
            Self::Flv => &[H264, Flv1],
            Self::Wmv => &[Wmv2],
            Self::Mpeg => &[Mpeg2],
            _ => &[],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| format!("unsupported output format: {}", s))
    }
}

/// Audio encoder choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// Stream copy, no re-encoding.
    Copy,
    Mp3,
    Mp2,
    Aac,
    Flac,
    Vorbis,
    Opus,
    /// Uncompressed PCM; sample width follows the requested bit depth.
    Pcm,
    Alac,
    Wma,
}

impl AudioCodec {
    /// Returns the ffmpeg encoder name.
    pub fn ffmpeg_codec(&self, bit_depth: Option<u8>) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Mp3 => "libmp3lame",
            Self::Mp2 => "mp2",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Vorbis => "libvorbis",
            Self::Opus => "libopus",
            Self::Pcm => match bit_depth {
                Some(24) => "pcm_s24le",
                Some(32) => "pcm_s32le",
                _ => "pcm_s16le",
            },
            Self::Alac => "alac",
            Self::Wma => "wmav2",
        }
    }

    /// Whether this codec is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Pcm | Self::Alac)
    }
}

/// Video encoder choice, including hardware encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// Stream copy, no re-encoding.
    Copy,
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Mpeg2,
    Wmv2,
    Flv1,
    H264Nvenc,
    HevcNvenc,
    Av1Nvenc,
    H264Qsv,
    HevcQsv,
    H264Vaapi,
    HevcVaapi,
}

impl VideoCodec {
    /// Returns the ffmpeg encoder name.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Vp8 => "libvpx",
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libaom-av1",
            Self::Mpeg4 => "mpeg4",
            Self::Mpeg2 => "mpeg2video",
            Self::Wmv2 => "wmv2",
            Self::Flv1 => "flv",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
            Self::Av1Nvenc => "av1_nvenc",
            Self::H264Qsv => "h264_qsv",
            Self::HevcQsv => "hevc_qsv",
            Self::H264Vaapi => "h264_vaapi",
            Self::HevcVaapi => "hevc_vaapi",
        }
    }

    /// The bitstream family, used for container compatibility.
    pub fn family(&self) -> VideoCodec {
        match self {
            Self::H264Nvenc | Self::H264Qsv | Self::H264Vaapi => Self::H264,
            Self::HevcNvenc | Self::HevcQsv | Self::HevcVaapi => Self::H265,
            Self::Av1Nvenc => Self::Av1,
            other => *other,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.family() != *self
    }
}

/// Hardware decode device passed as `-hwaccel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    Auto,
    Cuda,
    Qsv,
    Vaapi,
    Videotoolbox,
}

impl HwAccel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cuda => "cuda",
            Self::Qsv => "qsv",
            Self::Vaapi => "vaapi",
            Self::Videotoolbox => "videotoolbox",
        }
    }
}

/// Frame size written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("resolution must look like 1920x1080, got '{}'", s))?;
        let width = w
            .parse::<u32>()
            .map_err(|_| format!("invalid resolution width '{}'", w))?;
        let height = h
            .parse::<u32>()
            .map_err(|_| format!("invalid resolution height '{}'", h))?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Result of probing a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the file.
    pub path: PathBuf,
    /// Audio if the file has no real video stream.
    pub category: MediaCategory,
    /// Total duration; `None` when the container does not report one.
    pub duration_secs: Option<f64>,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Container format name as reported by the engine.
    pub format: String,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u8>,
    pub video_codec: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
}

impl MediaInfo {
    /// Duration usable for percentage math (known and positive).
    pub fn usable_duration(&self) -> Option<f64> {
        self.duration_secs.filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// One invocation of the transcoding engine.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Identifier used in logs, `<task>-<index>`.
    pub job_id: String,
    pub input_path: PathBuf,
    /// Where the engine writes; the staging path while a task runs.
    pub output_path: PathBuf,
    pub source_category: MediaCategory,
    pub output_format: OutputFormat,
    /// Already validated against `output_format`.
    pub options: ConversionOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_path() {
        assert_eq!(
            MediaCategory::from_path(Path::new("album/01 Track.FLAC")),
            Some(MediaCategory::Audio)
        );
        assert_eq!(
            MediaCategory::from_path(Path::new("clip.mkv")),
            Some(MediaCategory::Video)
        );
        assert_eq!(MediaCategory::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaCategory::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("mp3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3);
        assert_eq!(".MKV".parse::<OutputFormat>().unwrap(), OutputFormat::Mkv);
        assert!("exe".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_serde_lowercase() {
        let json = serde_json::to_string(&OutputFormat::Webm).unwrap();
        assert_eq!(json, "\"webm\"");
        let parsed: OutputFormat = serde_json::from_str("\"m4a\"").unwrap();
        assert_eq!(parsed, OutputFormat::M4a);
    }

    #[test]
    fn test_every_format_default_codecs_are_allowed() {
        for format in OutputFormat::ALL {
            assert!(
                format.audio_codecs().contains(&format.default_audio_codec()),
                "{} default audio codec not in its own table",
                format
            );
            match format.default_video_codec() {
                Some(codec) => {
                    assert_eq!(format.category(), MediaCategory::Video);
                    assert!(format.video_codecs().contains(&codec));
                }
                None => assert_eq!(format.category(), MediaCategory::Audio),
            }
        }
    }

    #[test]
    fn test_pcm_codec_follows_bit_depth() {
        assert_eq!(AudioCodec::Pcm.ffmpeg_codec(None), "pcm_s16le");
        assert_eq!(AudioCodec::Pcm.ffmpeg_codec(Some(24)), "pcm_s24le");
        assert_eq!(AudioCodec::Pcm.ffmpeg_codec(Some(32)), "pcm_s32le");
    }

    #[test]
    fn test_hardware_codec_family() {
        assert_eq!(VideoCodec::HevcNvenc.family(), VideoCodec::H265);
        assert!(VideoCodec::H264Vaapi.is_hardware());
        assert!(!VideoCodec::Vp9.is_hardware());
    }

    #[test]
    fn test_resolution_parse_and_serde() {
        let res: Resolution = "1280x720".parse().unwrap();
        assert_eq!(res.width, 1280);
        assert_eq!(res.height, 720);
        assert!("1280".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());

        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(json, "\"1280x720\"");
        let back: Resolution = serde_json::from_str("\"640X480\"").unwrap();
        assert_eq!(back.to_string(), "640x480");
    }

    #[test]
    fn test_usable_duration() {
        let mut info = MediaInfo {
            path: PathBuf::from("a.wav"),
            category: MediaCategory::Audio,
            duration_secs: Some(0.0),
            size_bytes: 10,
            format: "wav".to_string(),
            audio_codec: None,
            audio_sample_rate: None,
            audio_channels: None,
            video_codec: None,
            video_width: None,
            video_height: None,
        };
        assert_eq!(info.usable_duration(), None);
        info.duration_secs = Some(12.5);
        assert_eq!(info.usable_duration(), Some(12.5));
    }
}
