//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::process::{spawn_supervised, ProcessHandle};
use super::traits::Transcoder;
use super::types::{AudioCodec, MediaCategory, MediaInfo, TranscodeJob, VideoCodec};

/// FFmpeg-based transcoder implementation.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: ConverterConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Builds the full ffmpeg argument list for a job.
    pub fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let options = &job.options;
        let format = job.output_format;
        let mut args = vec!["-hide_banner".to_string()];

        // Input options
        if let Some(hwaccel) = options.hwaccel {
            args.extend(["-hwaccel".to_string(), hwaccel.as_str().to_string()]);
        }
        if let Some(start) = options.trim_start_secs {
            args.extend(["-ss".to_string(), start.to_string()]);
        }
        if let Some(end) = options.trim_end_secs {
            args.extend(["-to".to_string(), end.to_string()]);
        }
        args.extend(["-i".to_string(), job.input_path.to_string_lossy().to_string()]);

        // Video stream
        match options.effective_video_codec(format) {
            Some(codec) => {
                args.extend(["-c:v".to_string(), codec.ffmpeg_codec().to_string()]);
                if codec != VideoCodec::Copy {
                    if let Some(bitrate) = options.video_bitrate_kbps {
                        args.extend(["-b:v".to_string(), format!("{}k", bitrate)]);
                    }
                    if let Some(resolution) = options.resolution {
                        args.extend(["-s".to_string(), resolution.to_string()]);
                    }
                    if let Some(fps) = options.frame_rate {
                        args.extend(["-r".to_string(), fps.to_string()]);
                    }
                }
            }
            None if job.source_category == MediaCategory::Video => {
                // audio extraction
                args.push("-vn".to_string());
            }
            None => {}
        }

        // Audio stream
        let audio = options.effective_audio_codec(format);
        args.extend([
            "-c:a".to_string(),
            audio.ffmpeg_codec(options.bit_depth).to_string(),
        ]);
        if audio != AudioCodec::Copy {
            if !audio.is_lossless() {
                if let Some(bitrate) = options.audio_bitrate_kbps {
                    args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
                }
            }
            if let Some(rate) = options.sample_rate {
                args.extend(["-ar".to_string(), rate.to_string()]);
            }
            if let Some(channels) = options.channels {
                args.extend(["-ac".to_string(), channels.to_string()]);
            }
            if let Some(depth) = options.bit_depth {
                args.extend(sample_format_args(audio, depth));
            }
            if let Some(gain) = options.gain_percent {
                args.extend([
                    "-af".to_string(),
                    format!("volume={}", gain as f64 / 100.0),
                ]);
            }
        }

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ]);

        // Extra args
        args.extend(self.config.extra_args.iter().cloned());

        // Output
        args.push("-y".to_string());
        args.push(job.output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            #[serde(default)]
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            #[serde(default)]
            format_name: Option<String>,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: Option<String>,
            codec_name: Option<String>,
            sample_rate: Option<String>,
            channels: Option<u8>,
            width: Option<u32>,
            height: Option<u32>,
            #[serde(default)]
            disposition: ProbeDisposition,
        }

        #[derive(Deserialize, Default)]
        struct ProbeDisposition {
            #[serde(default)]
            attached_pic: u8,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            ConverterError::unreadable(path, format!("Failed to parse ffprobe output: {}", e))
        })?;

        let format = probe
            .format
            .ok_or_else(|| ConverterError::unreadable(path, "no container information"))?;

        let audio_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        // cover art shows up as a single-frame video stream
        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0);

        let category = match (video_stream, audio_stream) {
            (Some(_), _) => MediaCategory::Video,
            (None, Some(_)) => MediaCategory::Audio,
            (None, None) => {
                return Err(ConverterError::unreadable(
                    path,
                    "no audio or video streams",
                ))
            }
        };

        let duration_secs = format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok());

        let size_bytes = format
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let format_name = format
            .format_name
            .as_deref()
            .and_then(|f| f.split(',').next())
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            category,
            duration_secs,
            size_bytes,
            format: format_name.to_string(),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            audio_sample_rate: audio_stream
                .and_then(|s| s.sample_rate.as_ref())
                .and_then(|r| r.parse::<u32>().ok()),
            audio_channels: audio_stream.and_then(|s| s.channels),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
        })
    }

    async fn check_binary(&self, program: &Path) -> Result<(), ConverterError> {
        let output = Command::new(program)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ConverterError::spawn(program.display().to_string(), e.to_string()))?;

        if !output.status.success() {
            return Err(ConverterError::spawn(
                program.display().to_string(),
                format!("-version exited with {}", output.status),
            ));
        }
        Ok(())
    }
}

/// `-sample_fmt` for a lossless codec; PCM encodes the width in its name.
fn sample_format_args(codec: AudioCodec, depth: u8) -> Vec<String> {
    let wide = depth > 16;
    let fmt = match codec {
        AudioCodec::Flac if wide => "s32",
        AudioCodec::Flac => "s16",
        AudioCodec::Alac if wide => "s32p",
        AudioCodec::Alac => "s16p",
        _ => return Vec::new(),
    };
    let mut args = vec!["-sample_fmt".to_string(), fmt.to_string()];
    if depth == 24 {
        args.extend(["-bits_per_raw_sample".to_string(), "24".to_string()]);
    }
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if !path.is_file() {
            return Err(ConverterError::unreadable(path, "file not found"));
        }

        let run = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = timeout(self.config.probe_timeout(), run)
            .await
            .map_err(|_| {
                ConverterError::unreadable(
                    path,
                    format!("ffprobe timed out after {}s", self.config.probe_timeout_secs),
                )
            })?
            .map_err(|e| {
                ConverterError::spawn(self.config.ffprobe_path.display().to_string(), e.to_string())
            })?;

        if !output.status.success() {
            return Err(ConverterError::unreadable(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn start(&self, job: &TranscodeJob) -> Result<ProcessHandle, ConverterError> {
        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(job);
        debug!(
            job_id = %job.job_id,
            command = %format!("{} {}", self.config.ffmpeg_path.display(), args.join(" ")),
            "Spawning ffmpeg"
        );

        let mut command = Command::new(&self.config.ffmpeg_path);
        command.args(&args);
        spawn_supervised(
            command,
            &job.job_id,
            self.config.terminate_grace(),
            self.config.diagnostic_tail_lines,
        )
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        self.check_binary(&self.config.ffmpeg_path).await?;
        self.check_binary(&self.config.ffprobe_path).await
    }
}
