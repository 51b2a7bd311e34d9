//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::converter::{
    ConverterError, MediaCategory, MediaInfo, ProcessDriver, ProcessExit, ProcessHandle,
    TranscodeJob, Transcoder,
};

/// How a scripted file ends.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Emit progress, write the output, exit 0.
    Succeed,
    /// Probe fails with `UnreadableMedia`.
    Unreadable,
    /// Start fails with `Spawn`.
    SpawnError,
    /// Emit progress, then exit with this code.
    EncodeError(i32),
    /// Emit progress up to the given fraction, then run until terminated.
    Hold(f64),
}

/// Scripted behavior for one file.
#[derive(Debug, Clone)]
pub struct MockScript {
    pub outcome: MockOutcome,
    /// Reported duration; `None` exercises indeterminate progress.
    pub duration_secs: Option<f64>,
    /// Fractions of the duration emitted as progress markers.
    pub progress: Vec<f64>,
    /// Pause between two progress markers.
    pub step_delay: Duration,
    /// Bytes written as the output on success.
    pub output: Vec<u8>,
    /// How long a held process takes to exit once terminated.
    pub stop_delay: Duration,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            outcome: MockOutcome::Succeed,
            duration_secs: Some(10.0),
            progress: vec![0.25, 0.5, 0.75, 1.0],
            step_delay: Duration::from_millis(5),
            output: b"converted media".to_vec(),
            stop_delay: Duration::ZERO,
        }
    }
}

impl MockScript {
    pub fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            ..Default::default()
        }
    }
}

/// Mock implementation of the Transcoder trait.
///
/// Provides controllable behavior for testing:
/// - Scripted probe results and progress lines per file
/// - Failure injection (unreadable, spawn, encode)
/// - "Hold" processes that only stop when terminated
/// - Concurrency tracking for lane assertions
///
/// Scripts are keyed by a path suffix, so `"a.wav"` or `"album/a.wav"`
/// both match `/srv/uploads/album/a.wav`.
///
/// # Example
///
/// ```rust,ignore
/// use avcnv_core::testing::{MockOutcome, MockTranscoder};
///
/// let transcoder = MockTranscoder::new();
/// transcoder.fail_encode("b.wav", 1).await;
/// transcoder.hold("c.wav", 0.42).await;
///
/// // ... submit a task, then:
/// transcoder.wait_until_held("c.wav").await;
/// ```
#[derive(Debug)]
pub struct MockTranscoder {
    scripts: Arc<RwLock<HashMap<PathBuf, MockScript>>>,
    default_script: Arc<RwLock<MockScript>>,
    started: Arc<RwLock<Vec<TranscodeJob>>>,
    probed: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    held: Arc<watch::Sender<Vec<PathBuf>>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    /// Create a new mock transcoder; every file succeeds by default.
    pub fn new() -> Self {
        let (held, _) = watch::channel(Vec::new());
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            default_script: Arc::new(RwLock::new(MockScript::default())),
            started: Arc::new(RwLock::new(Vec::new())),
            probed: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            held: Arc::new(held),
        }
    }

    /// Set the script for files whose path ends with `name`.
    pub async fn script(&self, name: impl AsRef<Path>, script: MockScript) {
        self.scripts
            .write()
            .await
            .insert(name.as_ref().to_path_buf(), script);
    }

    /// Set the script used for files without one.
    pub async fn set_default_script(&self, script: MockScript) {
        *self.default_script.write().await = script;
    }

    pub async fn fail_probe(&self, name: impl AsRef<Path>) {
        self.script(name, MockScript::with_outcome(MockOutcome::Unreadable))
            .await;
    }

    pub async fn fail_spawn(&self, name: impl AsRef<Path>) {
        self.script(name, MockScript::with_outcome(MockOutcome::SpawnError))
            .await;
    }

    pub async fn fail_encode(&self, name: impl AsRef<Path>, code: i32) {
        self.script(name, MockScript::with_outcome(MockOutcome::EncodeError(code)))
            .await;
    }

    /// Keep the file's process running at `fraction` until it is terminated.
    pub async fn hold(&self, name: impl AsRef<Path>, fraction: f64) {
        self.script(name, MockScript::with_outcome(MockOutcome::Hold(fraction)))
            .await;
    }

    /// Let a held file finish normally the next time it runs.
    pub async fn release(&self, name: impl AsRef<Path>) {
        self.scripts.write().await.remove(name.as_ref());
    }

    /// All jobs started so far, in start order.
    pub async fn started_jobs(&self) -> Vec<TranscodeJob> {
        self.started.read().await.clone()
    }

    /// How many times a file matching `name` was started.
    pub async fn start_count(&self, name: impl AsRef<Path>) -> usize {
        let name = name.as_ref();
        self.started
            .read()
            .await
            .iter()
            .filter(|job| job.input_path.ends_with(name))
            .count()
    }

    pub fn probe_count(&self) -> usize {
        self.probed.load(Ordering::SeqCst)
    }

    /// Processes currently alive.
    pub fn live_processes(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of processes alive at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Resolves once a held file has emitted its progress and is waiting.
    pub async fn wait_until_held(&self, name: impl AsRef<Path>) {
        let name = name.as_ref();
        let mut rx = self.held.subscribe();
        let _ = rx
            .wait_for(|held| held.iter().any(|p| p.ends_with(name)))
            .await;
    }

    async fn script_for(&self, path: &Path) -> MockScript {
        let scripts = self.scripts.read().await;
        match scripts.iter().find(|(key, _)| path.ends_with(key)) {
            Some((_, script)) => script.clone(),
            None => self.default_script.read().await.clone(),
        }
    }

    fn media_info(path: &Path, script: &MockScript) -> MediaInfo {
        let category = MediaCategory::from_path(path).unwrap_or(MediaCategory::Audio);
        let is_video = category == MediaCategory::Video;
        MediaInfo {
            path: path.to_path_buf(),
            category,
            duration_secs: script.duration_secs,
            size_bytes: 1024 * 1024,
            format: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            audio_codec: Some("pcm_s16le".to_string()),
            audio_sample_rate: Some(44100),
            audio_channels: Some(2),
            video_codec: is_video.then(|| "h264".to_string()),
            video_width: is_video.then_some(1920),
            video_height: is_video.then_some(1080),
        }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        self.probed.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(path).await;
        if script.outcome == MockOutcome::Unreadable {
            return Err(ConverterError::unreadable(path, "Invalid data found when processing input"));
        }
        Ok(Self::media_info(path, &script))
    }

    async fn start(&self, job: &TranscodeJob) -> Result<ProcessHandle, ConverterError> {
        let script = self.script_for(&job.input_path).await;
        if script.outcome == MockOutcome::SpawnError {
            return Err(ConverterError::spawn("mock-ffmpeg", "No such file or directory"));
        }

        self.started.write().await.push(job.clone());
        let (handle, driver) = ProcessHandle::channel(job.job_id.clone(), 20);

        let live = Arc::clone(&self.live);
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now, Ordering::SeqCst);

        let process = MockProcess {
            job: job.clone(),
            script,
            live,
            held: Arc::clone(&self.held),
        };
        tokio::spawn(process.run(driver));
        Ok(handle)
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}

/// One scripted process run.
struct MockProcess {
    job: TranscodeJob,
    script: MockScript,
    live: Arc<AtomicUsize>,
    held: Arc<watch::Sender<Vec<PathBuf>>>,
}

impl MockProcess {
    async fn run(self, mut driver: ProcessDriver) {
        let exit = self.drive(&mut driver).await;
        // reaped before the exit becomes visible
        self.live.fetch_sub(1, Ordering::SeqCst);
        driver.finish(exit);
    }

    async fn drive(&self, driver: &mut ProcessDriver) -> ProcessExit {
        let terminated = ProcessExit {
            code: None,
            terminated: true,
        };

        if let Some(parent) = self.job.output_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        // partial artifact, as a real encoder leaves behind
        let _ = tokio::fs::write(&self.job.output_path, b"partial").await;

        // out_time counts output time, so trims shorten the timeline
        let duration = self
            .job
            .options
            .output_duration(self.script.duration_secs)
            .unwrap_or(10.0);
        let limit = match self.script.outcome {
            MockOutcome::Hold(at) => at,
            _ => f64::INFINITY,
        };
        for fraction in self.script.progress.iter().copied() {
            let fraction = fraction.min(limit);
            if !self.script.step_delay.is_zero() {
                tokio::time::sleep(self.script.step_delay).await;
            }
            if driver.stop_requested() {
                return terminated;
            }
            let micros = (fraction * duration * 1_000_000.0) as i64;
            driver.emit(format!("out_time_us={}", micros));
            driver.emit("progress=continue");
            if fraction >= limit {
                break;
            }
        }

        match &self.script.outcome {
            MockOutcome::Succeed => {
                if driver.stop_requested() {
                    return terminated;
                }
                let _ = tokio::fs::write(&self.job.output_path, &self.script.output).await;
                driver.emit("progress=end");
                ProcessExit {
                    code: Some(0),
                    terminated: false,
                }
            }
            MockOutcome::EncodeError(code) => {
                driver.emit("Error while decoding stream #0:0: Invalid data found");
                ProcessExit {
                    code: Some(*code),
                    terminated: false,
                }
            }
            MockOutcome::Hold(_) => {
                let path = self.job.input_path.clone();
                self.held.send_modify(|held| held.push(path.clone()));
                driver.stopped().await;
                if !self.script.stop_delay.is_zero() {
                    tokio::time::sleep(self.script.stop_delay).await;
                }
                self.held.send_modify(|held| held.retain(|p| p != &path));
                terminated
            }
            MockOutcome::Unreadable | MockOutcome::SpawnError => ProcessExit {
                code: Some(1),
                terminated: false,
            },
        }
    }
}
