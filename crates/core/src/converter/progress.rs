//! Diagnostic stream decoding.
//!
//! The engine runs with `-progress pipe:2`, which interleaves key=value
//! blocks (`out_time_us=`, `out_time_ms=`, `out_time=`) with regular log
//! lines. Classic stats lines (`time=HH:MM:SS.xx`) are accepted as well.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Upper bound reported while the process is still running.
pub const RUNNING_CAP: f64 = 0.999;

/// Asymptote for indeterminate progress.
const INDETERMINATE_CEILING: f64 = 0.95;
/// Fraction of the remaining distance covered per heartbeat.
const INDETERMINATE_STEP: f64 = 0.05;

static MICROS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^out_time_(?:us|ms)=(-?\d+)\s*$").expect("valid regex"));
static CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^out_time=|\btime=)(-?)(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex")
});

/// Extracts the elapsed output time in seconds from one diagnostic line.
pub fn parse_elapsed_secs(line: &str) -> Option<f64> {
    let line = line.trim();

    if let Some(caps) = MICROS_RE.captures(line) {
        // out_time_ms is in microseconds too
        let micros: i64 = caps.get(1)?.as_str().parse().ok()?;
        return (micros >= 0).then(|| micros as f64 / 1_000_000.0);
    }

    let caps = CLOCK_RE.captures(line)?;
    if !caps.get(1)?.as_str().is_empty() {
        return None;
    }
    let hours: f64 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(3)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(4)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Maps diagnostic lines to a monotonic completion fraction.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    last_elapsed: Option<f64>,
    fraction: f64,
}

impl ProgressParser {
    /// Creates a parser for a file of the given probed duration.
    ///
    /// A zero, negative or missing duration switches to indeterminate mode.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            last_elapsed: None,
            fraction: 0.0,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.duration_secs.is_none()
    }

    /// Latest fraction reported.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Consumes one line. Returns the current fraction when the line carried
    /// a time marker, `None` for unrelated or unparseable lines.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let elapsed = parse_elapsed_secs(line)?;

        match self.duration_secs {
            Some(duration) => {
                let fraction = (elapsed / duration).clamp(0.0, RUNNING_CAP);
                self.fraction = self.fraction.max(fraction);
            }
            None => {
                // one heartbeat per distinct elapsed value; a progress block
                // repeats the same time in several keys
                let advanced = self.last_elapsed.map_or(true, |last| elapsed > last);
                if advanced {
                    self.fraction += (INDETERMINATE_CEILING - self.fraction) * INDETERMINATE_STEP;
                }
            }
        }

        self.last_elapsed = Some(elapsed);
        Some(self.fraction)
    }
}
