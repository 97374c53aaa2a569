//! Parsing of the retrieval tool's live status stream.
//!
//! `wget --progress=bar:force` writes lines shaped like
//!
//! ```text
//! archive.tar.gz    45%[===========>        ] 12.3M  892KB/s   eta 15s
//! ```
//!
//! to stderr, redrawn with carriage returns. Each line that matches the
//! grammar becomes one [`ProgressSample`]; anything else is diagnostic text
//! the retriever keeps for error reporting.

use once_cell::sync::Lazy;
use regex::Regex;

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+)%\[([=>\s]*)\]\s+([0-9.,]+[KMGT]?)\s+([0-9.,]+[KMGT]?B/s)\s*(?:eta\s+([0-9hms ]+))?",
    )
    .expect("progress grammar regex")
});

/// One normalized observation of an in-flight retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// Completion in `[0.0, 1.0]`.
    pub fraction_complete: f64,
    /// The size token as printed by the tool, e.g. `12.3M`.
    pub size: String,
    /// The rate token as printed by the tool, e.g. `892KB/s`.
    pub rate: String,
    /// The ETA token with the `eta` prefix stripped, e.g. `15s`.
    pub eta: Option<String>,
    /// `size` decoded to bytes, when the token is decodable.
    pub bytes_transferred: Option<u64>,
    /// `rate` decoded to bytes per second, when decodable.
    pub rate_bytes_per_sec: Option<u64>,
}

/// Try to interpret one output line as a progress report.
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    // Cheap gate before the regex, mirroring the shape of real bar lines.
    if !line.contains('%') || !(line.contains('=') || line.to_ascii_lowercase().contains("eta")) {
        return None;
    }

    let caps = PROGRESS_RE.captures(line)?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    let size = caps.get(3)?.as_str().to_string();
    let rate = caps.get(4)?.as_str().to_string();
    let eta = caps
        .get(5)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    let bytes_transferred = decode_size_token(&size);
    let rate_bytes_per_sec = decode_size_token(rate.trim_end_matches("/s"));

    Some(ProgressSample {
        fraction_complete: percent / 100.0,
        size,
        rate,
        eta,
        bytes_transferred,
        rate_bytes_per_sec,
    })
}

/// Decode tokens like `12.3M`, `892KB`, `1,024K` into bytes.
pub fn decode_size_token(token: &str) -> Option<u64> {
    let cleaned = token.replace(',', "");
    let trimmed = cleaned.trim().trim_end_matches(['B', 'b']);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K') | Some('k') => (&trimmed[..trimmed.len() - 1], 1024f64),
        Some('M') | Some('m') => (&trimmed[..trimmed.len() - 1], 1024f64 * 1024.0),
        Some('G') | Some('g') => (&trimmed[..trimmed.len() - 1], 1024f64 * 1024.0 * 1024.0),
        Some('T') | Some('t') => (&trimmed[..trimmed.len() - 1], 1024f64 * 1024.0 * 1024.0 * 1024.0),
        _ => (trimmed, 1f64),
    };
    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Receiver for normalized progress samples.
///
/// Injected into the retriever by the orchestrator's caller; there is no
/// process-wide progress state.
pub trait ProgressObserver {
    fn on_sample(&mut self, sample: &ProgressSample);

    /// Called once when the retrieval finishes, successfully or not.
    fn on_finish(&mut self) {}
}

/// Observer that ignores everything.
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn on_sample(&mut self, _sample: &ProgressSample) {}
}
