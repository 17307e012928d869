//! Progress parser for yt-dlp output.
//!
//! yt-dlp has no structured IPC, so its free-form output is scraped. The
//! scraping is isolated behind [`OutputClassifier`]: an ordered list of phase
//! markers (substring → coarse phase) and an ordered list of progress rules
//! (regex → handler). Rewording in a new yt-dlp release only touches the
//! tables below.
//!
//! Everything produced here is advisory. Phases never drive the job state
//! machine and progress sizes are textual approximations.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

/// Coarse lifecycle phase inferred from a marker in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchingPage,
    ExtractingStream,
    ResolvingManifest,
    StartingTransfer,
    ConvertingAudio,
    MergingStreams,
}

impl Phase {
    /// Status text pushed to the client.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::FetchingPage => "📄 Downloading webpage...",
            Phase::ExtractingStream => "🔗 Extracting stream URL...",
            Phase::ResolvingManifest => "🧾 Resolving manifest...",
            Phase::StartingTransfer => "⬇️ Starting download...",
            Phase::ConvertingAudio => "🎵 Converting audio...",
            Phase::MergingStreams => "🎬 Merging video and audio...",
        }
    }
}

/// Substring that maps to a phase.
#[derive(Debug, Clone)]
pub struct PhaseMarker {
    pub needle: &'static str,
    pub phase: Phase,
}

/// One parsed transfer-status line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Always within 0..=100
    pub percent: f64,
    /// Total size token as printed, e.g. "10.00MiB"
    pub size: String,
    /// Rate token as printed, e.g. "1.20MiB/s"
    pub speed: String,
    /// percent × numeric part of `size`, re-suffixed with the size's unit letters
    pub downloaded: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

/// Handler turning a rule's captures into an event. `None` rejects the match.
pub type ProgressHandler = fn(&Captures<'_>) -> Option<ProgressEvent>;

/// Regex paired with the handler that interprets its captures.
#[derive(Debug, Clone)]
pub struct ProgressRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub handler: ProgressHandler,
}

/// Result of classifying one chunk of output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Phase(Phase),
    Progress(ProgressEvent),
}

/// Ordered, pluggable classifier for raw output chunks.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    markers: Vec<PhaseMarker>,
    rules: Vec<ProgressRule>,
}

/// `[download]  42.5% of 10.00MiB at 1.20MiB/s ETA 00:05`
/// `[download]   3.0% of ~ 120.50MiB at  2.00MiB/s ETA 01:02 (frag 3/40)`
static DOWNLOAD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[download\]\s+(\d{1,3}(?:\.\d+)?)% of\s+~?\s*([\d.]+[A-Za-z]+)\s+at\s+([\d.]+[A-Za-z]+/s)(?:\s+ETA\s+(\S+))?")
        .expect("Failed to compile download progress regex")
});

fn default_markers() -> Vec<PhaseMarker> {
    vec![
        PhaseMarker {
            needle: "Downloading webpage",
            phase: Phase::FetchingPage,
        },
        PhaseMarker {
            needle: "Extracting URL",
            phase: Phase::ExtractingStream,
        },
        PhaseMarker {
            needle: "Downloading m3u8 information",
            phase: Phase::ResolvingManifest,
        },
        PhaseMarker {
            needle: "Downloading MPD manifest",
            phase: Phase::ResolvingManifest,
        },
        // Post-processors also print "Destination:", so they go first.
        PhaseMarker {
            needle: "[ExtractAudio]",
            phase: Phase::ConvertingAudio,
        },
        PhaseMarker {
            needle: "[Merger]",
            phase: Phase::MergingStreams,
        },
        PhaseMarker {
            needle: "Destination:",
            phase: Phase::StartingTransfer,
        },
    ]
}

impl OutputClassifier {
    /// Classifier with no markers or rules; build it up with `with_*`.
    pub fn empty() -> Self {
        Self {
            markers: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_marker(mut self, needle: &'static str, phase: Phase) -> Self {
        self.markers.push(PhaseMarker { needle, phase });
        self
    }

    pub fn with_rule(mut self, name: &'static str, pattern: Regex, handler: ProgressHandler) -> Self {
        self.rules.push(ProgressRule { name, pattern, handler });
        self
    }

    /// Classify one chunk.
    ///
    /// Emits at most one phase (the first marker, in table order, found in the
    /// chunk) followed by one progress event per rule match. Repeated or
    /// out-of-order percentages pass through unchanged.
    pub fn classify(&self, chunk: &str) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        if let Some(marker) = self.markers.iter().find(|m| chunk.contains(m.needle)) {
            events.push(OutputEvent::Phase(marker.phase));
        }

        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(chunk) {
                match (rule.handler)(&caps) {
                    Some(progress) => events.push(OutputEvent::Progress(progress)),
                    None => log::trace!("Rule {} rejected match: {}", rule.name, &caps[0]),
                }
            }
        }

        events
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            rules: vec![ProgressRule {
                name: "download-line",
                pattern: DOWNLOAD_LINE.clone(),
                handler: download_line_handler,
            }],
        }
    }
}

/// Handler for the standard `[download]` status line.
pub fn download_line_handler(caps: &Captures<'_>) -> Option<ProgressEvent> {
    let percent = caps.get(1)?.as_str().parse::<f64>().ok()?.clamp(0.0, 100.0);
    let size = caps.get(2)?.as_str().to_string();
    let speed = caps.get(3)?.as_str().to_string();
    let eta = caps.get(4).map(|m| m.as_str().to_string());
    let downloaded = approximate_downloaded(percent, &size)?;

    Some(ProgressEvent {
        percent,
        size,
        speed,
        downloaded,
        eta,
    })
}

/// `percent / 100 × number(size)` formatted with two decimals and suffixed
/// with the size token's own unit letters. No unit conversion takes place.
pub fn approximate_downloaded(percent: f64, size: &str) -> Option<String> {
    let numeric: String = size.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let unit: String = size.chars().filter(|c| !c.is_ascii_digit() && *c != '.').collect();
    let total = numeric.parse::<f64>().ok()?;
    Some(format!("{:.2}{}", percent / 100.0 * total, unit))
}
