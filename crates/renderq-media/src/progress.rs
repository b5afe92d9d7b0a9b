//! Parsing of tool output: elapsed-time progress and analysis markers.
//!
//! Pure functions and small accumulators over text lines, with no process
//! state. Unrecognized lines are ignored and malformed numeric tokens are
//! dropped; nothing in here can fail a running step.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use renderq_models::timecode::parse_timecode;
use renderq_models::{AnalysisFacts, SilenceSpan};

static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+:\d+:\d+(?:\.\d+)?)").unwrap());
static SILENCE_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_start:\s*(\d+(?:\.\d+)?)").unwrap());
static SILENCE_END_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_end:\s*(\d+(?:\.\d+)?)").unwrap());
static SCENE_TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pts_time:\s*(\d+(?:\.\d+)?)").unwrap());

/// Extract the elapsed-time token (`time=HH:MM:SS.frac`) as seconds.
pub fn parse_time_token(line: &str) -> Option<f64> {
    let caps = TIME_REGEX.captures(line)?;
    parse_timecode(&caps[1]).ok()
}

/// Turns a stream of output lines into a monotone percentage.
///
/// Needs the input's total duration, probed beforehand; without it every
/// observation is skipped silently, which is not an error.
#[derive(Debug)]
pub struct ProgressTracker {
    total_duration: Option<f64>,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    pub fn new(total_duration: Option<f64>) -> Self {
        Self {
            total_duration,
            last_percent: None,
        }
    }

    /// Feed one line; returns a percentage only when it advanced.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        let total = self.total_duration?;
        if total <= 0.0 {
            return None;
        }
        let elapsed = parse_time_token(line)?;
        let percent = ((elapsed / total) * 100.0).clamp(0.0, 100.0) as u8;
        match self.last_percent {
            Some(last) if percent <= last => None,
            _ => {
                self.last_percent = Some(percent);
                Some(percent)
            }
        }
    }

    /// Highest percentage reported so far.
    pub fn percent(&self) -> Option<u8> {
        self.last_percent
    }
}

/// Accumulates analysis markers across an analysis step's output.
#[derive(Debug, Default)]
pub struct AnalysisCollector {
    silence_starts: Vec<f64>,
    silence_ends: Vec<f64>,
    scene_times: Vec<f64>,
}

impl AnalysisCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, collecting any markers it carries.
    pub fn observe(&mut self, line: &str) {
        if let Some(caps) = SILENCE_START_REGEX.captures(line) {
            if let Ok(v) = caps[1].parse::<f64>() {
                self.silence_starts.push(v);
            } else {
                trace!("dropping malformed silence_start token: {line}");
            }
        }
        if let Some(caps) = SILENCE_END_REGEX.captures(line) {
            if let Ok(v) = caps[1].parse::<f64>() {
                self.silence_ends.push(v);
            } else {
                trace!("dropping malformed silence_end token: {line}");
            }
        }
        if let Some(caps) = SCENE_TIME_REGEX.captures(line) {
            if let Ok(v) = caps[1].parse::<f64>() {
                self.scene_times.push(v);
            } else {
                trace!("dropping malformed pts_time token: {line}");
            }
        }
    }

    /// Pair up the collected markers into facts.
    ///
    /// Silence starts pair with ends in order; an unmatched trailing
    /// start is dropped.
    pub fn into_facts(self) -> AnalysisFacts {
        let silences = self
            .silence_starts
            .into_iter()
            .zip(self.silence_ends)
            .map(|(start, end)| SilenceSpan::new(start, end))
            .collect();
        AnalysisFacts {
            silences,
            scene_times: self.scene_times,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_token() {
        assert_eq!(
            parse_time_token("frame= 120 fps= 30 time=00:00:05.00 bitrate=..."),
            Some(5.0)
        );
        assert_eq!(parse_time_token("out_time=01:02:03.500000"), Some(3723.5));
        assert_eq!(parse_time_token("no token here"), None);
        assert_eq!(parse_time_token("time=garbage"), None);
    }

    #[test]
    fn test_tracker_monotone_and_bounded() {
        let mut tracker = ProgressTracker::new(Some(10.0));
        assert_eq!(tracker.observe("time=00:00:02.50"), Some(25));
        // Repeat and regression both report nothing.
        assert_eq!(tracker.observe("time=00:00:02.50"), None);
        assert_eq!(tracker.observe("time=00:00:01.00"), None);
        assert_eq!(tracker.observe("time=00:00:09.00"), Some(90));
        // Past the end clamps to 100.
        assert_eq!(tracker.observe("time=00:00:25.00"), Some(100));
        assert_eq!(tracker.percent(), Some(100));
    }

    #[test]
    fn test_tracker_without_total_stays_silent() {
        let mut tracker = ProgressTracker::new(None);
        assert_eq!(tracker.observe("time=00:00:05.00"), None);
        assert_eq!(tracker.percent(), None);

        let mut tracker = ProgressTracker::new(Some(0.0));
        assert_eq!(tracker.observe("time=00:00:05.00"), None);
    }

    #[test]
    fn test_collector_pairs_silences() {
        let mut collector = AnalysisCollector::new();
        collector.observe("[silencedetect @ 0x55] silence_start: 2.0");
        collector.observe("[silencedetect @ 0x55] silence_end: 5.0 | silence_duration: 3.0");
        collector.observe("[silencedetect @ 0x55] silence_start: 8.25");

        let facts = collector.into_facts();
        // The trailing unmatched start is dropped.
        assert_eq!(facts.silences, vec![SilenceSpan::new(2.0, 5.0)]);
    }

    #[test]
    fn test_collector_scene_times() {
        let mut collector = AnalysisCollector::new();
        collector.observe("[Parsed_metadata_1 @ 0x55] frame:96  pts:49152  pts_time:3.2");
        collector.observe("lavfi.scene_score=0.53");
        collector.observe("[Parsed_metadata_1 @ 0x55] frame:225 pts:115200 pts_time:7.5");

        let facts = collector.into_facts();
        assert_eq!(facts.scene_times, vec![3.2, 7.5]);
        assert!(facts.silences.is_empty());
    }

    #[test]
    fn test_collector_ignores_malformed_tokens() {
        let mut collector = AnalysisCollector::new();
        collector.observe("silence_start: oops");
        collector.observe("pts_time:");
        collector.observe("completely unrelated line");
        assert!(collector.into_facts().is_empty());
    }
}
