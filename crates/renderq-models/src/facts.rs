//! Analysis facts extracted from tool output.
//!
//! An analysis step does not transform media; its value is the ordered
//! list of timestamps scraped from its output. Those facts are the sole
//! input to materializing the next dependent step's command.

use serde::{Deserialize, Serialize};

/// One detected silence interval, in seconds from stream start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceSpan {
    pub start: f64,
    pub end: f64,
}

impl SilenceSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Facts accumulated over one analysis step's output stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFacts {
    /// Matched silence start/end pairs, in output order.
    #[serde(default)]
    pub silences: Vec<SilenceSpan>,
    /// Scene-change timestamps, in output order.
    #[serde(default)]
    pub scene_times: Vec<f64>,
}

impl AnalysisFacts {
    pub fn is_empty(&self) -> bool {
        self.silences.is_empty() && self.scene_times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_duration() {
        assert_eq!(SilenceSpan::new(2.0, 5.0).duration(), 3.0);
        assert_eq!(SilenceSpan::new(5.0, 2.0).duration(), 0.0);
    }

    #[test]
    fn test_empty_facts() {
        assert!(AnalysisFacts::default().is_empty());
        let facts = AnalysisFacts {
            scene_times: vec![1.5],
            ..Default::default()
        };
        assert!(!facts.is_empty());
    }
}
