//! Rules that materialize dependent-step commands from analysis facts.
//!
//! A dependent step's concrete command cannot be written until the
//! previous step has run. Each rule here is a pure, serializable function
//! `(facts, probed duration) -> Option<ToolCommand>`; `None` means the
//! facts left nothing to do, which the executor records as a trivially
//! successful step rather than an error.

use serde::{Deserialize, Serialize};

use crate::facts::{AnalysisFacts, SilenceSpan};
use crate::step::ToolCommand;

/// Segments shorter than this are dropped by the keep rule.
pub const MIN_SEGMENT_SECS: f64 = 0.01;

/// Compute the keep-segments between detected silences.
///
/// One segment per gap between consecutive silence intervals, padded by
/// `pad` seconds on both sides and clipped to `[0, total]`, plus a final
/// segment from the last silence to the end of the input. With no
/// silences at all the whole input is kept.
pub fn keep_segments(silences: &[SilenceSpan], total: f64, pad: f64) -> Vec<(f64, f64)> {
    let mut keeps = Vec::new();
    let mut last_end = 0.0_f64;

    for span in silences {
        let s = if last_end > 0.0 {
            (last_end - pad).max(0.0)
        } else {
            0.0
        };
        let e = (span.start + pad).min(total);
        if e - s > MIN_SEGMENT_SECS {
            keeps.push((s, e));
        }
        last_end = span.end;
    }

    let s = (last_end - pad).max(0.0);
    if total - s > MIN_SEGMENT_SECS {
        keeps.push((s, total));
    }

    keeps
}

/// Re-encode keeping only the loud segments, via select/aselect filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceCutRule {
    pub input: String,
    pub output: String,
    /// Padding kept around each silence boundary, seconds.
    pub pad: f64,
}

impl SilenceCutRule {
    fn materialize(&self, facts: &AnalysisFacts, total: Option<f64>) -> Option<ToolCommand> {
        let total = total?;
        let keeps = keep_segments(&facts.silences, total, self.pad);
        if keeps.is_empty() {
            return None;
        }

        let expr: Vec<String> = keeps
            .iter()
            .map(|(s, e)| format!("between(t,{:.4},{:.4})", s, e))
            .collect();
        let expr = expr.join("+");

        Some(ToolCommand::new(
            "ffmpeg",
            [
                "-y".to_string(),
                "-i".to_string(),
                self.input.clone(),
                "-vf".to_string(),
                format!("select='{expr}',setpts=N/FRAME_RATE/TB"),
                "-af".to_string(),
                format!("aselect='{expr}',asetpts=N/SR/TB"),
                self.output.clone(),
            ],
        ))
    }
}

/// Split the input at detected scene changes using the segment muxer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSplitRule {
    pub input: String,
    /// Output pattern, e.g. `scene_%03d.mp4`.
    pub out_pattern: String,
}

impl SceneSplitRule {
    fn materialize(&self, facts: &AnalysisFacts) -> Option<ToolCommand> {
        if facts.scene_times.is_empty() {
            return None;
        }

        let times: Vec<String> = facts.scene_times.iter().map(|t| t.to_string()).collect();

        Some(ToolCommand::new(
            "ffmpeg",
            [
                "-i",
                self.input.as_str(),
                "-f",
                "segment",
                "-segment_times",
                times.join(",").as_str(),
                "-reset_timestamps",
                "1",
                "-c",
                "copy",
                "-y",
                self.out_pattern.as_str(),
            ],
        ))
    }
}

/// A named command-construction rule for a dependent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DeriveRule {
    SilenceCut(SilenceCutRule),
    SceneSplit(SceneSplitRule),
}

impl DeriveRule {
    /// Materialize the concrete command, or `None` when the facts leave
    /// nothing to do (no scenes found, or no probed duration to clip
    /// keep-segments against).
    pub fn materialize(&self, facts: &AnalysisFacts, total: Option<f64>) -> Option<ToolCommand> {
        match self {
            DeriveRule::SilenceCut(rule) => rule.materialize(facts, total),
            DeriveRule::SceneSplit(rule) => rule.materialize(facts),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            DeriveRule::SilenceCut(_) => "silence_cut",
            DeriveRule::SceneSplit(_) => "scene_split",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_segments_single_silence() {
        // One silence from 2.0 to 5.0 over a 10 second input, 0.1s pad.
        let silences = vec![SilenceSpan::new(2.0, 5.0)];
        let keeps = keep_segments(&silences, 10.0, 0.1);
        assert_eq!(keeps, vec![(0.0, 2.1), (4.9, 10.0)]);
    }

    #[test]
    fn test_keep_segments_no_silence_keeps_everything() {
        let keeps = keep_segments(&[], 10.0, 0.1);
        assert_eq!(keeps, vec![(0.0, 10.0)]);
    }

    #[test]
    fn test_keep_segments_clipped_to_input() {
        // Silence running past the end: pad must not push past total.
        let silences = vec![SilenceSpan::new(9.95, 12.0)];
        let keeps = keep_segments(&silences, 10.0, 0.5);
        assert_eq!(keeps, vec![(0.0, 10.0)]);
        // And a silence covering the whole tail leaves only the head.
        let silences = vec![SilenceSpan::new(3.0, 10.0)];
        let keeps = keep_segments(&silences, 10.0, 0.0);
        assert_eq!(keeps, vec![(0.0, 3.0)]);
    }

    #[test]
    fn test_keep_segments_drops_slivers() {
        // Back-to-back silences leave a gap shorter than the minimum.
        let silences = vec![SilenceSpan::new(0.0, 4.0), SilenceSpan::new(4.005, 8.0)];
        let keeps = keep_segments(&silences, 10.0, 0.0);
        assert_eq!(keeps, vec![(8.0, 10.0)]);
    }

    #[test]
    fn test_silence_cut_materializes_select_filter() {
        let rule = DeriveRule::SilenceCut(SilenceCutRule {
            input: "in.mp4".into(),
            output: "out.mp4".into(),
            pad: 0.1,
        });
        let facts = AnalysisFacts {
            silences: vec![SilenceSpan::new(2.0, 5.0)],
            ..Default::default()
        };
        let cmd = rule.materialize(&facts, Some(10.0)).unwrap();
        assert_eq!(cmd.program, "ffmpeg");
        let vf = cmd.args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(
            cmd.args[vf + 1],
            "select='between(t,0.0000,2.1000)+between(t,4.9000,10.0000)',setpts=N/FRAME_RATE/TB"
        );
        let af = cmd.args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(
            cmd.args[af + 1],
            "aselect='between(t,0.0000,2.1000)+between(t,4.9000,10.0000)',asetpts=N/SR/TB"
        );
    }

    #[test]
    fn test_silence_cut_needs_probed_duration() {
        let rule = DeriveRule::SilenceCut(SilenceCutRule {
            input: "in.mp4".into(),
            output: "out.mp4".into(),
            pad: 0.1,
        });
        let facts = AnalysisFacts {
            silences: vec![SilenceSpan::new(2.0, 5.0)],
            ..Default::default()
        };
        assert!(rule.materialize(&facts, None).is_none());
    }

    #[test]
    fn test_scene_split_materializes_segment_times() {
        let rule = DeriveRule::SceneSplit(SceneSplitRule {
            input: "in.mp4".into(),
            out_pattern: "scene_%03d.mp4".into(),
        });
        let facts = AnalysisFacts {
            scene_times: vec![3.2, 7.5, 12.0],
            ..Default::default()
        };
        let cmd = rule.materialize(&facts, None).unwrap();
        let pos = cmd.args.iter().position(|a| a == "-segment_times").unwrap();
        assert_eq!(cmd.args[pos + 1], "3.2,7.5,12");
        assert!(cmd.args.contains(&"-reset_timestamps".to_string()));
    }

    #[test]
    fn test_scene_split_without_scenes_is_nothing_to_do() {
        let rule = DeriveRule::SceneSplit(SceneSplitRule {
            input: "in.mp4".into(),
            out_pattern: "scene_%03d.mp4".into(),
        });
        assert!(rule.materialize(&AnalysisFacts::default(), Some(30.0)).is_none());
    }
}
