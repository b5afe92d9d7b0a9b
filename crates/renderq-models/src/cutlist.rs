//! Cut-list (edit decision) documents.
//!
//! Renders keep-segments into a stripped-down Final Cut Pro XML sequence
//! that NLEs (Premiere included) can import. The document references the
//! source file; it never re-encodes anything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Frame rate the sequence timeline is expressed in.
pub const CUTLIST_TIMEBASE: u32 = 30;

/// Where to write a cut-list and how to pad its segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutListSpec {
    /// Source media file the document references.
    pub input: String,
    /// Explicit output path; defaults to `<stem>_cut.xml` next to the input.
    #[serde(default)]
    pub output: Option<String>,
    /// Padding kept around each silence boundary, seconds.
    pub pad: f64,
}

impl CutListSpec {
    pub fn new(input: impl Into<String>, pad: f64) -> Self {
        Self {
            input: input.into(),
            output: None,
            pad,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Resolved output path.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(out) => PathBuf::from(out),
            None => {
                let input = Path::new(&self.input);
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "cut".to_string());
                input.with_file_name(format!("{stem}_cut.xml"))
            }
        }
    }
}

fn to_frames(secs: f64) -> i64 {
    (secs * CUTLIST_TIMEBASE as f64) as i64
}

/// Render keep-segments into an xmeml v4 document.
///
/// Segments land back to back on the sequence timeline; `in`/`out` point
/// into the source at the original positions.
pub fn render_cut_list(source: &Path, total: f64, keeps: &[(f64, f64)]) -> String {
    let filename = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string_lossy().into_owned());

    let absolute = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
    let pathurl = format!(
        "file://localhost/{}",
        urlencoding::encode(&absolute.to_string_lossy()).replace("%2F", "/")
    );

    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE xmeml>
<xmeml version="4">
<sequence id="sequence-1">
    <name>{filename} Cut</name>
    <rate>
        <timebase>{CUTLIST_TIMEBASE}</timebase>
        <ntsc>FALSE</ntsc>
    </rate>
    <media>
        <video>
            <track>
"#
    );

    let mut cursor = 0.0_f64;
    for (i, (start, end)) in keeps.iter().enumerate() {
        let dur = end - start;
        xml.push_str(&format!(
            r#"
                <clipitem id="clip-{i}">
                    <name>{filename}</name>
                    <duration>{}</duration>
                    <rate><timebase>{CUTLIST_TIMEBASE}</timebase></rate>
                    <start>{}</start>
                    <end>{}</end>
                    <in>{}</in>
                    <out>{}</out>
                    <file id="file-1">
                        <name>{filename}</name>
                        <pathurl>{pathurl}</pathurl>
                    </file>
                </clipitem>"#,
            to_frames(total),
            to_frames(cursor),
            to_frames(cursor + dur),
            to_frames(*start),
            to_frames(*end),
        ));
        cursor += dur;
    }

    xml.push_str(
        r#"
            </track>
        </video>
    </media>
</sequence>
</xmeml>"#,
    );

    xml
}
