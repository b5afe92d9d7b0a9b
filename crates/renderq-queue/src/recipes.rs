//! Canonical chain recipes.
//!
//! Ready-made step chains for the multi-step operations the toolbox
//! ships with. Recipes live on the command-builder boundary: the queue
//! runs whatever they emit and never validates flag semantics.

use std::path::PathBuf;

use renderq_models::{
    CutListSpec, DeriveRule, Job, SceneSplitRule, SilenceCutRule, Step, ToolCommand,
};

pub const DEFAULT_NOISE_DB: i32 = -30;
pub const DEFAULT_MIN_SILENCE: f64 = 0.5;
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;
pub const DEFAULT_GIF_FPS: u32 = 15;
pub const DEFAULT_GIF_WIDTH: u32 = 480;

/// A named, ready-to-enqueue chain.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub label: String,
    pub steps: Vec<Step>,
    /// Intermediate files the chain leaves behind, removed when the job
    /// reaches a terminal state.
    pub temp_artifacts: Vec<PathBuf>,
}

impl Recipe {
    pub fn into_job(self) -> Job {
        Job::new(self.label, self.steps).with_artifacts(self.temp_artifacts)
    }
}

fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Two-pass x264 encode at a target video bitrate (kbit/s).
///
/// Pass 1 analyzes into `ffmpeg2pass-0.log` and discards its output;
/// pass 2 reads the log and writes the real file.
pub fn two_pass_encode(input: &str, output: &str, bitrate_k: u32) -> Recipe {
    let bitrate = format!("{bitrate_k}k");
    let pass1 = ToolCommand::new(
        "ffmpeg",
        [
            "-y",
            "-i",
            input,
            "-c:v",
            "libx264",
            "-b:v",
            bitrate.as_str(),
            "-pass",
            "1",
            "-an",
            "-f",
            "null",
            null_sink(),
        ],
    );
    let pass2 = ToolCommand::new(
        "ffmpeg",
        [
            "-y",
            "-i",
            input,
            "-c:v",
            "libx264",
            "-b:v",
            bitrate.as_str(),
            "-pass",
            "2",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            output,
        ],
    );

    Recipe {
        label: format!("Two-pass encode {output}"),
        steps: vec![Step::run(pass1), Step::run(pass2)],
        temp_artifacts: vec![
            PathBuf::from("ffmpeg2pass-0.log"),
            PathBuf::from("ffmpeg2pass-0.log.mbtree"),
        ],
    }
}

/// High-quality animated GIF via a palette pass and a paletteuse pass.
pub fn palette_gif(input: &str, output: &str, fps: u32, width: u32) -> Recipe {
    let filters = format!("fps={fps},scale={width}:-1:flags=lanczos");
    let palette_vf = format!("{filters},palettegen");
    let gif_filter = format!("{filters} [x]; [x][1:v] paletteuse");

    let palette = ToolCommand::new(
        "ffmpeg",
        ["-i", input, "-vf", palette_vf.as_str(), "-y", "palette.png"],
    );
    let gif = ToolCommand::new(
        "ffmpeg",
        [
            "-i",
            input,
            "-i",
            "palette.png",
            "-filter_complex",
            gif_filter.as_str(),
            "-y",
            output,
        ],
    );

    Recipe {
        label: format!("GIF {output}"),
        steps: vec![Step::run(palette), Step::run(gif)],
        temp_artifacts: vec![PathBuf::from("palette.png")],
    }
}

/// Two-pass vidstab stabilization.
pub fn stabilize(input: &str, output: &str) -> Recipe {
    let detect = ToolCommand::new(
        "ffmpeg",
        [
            "-y",
            "-i",
            input,
            "-vf",
            "vidstabdetect=shakiness=10:accuracy=15:result=transforms.trf",
            "-f",
            "null",
            null_sink(),
        ],
    );
    let transform = ToolCommand::new(
        "ffmpeg",
        [
            "-y",
            "-i",
            input,
            "-vf",
            "vidstabtransform=smoothing=15:input=transforms.trf",
            "-c:v",
            "libx264",
            "-crf",
            "18",
            "-pix_fmt",
            "yuv420p",
            output,
        ],
    );

    Recipe {
        label: format!("Stabilize {output}"),
        steps: vec![Step::run(detect), Step::run(transform)],
        temp_artifacts: vec![PathBuf::from("transforms.trf")],
    }
}

fn silence_analysis(input: &str, noise_db: i32, min_silence: f64) -> ToolCommand {
    ToolCommand::new(
        "ffmpeg",
        [
            "-i",
            input,
            "-af",
            format!("silencedetect=noise={noise_db}dB:d={min_silence}").as_str(),
            "-f",
            "null",
            "-",
        ],
    )
}

/// Detect silences and write a cut-list document next to the input.
pub fn silence_cutlist(input: &str, noise_db: i32, min_silence: f64, pad: f64) -> Recipe {
    Recipe {
        label: format!("Smart cut list {input}"),
        steps: vec![
            Step::analyze(silence_analysis(input, noise_db, min_silence)),
            Step::write_cut_list(CutListSpec::new(input, pad)),
        ],
        temp_artifacts: Vec::new(),
    }
}

/// Detect silences, then re-encode keeping only the loud segments.
pub fn silence_cut(input: &str, output: &str, noise_db: i32, min_silence: f64, pad: f64) -> Recipe {
    Recipe {
        label: format!("Silence cut {output}"),
        steps: vec![
            Step::analyze(silence_analysis(input, noise_db, min_silence)),
            Step::derive(DeriveRule::SilenceCut(SilenceCutRule {
                input: input.to_string(),
                output: output.to_string(),
                pad,
            })),
        ],
        temp_artifacts: Vec::new(),
    }
}

/// Detect scene changes, then split at them with the segment muxer.
pub fn scene_split(input: &str, out_pattern: &str, threshold: f64) -> Recipe {
    let scan = ToolCommand::new(
        "ffmpeg",
        [
            "-i",
            input,
            "-vf",
            format!("select='gt(scene,{threshold})',metadata=mode=print").as_str(),
            "-f",
            "null",
            "-",
        ],
    );

    Recipe {
        label: format!("Scene split {input}"),
        steps: vec![
            Step::analyze(scan),
            Step::derive(DeriveRule::SceneSplit(SceneSplitRule {
                input: input.to_string(),
                out_pattern: out_pattern.to_string(),
            })),
        ],
        temp_artifacts: Vec::new(),
    }
}
