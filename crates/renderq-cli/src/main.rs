//! Render queue command-line driver.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use renderq_media::probe_duration;
use renderq_models::{Job, Step, ToolCommand};
use renderq_queue::{
    palette_gif, scene_split, silence_cut, silence_cutlist, stabilize, two_pass_encode, JobQueue,
    QueueConfig, QueueEvent, QueueStore, DEFAULT_GIF_FPS, DEFAULT_GIF_WIDTH, DEFAULT_MIN_SILENCE,
    DEFAULT_NOISE_DB, DEFAULT_SCENE_THRESHOLD,
};

/// Audio bitrate the two-pass recipe encodes with.
const TWO_PASS_AUDIO_K: u32 = 128;
/// Target file size when neither --bitrate nor --target-size is given.
const DEFAULT_TARGET_SIZE_MB: f64 = 10.0;

#[derive(Parser, Debug)]
#[command(
    name = "renderq",
    version,
    about = "Sequential render queue for external media tools"
)]
struct Cli {
    /// Queue snapshot file
    #[arg(long, env = "QUEUE_FILE", global = true)]
    queue_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a job without starting it
    Add {
        /// Short description shown in listings
        label: String,

        /// Tool invocation: program followed by its arguments
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required_unless_present = "script",
            conflicts_with = "script"
        )]
        command: Vec<String>,

        /// Multi-line chain, one command or step directive per line
        #[arg(long)]
        script: Option<String>,
    },

    /// Queue a palette-based GIF conversion
    Gif {
        input: String,

        /// Output path, defaults to `<stem>_gif.gif` next to the input
        #[arg(long)]
        output: Option<String>,

        #[arg(long, default_value_t = DEFAULT_GIF_FPS)]
        fps: u32,

        /// Output width in pixels, height follows the aspect ratio
        #[arg(long, default_value_t = DEFAULT_GIF_WIDTH)]
        width: u32,
    },

    /// Queue a two-pass x264 encode targeting a bitrate or file size
    TwoPass {
        input: String,

        /// Output path, defaults to `<stem>_compressed.mp4` next to the input
        #[arg(long)]
        output: Option<String>,

        /// Video bitrate in kbit/s
        #[arg(long, conflicts_with = "target_size")]
        bitrate: Option<u32>,

        /// Target file size in MB, converted to a bitrate via the input duration
        #[arg(long)]
        target_size: Option<f64>,
    },

    /// Queue a two-pass vidstab stabilization
    Stabilize {
        input: String,

        /// Output path, defaults to `<stem>_stabilized.mp4` next to the input
        #[arg(long)]
        output: Option<String>,
    },

    /// Queue silence detection plus a re-encode keeping only the loud parts
    SilenceCut {
        input: String,

        /// Output path, defaults to `<stem>_cut.mp4` next to the input
        #[arg(long)]
        output: Option<String>,

        /// Silence threshold in dB
        #[arg(long, default_value_t = DEFAULT_NOISE_DB)]
        noise_db: i32,

        /// Minimum silence duration in seconds
        #[arg(long, default_value_t = DEFAULT_MIN_SILENCE)]
        min_silence: f64,

        /// Padding kept around loud segments, seconds
        #[arg(long)]
        pad: Option<f64>,
    },

    /// Queue scene detection plus a lossless split at scene changes
    SceneSplit {
        input: String,

        /// Output pattern with a %03d-style counter, defaults to
        /// `scenes/scene_%03d.mp4` next to the input
        #[arg(long)]
        out_pattern: Option<String>,

        /// Scene change score threshold in 0..1
        #[arg(long, default_value_t = DEFAULT_SCENE_THRESHOLD)]
        threshold: f64,
    },

    /// Queue silence detection plus a cut-list document write
    Cutlist {
        input: String,

        /// Silence threshold in dB
        #[arg(long, default_value_t = DEFAULT_NOISE_DB)]
        noise_db: i32,

        /// Minimum silence duration in seconds
        #[arg(long, default_value_t = DEFAULT_MIN_SILENCE)]
        min_silence: f64,

        /// Padding kept around loud segments, seconds
        #[arg(long)]
        pad: Option<f64>,
    },

    /// Run every pending job in order, streaming output to the terminal
    Run {
        /// Suppress raw tool output, keep step and percent lines
        #[arg(long)]
        quiet: bool,
    },

    /// Show the queued jobs
    List,

    /// Remove a pending job
    Remove {
        /// 1-based queue position, as shown by `list`
        position: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = QueueConfig::from_env();
    if let Some(path) = cli.queue_file.clone() {
        config = config.with_queue_file(path);
    }

    let all_done = run_command(cli.command, config).await?;
    if !all_done {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("renderq=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Dispatch one subcommand. Returns `false` when a drain executed jobs
/// and at least one of them did not end Done.
async fn run_command(command: Command, config: QueueConfig) -> Result<bool> {
    let store = QueueStore::new(&config.queue_file);

    match command {
        Command::Add {
            label,
            command,
            script,
        } => {
            let steps = parse_steps(&command, script.as_deref())?;
            push_job(&store, Job::new(label, steps))?;
        }

        Command::Gif {
            input,
            output,
            fps,
            width,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input, "_gif", "gif"));
            push_job(&store, palette_gif(&input, &output, fps, width).into_job())?;
        }

        Command::TwoPass {
            input,
            output,
            bitrate,
            target_size,
        } => {
            let bitrate = resolve_bitrate(&input, bitrate, target_size).await?;
            let output = output.unwrap_or_else(|| default_output(&input, "_compressed", "mp4"));
            push_job(&store, two_pass_encode(&input, &output, bitrate).into_job())?;
        }

        Command::Stabilize { input, output } => {
            let output = output.unwrap_or_else(|| default_output(&input, "_stabilized", "mp4"));
            push_job(&store, stabilize(&input, &output).into_job())?;
        }

        Command::SilenceCut {
            input,
            output,
            noise_db,
            min_silence,
            pad,
        } => {
            let pad = pad.unwrap_or(config.silence_pad);
            let output = output.unwrap_or_else(|| default_output(&input, "_cut", "mp4"));
            push_job(
                &store,
                silence_cut(&input, &output, noise_db, min_silence, pad).into_job(),
            )?;
        }

        Command::SceneSplit {
            input,
            out_pattern,
            threshold,
        } => {
            let pattern = out_pattern.unwrap_or_else(|| default_scene_pattern(&input));
            if let Some(parent) = Path::new(&pattern).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            push_job(&store, scene_split(&input, &pattern, threshold).into_job())?;
        }

        Command::Cutlist {
            input,
            noise_db,
            min_silence,
            pad,
        } => {
            let pad = pad.unwrap_or(config.silence_pad);
            push_job(
                &store,
                silence_cutlist(&input, noise_db, min_silence, pad).into_job(),
            )?;
        }

        Command::Run { quiet } => return run_queue(config, quiet).await,

        Command::List => list_jobs(&store),

        Command::Remove { position } => remove_job(&store, position)?,
    }

    Ok(true)
}

/// Build the step chain for `add`: either the trailing command words or
/// a multi-line `--script` in the snapshot line format.
fn parse_steps(command: &[String], script: Option<&str>) -> Result<Vec<Step>> {
    if let Some(script) = script {
        let mut steps = Vec::new();
        for line in script.lines() {
            if line.trim().is_empty() {
                continue;
            }
            steps.push(Step::parse_line(line)?);
        }
        if steps.is_empty() {
            bail!("script contains no steps");
        }
        return Ok(steps);
    }

    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };
    Ok(vec![Step::run(ToolCommand::new(
        program.clone(),
        args.iter().cloned(),
    ))])
}

/// Append a job to the snapshot without starting anything.
fn push_job(store: &QueueStore, job: Job) -> Result<()> {
    let mut jobs = store.load();
    let label = job.label.clone();
    let steps = job.steps.len();
    jobs.push(job);
    store.save(&jobs)?;
    println!("queued \"{label}\" ({steps} step(s), {} waiting)", jobs.len());
    Ok(())
}

fn list_jobs(store: &QueueStore) {
    let jobs = store.load();
    if jobs.is_empty() {
        println!("queue is empty");
        return;
    }
    for (i, job) in jobs.iter().enumerate() {
        println!(
            "{:>3}  {}  {:<8} {:>2} step(s)  {}",
            i + 1,
            job.created_at.format("%H:%M:%S"),
            job.status.to_string(),
            job.steps.len(),
            job.label
        );
    }
}

fn remove_job(store: &QueueStore, position: usize) -> Result<()> {
    let mut jobs = store.load();
    if position == 0 || position > jobs.len() {
        bail!(
            "no job at position {position}, the queue has {} entr{}",
            jobs.len(),
            if jobs.len() == 1 { "y" } else { "ies" }
        );
    }
    let job = jobs.remove(position - 1);
    store.save(&jobs)?;
    println!("removed \"{}\"", job.label);
    Ok(())
}

/// Drain the queue, printing events as they arrive.
async fn run_queue(config: QueueConfig, quiet: bool) -> Result<bool> {
    let queue = JobQueue::open(config);
    if queue.jobs().await.is_empty() {
        println!("queue is empty");
        return Ok(true);
    }

    let mut events = queue.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(QueueEvent::Drained) => break,
                Ok(event) => print_event(&event, quiet),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, output lines dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let all_done = queue.run_until_drained().await;
    printer.await.ok();

    println!();
    for view in &queue.jobs().await {
        println!("{:<8} {}", view.status.to_string(), view.label);
    }
    Ok(all_done)
}

/// Job lifecycle lines come from the queue's own logging; this prints
/// only what it does not: the step banner, raw tool output and percent.
fn print_event(event: &QueueEvent, quiet: bool) {
    match event {
        QueueEvent::StepStarted {
            step,
            total_steps,
            command,
            ..
        } => {
            eprintln!("[{}/{}] {}", step + 1, total_steps, command);
        }
        QueueEvent::OutputLine { line, .. } => {
            if !quiet {
                eprintln!("  {line}");
            }
        }
        QueueEvent::Progress { percent, .. } => {
            if quiet {
                eprintln!("  {percent}%");
            }
        }
        _ => {}
    }
}

async fn resolve_bitrate(
    input: &str,
    bitrate: Option<u32>,
    target_size: Option<f64>,
) -> Result<u32> {
    if let Some(k) = bitrate {
        return Ok(k);
    }

    let target_mb = target_size.unwrap_or(DEFAULT_TARGET_SIZE_MB);
    let duration = match probe_duration(input).await {
        Ok(d) if d > 0.0 => d,
        Ok(_) => 60.0,
        Err(e) => {
            // Unknown duration assumes 60s rather than dividing by zero.
            warn!(error = %e, "could not probe duration, assuming 60s");
            60.0
        }
    };
    bitrate_for_size(target_mb, TWO_PASS_AUDIO_K, duration)
}

/// Video bitrate that fits `target_mb` once the audio track is paid for.
fn bitrate_for_size(target_mb: f64, audio_k: u32, duration: f64) -> Result<u32> {
    let total_kbits = target_mb * 8192.0;
    let video_kbits = total_kbits - audio_k as f64 * duration;
    if video_kbits <= 0.0 {
        bail!("target size too small for this audio bitrate and duration");
    }
    Ok((video_kbits / duration) as u32)
}

fn default_output(input: &str, suffix: &str, ext: &str) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
        .to_string_lossy()
        .into_owned()
}

fn default_scene_pattern(input: &str) -> String {
    let parent = Path::new(input).parent().unwrap_or_else(|| Path::new("."));
    parent
        .join("scenes")
        .join("scene_%03d.mp4")
        .to_string_lossy()
        .into_owned()
}
