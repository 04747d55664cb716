//! Retrace CLI
//!
//! Record desktop input, edit the recording, replay it with visual
//! verification, or export it as a standalone Python program.
//!
//! Usage:
//!   retrace record --output login.json     # F8 pause, F9 resume, F7 check, F10 stop
//!   retrace show login.json                # List recorded actions
//!   retrace edit login.json --delete 3     # Remove one action
//!   retrace play login.json --interactive  # Replay, asking on visual failures
//!   retrace export login.json --output login.py

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use retrace::Tolerance;
use retrace_recorder::{ActionEditor, CompilerConfig, ScriptExporter, SessionFile};
use std::path::{Path, PathBuf};

mod play;
mod record;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "Record, replay and export desktop input sessions")]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[clap(long, short, global = true, env = "RETRACE_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Where to save the recorded session
    #[clap(long, short)]
    output: PathBuf,

    /// Human readable session name
    #[clap(long, default_value = "recording")]
    name: String,

    /// Do not attach a reference image to mouse presses
    #[clap(long, env = "RETRACE_NO_SNAPSHOTS")]
    no_snapshots: bool,

    /// Size of the square reference image taken around each press
    #[clap(long, default_value_t = 100, env = "RETRACE_SNAPSHOT_SIZE")]
    snapshot_size: u32,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Session file to replay
    file: PathBuf,

    /// low, medium, high or a number
    #[clap(long, default_value = "medium", env = "RETRACE_TOLERANCE")]
    tolerance: Tolerance,

    /// Replay every Nth consecutive mouse move
    #[clap(long, default_value_t = 5, env = "RETRACE_MOVE_STRIDE")]
    stride: usize,

    /// Pacing multiplier; 2.0 replays twice as fast
    #[clap(long, default_value_t = 1.0, env = "RETRACE_SPEED")]
    speed: f64,

    /// Pause after each injected event, in milliseconds
    #[clap(long, default_value_t = 20, env = "RETRACE_SETTLE_MS")]
    settle_ms: u64,

    /// Ask whether to continue after a visual check fails instead of aborting
    #[clap(long, short)]
    interactive: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Session file to compile
    file: PathBuf,

    /// Generated program; reference images go next to it
    #[clap(long, short)]
    output: PathBuf,

    #[clap(long, default_value = "medium", env = "RETRACE_TOLERANCE")]
    tolerance: Tolerance,

    #[clap(long, default_value_t = 5, env = "RETRACE_MOVE_STRIDE")]
    stride: usize,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct EditOp {
    /// Remove the action at this index
    #[clap(long)]
    delete: Option<usize>,

    /// Swap the action at this index with the one before it
    #[clap(long)]
    up: Option<usize>,

    /// Swap the action at this index with the one after it
    #[clap(long)]
    down: Option<usize>,
}

#[derive(Args, Debug)]
struct EditArgs {
    file: PathBuf,

    #[command(flatten)]
    op: EditOp,

    /// Write the edited session here instead of overwriting the input
    #[clap(long, short)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new session until F10 or Ctrl+C
    Record(RecordArgs),
    /// Replay a session with visual verification
    Play(PlayArgs),
    /// Compile a session into a Python program
    Export(ExportArgs),
    /// Print the actions of a session
    Show { file: PathBuf },
    /// Delete or reorder one action of a session
    Edit(EditArgs),
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Record(args) => record::run(args).await,
        Commands::Play(args) => play::run(args).await,
        Commands::Export(args) => export(args),
        Commands::Show { file } => show(file),
        Commands::Edit(args) => edit(args),
    }
}

fn load(path: &Path) -> Result<SessionFile> {
    SessionFile::load_from_file(path)
        .with_context(|| format!("Failed to load session {}", path.display()))
}

fn export(args: ExportArgs) -> Result<()> {
    let session = load(&args.file)?;
    let exporter = ScriptExporter::new(CompilerConfig {
        move_event_stride: args.stride,
        tolerance: args.tolerance,
        ..CompilerConfig::default()
    });
    let summary = exporter
        .export(&session.actions, &args.output)
        .with_context(|| format!("Failed to export to {}", args.output.display()))?;

    println!(
        "{} {} ({} instructions, {} reference images in {})",
        "Exported".green().bold(),
        summary.script.display(),
        summary.instruction_count,
        summary.image_count,
        summary.images_dir.display()
    );
    Ok(())
}

fn show(file: PathBuf) -> Result<()> {
    let session = load(&file)?;
    println!(
        "{} {} ({} actions, recorded {})",
        "Session".bold(),
        session.name.cyan(),
        session.actions.len(),
        session.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (index, action) in session.actions.iter().enumerate() {
        println!(
            "{:>5}  {:>9.3}s  {}",
            index.to_string().dimmed(),
            action.timestamp(),
            action.describe()
        );
    }
    Ok(())
}

fn edit(args: EditArgs) -> Result<()> {
    let mut session = load(&args.file)?;
    let mut editor = ActionEditor::new(std::mem::take(&mut session.actions));

    let (applied, what, index) = match (args.op.delete, args.op.up, args.op.down) {
        (Some(i), _, _) => (editor.delete_action(i), "delete", i),
        (_, Some(i), _) => (editor.move_up(i), "move up", i),
        (_, _, Some(i)) => (editor.move_down(i), "move down", i),
        _ => bail!("One of --delete, --up or --down is required"),
    };
    if !applied {
        bail!(
            "Cannot {what} action {index} in a session of {} actions",
            editor.len()
        );
    }

    session.actions = editor.into_actions();
    let output = args.output.unwrap_or(args.file);
    session
        .save_to_file(&output)
        .with_context(|| format!("Failed to save session {}", output.display()))?;
    println!(
        "{} {what} {index}; saved {} actions to {}",
        "Applied".green().bold(),
        session.actions.len(),
        output.display()
    );
    Ok(())
}
