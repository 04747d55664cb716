use anyhow::{bail, Context, Result};
use colored::*;
use retrace::{Bitmap, RdevInput, XcapScreenshots};
use retrace_recorder::{
    FailureHandler, PlaybackConfig, PlaybackOutcome, PlaybackRunner, Player,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::PlayArgs;

/// Saves the image pair of each visual failure next to the session file and
/// reports the failing index.
struct SaveFailures {
    dir: PathBuf,
    stem: String,
    failures: mpsc::UnboundedSender<usize>,
}

impl SaveFailures {
    fn new(session: &Path, failures: mpsc::UnboundedSender<usize>) -> Self {
        let dir = session
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = session
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        Self {
            dir,
            stem,
            failures,
        }
    }

    fn save(&self, index: usize, kind: &str, image: &Bitmap) {
        let path = self
            .dir
            .join(format!("{}_failure_{index}_{kind}.png", self.stem));
        match image.save_png(&path) {
            Ok(()) => println!("  {kind}: {}", path.display()),
            Err(e) => warn!("Failed to save {kind} image for action {index}: {e}"),
        }
    }
}

impl FailureHandler for SaveFailures {
    fn on_failure(&self, index: usize, reference: &Bitmap, actual: &Bitmap) {
        println!(
            "{} at action {index}",
            "Visual check failed".red().bold()
        );
        self.save(index, "reference", reference);
        self.save(index, "actual", actual);
        let _ = self.failures.send(index);
    }
}

pub async fn run(args: PlayArgs) -> Result<()> {
    let session = crate::load(&args.file)?;
    info!(name = %session.name, actions = session.actions.len(), "Replaying session");

    let player = Player::new(
        Arc::new(RdevInput::with_settle(Duration::from_millis(args.settle_ms))),
        Arc::new(XcapScreenshots::new()),
        PlaybackConfig {
            move_event_stride: args.stride,
            tolerance: args.tolerance,
            speed: args.speed,
            ..PlaybackConfig::default()
        },
    );
    let runner = PlaybackRunner::new(player);

    let (failures_tx, mut failures) = mpsc::unbounded_channel();
    let handler: Arc<dyn FailureHandler> = Arc::new(SaveFailures::new(&args.file, failures_tx));
    let handle = runner.start(session.actions, Some(handler)).await;
    let signal = handle.signal().clone();
    let outcome = handle.outcome();
    tokio::pin!(outcome);

    let outcome = loop {
        tokio::select! {
            outcome = &mut outcome => break outcome,
            Some(index) = failures.recv() => {
                if args.interactive && ask_continue(index).await? {
                    signal.continue_playback();
                } else {
                    signal.abort();
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                runner.shutdown().await;
                bail!("Playback interrupted");
            }
        }
    };

    match outcome.map(PlaybackOutcome::into_result).transpose()? {
        Some(PlaybackOutcome::Completed) => {
            println!("{}", "Playback completed".green().bold());
            Ok(())
        }
        Some(failed) => bail!(
            "Playback stopped at action {}",
            failed.failed_index().unwrap_or_default()
        ),
        None => bail!("Playback was abandoned"),
    }
}

async fn ask_continue(index: usize) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("Continue after action {index}? [y/N] ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("Prompt task failed")?
    .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
