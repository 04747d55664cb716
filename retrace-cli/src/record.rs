use anyhow::{Context, Result};
use colored::*;
use retrace::XcapScreenshots;
use retrace_recorder::{
    save_actions, CaptureConfig, GlobalHotkeys, HotkeyBindings, HotkeyCallback, HotkeyCallbacks,
    HotkeyCapability, InputHook, RdevHook, SessionController, SessionState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::RecordArgs;

pub async fn run(args: RecordArgs) -> Result<()> {
    let hook: Arc<dyn InputHook> = Arc::new(RdevHook::new());
    let bindings = HotkeyBindings::default();
    let config = CaptureConfig {
        snapshot_width: args.snapshot_size,
        snapshot_height: args.snapshot_size,
        snapshot_on_click: !args.no_snapshots,
        ignored_keys: bindings.keys(),
        ..CaptureConfig::default()
    };
    let session = Arc::new(SessionController::new(
        config,
        Arc::clone(&hook),
        Arc::new(XcapScreenshots::new()),
    ));

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    let hotkeys = GlobalHotkeys::new(Arc::clone(&hook), bindings.clone());
    hotkeys
        .start(callbacks(&session, stop_tx))
        .context("Failed to install recorder hotkeys")?;
    session
        .start()
        .context("Failed to start recording (input capture may need accessibility permission)")?;

    println!(
        "{} {} pause, {} resume, {} add check, {} or Ctrl+C stop",
        "Recording.".red().bold(),
        bindings.pause.to_uppercase(),
        bindings.resume.to_uppercase(),
        bindings.check.to_uppercase(),
        bindings.stop.to_uppercase()
    );

    tokio::select! {
        _ = stop_rx.recv() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received, stopping");
        }
    }
    hotkeys.stop();
    if session.state() != SessionState::Stopped {
        session.stop()?;
    }

    let actions = session.get_events();
    save_actions(&args.output, &args.name, &actions)
        .with_context(|| format!("Failed to save session {}", args.output.display()))?;
    println!(
        "{} {} actions to {}",
        "Saved".green().bold(),
        actions.len(),
        args.output.display()
    );
    Ok(())
}

fn callbacks(
    session: &Arc<SessionController>,
    stop_tx: mpsc::UnboundedSender<()>,
) -> HotkeyCallbacks {
    let on_pause: HotkeyCallback = {
        let session = Arc::clone(session);
        Arc::new(move || match session.pause() {
            Ok(()) => println!("{}", "Paused".yellow()),
            Err(e) => warn!("Pause ignored: {e}"),
        })
    };
    let on_resume: HotkeyCallback = {
        let session = Arc::clone(session);
        Arc::new(move || match session.resume() {
            Ok(()) => println!("{}", "Recording".red()),
            Err(e) => warn!("Resume ignored: {e}"),
        })
    };
    let on_check: HotkeyCallback = {
        let session = Arc::clone(session);
        Arc::new(move || match session.add_check(None) {
            Ok(()) => println!("{}", "Visual check added".cyan()),
            Err(e) => warn!("Could not add visual check: {e}"),
        })
    };
    let on_stop: HotkeyCallback = {
        let session = Arc::clone(session);
        Arc::new(move || {
            if let Err(e) = session.stop() {
                warn!("Stop ignored: {e}");
                return;
            }
            let _ = stop_tx.send(());
        })
    };

    HotkeyCallbacks {
        on_pause: Some(on_pause),
        on_stop: Some(on_stop),
        on_check: Some(on_check),
        on_resume: Some(on_resume),
    }
}
