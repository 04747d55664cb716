//! Replays recorded actions with their original pacing.
//!
//! A run walks the actions in order, sleeping for the recorded gaps and
//! verifying reference images before presses and at explicit checks. A visual
//! mismatch is not an error: it ends the run with
//! [`PlaybackOutcome::VisualCheckFailed`], and [`Player::play`] can then wait
//! for a continue/abort decision and carry on after the failing action.

use retrace::{
    resize_to_match, similar, Bitmap, DesktopError, InputSurface, ScreenshotProvider, Tolerance,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actions::{Action, CheckAction, KeyEventKind, MouseAction, MouseEventKind};
use crate::{RecorderError, Result};

/// Configuration for playback
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Only every Nth consecutive mouse move is replayed
    pub move_event_stride: usize,

    pub tolerance: Tolerance,

    /// Pacing multiplier: 2.0 replays twice as fast
    pub speed: f64,

    /// Gaps shorter than this are not slept
    pub min_wait_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            move_event_stride: 5,
            tolerance: Tolerance::Medium,
            speed: 1.0,
            min_wait_secs: 0.1,
        }
    }
}

#[derive(Debug)]
pub enum PlaybackOutcome {
    Completed,
    VisualCheckFailed {
        index: usize,
        reference: Bitmap,
        actual: Bitmap,
    },
    ExecutionFailed {
        index: usize,
        error: DesktopError,
    },
}

impl PlaybackOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, PlaybackOutcome::Completed)
    }

    pub fn failed_index(&self) -> Option<usize> {
        match self {
            PlaybackOutcome::Completed => None,
            PlaybackOutcome::VisualCheckFailed { index, .. }
            | PlaybackOutcome::ExecutionFailed { index, .. } => Some(*index),
        }
    }

    /// `(reference, actual)` of a visual failure.
    pub fn images(&self) -> Option<(&Bitmap, &Bitmap)> {
        match self {
            PlaybackOutcome::VisualCheckFailed {
                reference, actual, ..
            } => Some((reference, actual)),
            _ => None,
        }
    }

    /// Turn an execution failure into [`RecorderError::PlaybackExecution`].
    pub fn into_result(self) -> Result<Self> {
        match self {
            PlaybackOutcome::ExecutionFailed { index, error } => {
                Err(RecorderError::PlaybackExecution {
                    index,
                    source: error,
                })
            }
            other => Ok(other),
        }
    }

    fn shifted(self, by: usize) -> Self {
        match self {
            PlaybackOutcome::Completed => PlaybackOutcome::Completed,
            PlaybackOutcome::VisualCheckFailed {
                index,
                reference,
                actual,
            } => PlaybackOutcome::VisualCheckFailed {
                index: index + by,
                reference,
                actual,
            },
            PlaybackOutcome::ExecutionFailed { index, error } => PlaybackOutcome::ExecutionFailed {
                index: index + by,
                error,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Continue/abort decision for a suspended run. Holds at most one pending
/// decision; a newer one replaces it.
#[derive(Debug, Clone)]
pub struct DecisionSignal {
    tx: Arc<watch::Sender<Option<Decision>>>,
}

impl Default for DecisionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn continue_playback(&self) {
        self.tx.send_replace(Some(Decision::Continue));
    }

    pub fn abort(&self) {
        self.tx.send_replace(Some(Decision::Abort));
    }

    pub fn pending(&self) -> Option<Decision> {
        *self.tx.borrow()
    }

    fn clear(&self) {
        self.tx.send_replace(None);
    }

    async fn wait(&self) -> Decision {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(decision) => (*decision).unwrap_or(Decision::Abort),
            Err(_) => Decision::Abort,
        }
    }
}

/// Receives the image pair of a visual failure before the run suspends.
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, index: usize, reference: &Bitmap, actual: &Bitmap);
}

impl<F> FailureHandler for F
where
    F: Fn(usize, &Bitmap, &Bitmap) + Send + Sync,
{
    fn on_failure(&self, index: usize, reference: &Bitmap, actual: &Bitmap) {
        self(index, reference, actual)
    }
}

type Mismatch = (Bitmap, Bitmap);

/// Drives the platform collaborators for one action at a time. Every call
/// into it may block, so [`Player`] runs it on the blocking pool.
#[derive(Clone)]
struct Executor {
    input: Arc<dyn InputSurface>,
    screenshots: Arc<dyn ScreenshotProvider>,
    tolerance: f64,
}

pub struct Player {
    executor: Executor,
    config: PlaybackConfig,
}

impl Player {
    pub fn new(
        input: Arc<dyn InputSurface>,
        screenshots: Arc<dyn ScreenshotProvider>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            executor: Executor {
                input,
                screenshots,
                tolerance: config.tolerance.value(),
            },
            config,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Replay `actions`, suspending on each visual failure until `signal`
    /// carries a decision. On continue the remaining actions are replayed as a
    /// fresh run, with its clock starting at zero. Reported indices always
    /// refer to `actions`.
    pub async fn play(
        &self,
        actions: &[Action],
        handler: Option<&dyn FailureHandler>,
        signal: &DecisionSignal,
    ) -> PlaybackOutcome {
        let mut start = 0;
        loop {
            let outcome = self.play_once(&actions[start..]).await.shifted(start);
            let (index, reference, actual) = match &outcome {
                PlaybackOutcome::VisualCheckFailed {
                    index,
                    reference,
                    actual,
                } => (*index, reference, actual),
                _ => return outcome,
            };
            let Some(handler) = handler else {
                return outcome;
            };

            signal.clear();
            handler.on_failure(index, reference, actual);
            info!(index, "Waiting for a continue/abort decision");
            match signal.wait().await {
                Decision::Continue => {
                    info!(index, "Continuing after visual failure");
                    start = index + 1;
                }
                Decision::Abort => {
                    info!(index, "Playback aborted after visual failure");
                    return outcome;
                }
            }
        }
    }

    /// Replay `actions` once, stopping at the first failure.
    pub async fn play_once(&self, actions: &[Action]) -> PlaybackOutcome {
        info!(count = actions.len(), "Starting playback");
        let stride = self.config.move_event_stride.max(1);
        let mut last_time = 0.0_f64;
        let mut move_count = 0_usize;

        for (index, action) in actions.iter().enumerate() {
            let timestamp = action.timestamp();
            let wait = (timestamp - last_time).max(0.0);
            last_time = timestamp;

            if action.is_move() {
                move_count += 1;
                if move_count % stride != 0 {
                    continue;
                }
            } else {
                move_count = 0;
                if wait >= self.config.min_wait_secs {
                    tokio::time::sleep(self.scaled(wait)).await;
                }
            }

            match self.execute(action).await {
                Ok(None) => {}
                Ok(Some((reference, actual))) => {
                    warn!(index, action = %action.describe(), "Visual check failed");
                    return PlaybackOutcome::VisualCheckFailed {
                        index,
                        reference,
                        actual,
                    };
                }
                Err(error) => {
                    error!(index, action = %action.describe(), "Playback error: {error}");
                    return PlaybackOutcome::ExecutionFailed { index, error };
                }
            }
        }

        info!("Playback completed");
        PlaybackOutcome::Completed
    }

    fn scaled(&self, wait: f64) -> Duration {
        let speed = if self.config.speed.is_finite() && self.config.speed > 0.0 {
            self.config.speed
        } else {
            1.0
        };
        Duration::try_from_secs_f64(wait / speed).unwrap_or(Duration::MAX)
    }

    async fn execute(&self, action: &Action) -> std::result::Result<Option<Mismatch>, DesktopError> {
        if let Action::Comment(comment) = action {
            debug!(text = %comment.text, "Comment");
            return Ok(None);
        }
        let executor = self.executor.clone();
        let action = action.clone();
        tokio::task::spawn_blocking(move || executor.execute(&action))
            .await
            .map_err(|e| DesktopError::PlatformError(format!("Task join error: {e}")))?
    }
}

impl Executor {
    fn execute(&self, action: &Action) -> std::result::Result<Option<Mismatch>, DesktopError> {
        match action {
            Action::Mouse(mouse) => self.execute_mouse(mouse),
            Action::Keyboard(key) => {
                match key.event {
                    KeyEventKind::Down => self.input.key_down(&key.key)?,
                    KeyEventKind::Up => self.input.key_up(&key.key)?,
                }
                Ok(None)
            }
            Action::Check(check) => self.verify_check(check),
            Action::Comment(_) => Ok(None),
        }
    }

    fn execute_mouse(
        &self,
        mouse: &MouseAction,
    ) -> std::result::Result<Option<Mismatch>, DesktopError> {
        self.input.move_to(mouse.x, mouse.y)?;
        match mouse.event {
            MouseEventKind::Move => {}
            MouseEventKind::Down => {
                if let (Some(reference), Some(region)) =
                    (&mouse.screenshot, mouse.reference_region())
                {
                    let actual = self.screenshots.capture_region(
                        region.x,
                        region.y,
                        region.width,
                        region.height,
                    )?;
                    if !similar(reference, &actual, self.tolerance) {
                        return Ok(Some((reference.clone(), actual)));
                    }
                }
                self.input.button_down(mouse.button_or_default())?;
            }
            MouseEventKind::Up => self.input.button_up(mouse.button_or_default())?,
            MouseEventKind::Scroll => self
                .input
                .scroll(mouse.dx.unwrap_or(0), mouse.dy.unwrap_or(0))?,
        }
        Ok(None)
    }

    fn verify_check(
        &self,
        check: &CheckAction,
    ) -> std::result::Result<Option<Mismatch>, DesktopError> {
        let reference = &check.image;
        let captured = match check.region {
            Some(r) => self
                .screenshots
                .capture_region(r.x, r.y, r.width, r.height),
            None => self
                .screenshots
                .capture_active_window()
                .map(|window| resize_to_match(&window, reference.width(), reference.height())),
        };
        let actual = match captured {
            Ok(actual) => actual,
            // A forced failure is reported even when nothing can be captured.
            Err(e) if check.force_fail => {
                debug!("Forced check without a screen capture: {e}");
                Bitmap::filled(reference.width(), reference.height(), [0, 0, 0, 255])
            }
            Err(e) => return Err(e),
        };
        if check.force_fail || !similar(reference, &actual, self.tolerance) {
            return Ok(Some((reference.clone(), actual)));
        }
        Ok(None)
    }
}

/// A playback started by [`PlaybackRunner::start`].
pub struct PlaybackHandle {
    signal: DecisionSignal,
    outcome: oneshot::Receiver<PlaybackOutcome>,
}

impl PlaybackHandle {
    pub fn signal(&self) -> &DecisionSignal {
        &self.signal
    }

    /// Wait for the run to finish. `None` when it was abandoned.
    pub async fn outcome(self) -> Option<PlaybackOutcome> {
        self.outcome.await.ok()
    }
}

struct ActiveRun {
    task: JoinHandle<()>,
    signal: DecisionSignal,
}

/// Runs at most one playback at a time on a background task.
pub struct PlaybackRunner {
    player: Arc<Player>,
    active: Mutex<Option<ActiveRun>>,
}

impl PlaybackRunner {
    pub fn new(player: Player) -> Self {
        Self {
            player: Arc::new(player),
            active: Mutex::new(None),
        }
    }

    /// Start replaying `actions`. A previous run, suspended or not, is
    /// abandoned and has terminated before the new one begins.
    pub async fn start(
        &self,
        actions: Vec<Action>,
        handler: Option<Arc<dyn FailureHandler>>,
    ) -> PlaybackHandle {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            Self::abandon(previous).await;
        }

        let signal = DecisionSignal::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let player = Arc::clone(&self.player);
        let task_signal = signal.clone();
        let task = tokio::spawn(async move {
            let outcome = player
                .play(&actions, handler.as_deref(), &task_signal)
                .await;
            let _ = outcome_tx.send(outcome);
        });

        *active = Some(ActiveRun {
            task,
            signal: signal.clone(),
        });
        PlaybackHandle {
            signal,
            outcome: outcome_rx,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
    }

    /// Abandon the active run, if any.
    pub async fn shutdown(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            Self::abandon(previous).await;
        }
    }

    async fn abandon(run: ActiveRun) {
        if run.task.is_finished() {
            return;
        }
        info!("Abandoning active playback");
        run.signal.abort();
        run.task.abort();
        let _ = run.task.await;
    }
}
