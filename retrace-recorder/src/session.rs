use retrace::ScreenshotProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::actions::{Action, CheckAction, CheckType};
use crate::capture::{CaptureConfig, EventCapture, InputHook, InputSink, SubscriptionId};
use crate::{lock, RecorderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Lifecycle {
    state: SessionState,
    subscription: Option<SubscriptionId>,
}

/// Owns the action buffer of one recording session and drives its lifecycle.
///
/// All methods take `&self` so the controller can be shared with hotkey
/// callbacks running on the input hook thread.
pub struct SessionController {
    hook: Arc<dyn InputHook>,
    screenshots: Arc<dyn ScreenshotProvider>,
    capture: Arc<EventCapture>,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionController {
    pub fn new(
        config: CaptureConfig,
        hook: Arc<dyn InputHook>,
        screenshots: Arc<dyn ScreenshotProvider>,
    ) -> Self {
        let capture = Arc::new(EventCapture::new(config, Arc::clone(&screenshots)));
        Self {
            hook,
            screenshots,
            capture,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                subscription: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.lifecycle).state
    }

    /// Begin a new recording, discarding anything captured before.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.subscription.is_none() {
            let capture = Arc::clone(&self.capture);
            let sink: InputSink = Arc::new(move |raw| capture.handle(raw));
            lifecycle.subscription = Some(self.hook.subscribe(sink)?);
        }
        self.capture.restart();
        info!(from = %lifecycle.state, "Recording started");
        lifecycle.state = SessionState::Recording;
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        Self::expect_state(&lifecycle, &[SessionState::Recording], "pause")?;
        self.capture.disarm();
        lifecycle.state = SessionState::Paused;
        info!(actions = self.capture.len(), "Recording paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        Self::expect_state(&lifecycle, &[SessionState::Paused], "resume")?;
        self.capture.rearm();
        lifecycle.state = SessionState::Recording;
        info!(at = self.capture.now(), "Recording resumed");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        Self::expect_state(
            &lifecycle,
            &[SessionState::Recording, SessionState::Paused],
            "stop",
        )?;
        self.capture.disarm();
        if let Some(id) = lifecycle.subscription.take() {
            self.hook.unsubscribe(id);
        }
        lifecycle.state = SessionState::Stopped;
        info!(actions = self.capture.len(), "Recording stopped");
        Ok(())
    }

    /// Order-preserving copy of the buffer.
    pub fn get_events(&self) -> Vec<Action> {
        self.capture.snapshot()
    }

    /// Write edited actions back into the buffer. Refused while recording.
    pub fn replace_events(&self, actions: Vec<Action>) -> Result<()> {
        let lifecycle = lock(&self.lifecycle);
        if lifecycle.state == SessionState::Recording {
            return Err(RecorderError::InvalidTransition {
                from: lifecycle.state,
                operation: "replace events",
            });
        }
        debug!(count = actions.len(), "Replacing session actions");
        self.capture.replace(actions);
        Ok(())
    }

    /// Capture the active window and append it as a visual check.
    pub fn add_check(&self, name: Option<String>) -> Result<()> {
        let lifecycle = lock(&self.lifecycle);
        Self::expect_state(
            &lifecycle,
            &[SessionState::Recording, SessionState::Paused],
            "add a check",
        )?;
        let image = self.screenshots.capture_active_window()?;
        info!(name = name.as_deref().unwrap_or(""), "Adding visual check");
        self.capture.push(Action::Check(CheckAction {
            check_type: CheckType::Image,
            image,
            region: None,
            timestamp: self.capture.now(),
            force_fail: false,
            name,
        }));
        Ok(())
    }

    pub fn add_comment(&self, text: impl Into<String>) {
        self.capture.push(Action::comment(text, self.capture.now()));
    }

    pub fn clear(&self) {
        self.capture.replace(Vec::new());
    }

    fn expect_state(
        lifecycle: &Lifecycle,
        allowed: &[SessionState],
        operation: &'static str,
    ) -> Result<()> {
        if allowed.contains(&lifecycle.state) {
            Ok(())
        } else {
            Err(RecorderError::InvalidTransition {
                from: lifecycle.state,
                operation,
            })
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.lifecycle).subscription.take() {
            self.hook.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawInput;
    use crate::test_support::{FakeHook, FakeScreen};
    use std::thread;
    use std::time::Duration;

    fn controller() -> (SessionController, Arc<FakeHook>) {
        let hook = FakeHook::new();
        let controller = SessionController::new(
            CaptureConfig::default(),
            hook.clone(),
            Arc::new(FakeScreen::solid([9, 9, 9, 255])),
        );
        (controller, hook)
    }

    #[test]
    fn test_full_lifecycle() {
        let (session, hook) = controller();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        hook.emit(RawInput::KeyPress("a".into()));
        session.pause().unwrap();
        hook.emit(RawInput::KeyRelease("a".into()));
        assert_eq!(session.get_events().len(), 1);

        session.resume().unwrap();
        hook.emit(RawInput::KeyRelease("a".into()));
        session.stop().unwrap();
        hook.emit(RawInput::KeyPress("b".into()));

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.get_events().len(), 2);
        assert_eq!(hook.subscriber_count(), 0);
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let (session, _hook) = controller();
        assert!(matches!(
            session.pause(),
            Err(RecorderError::InvalidTransition {
                from: SessionState::Idle,
                operation: "pause"
            })
        ));
        assert!(session.resume().is_err());
        assert!(session.stop().is_err());
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        assert!(session.resume().is_err());
        session.stop().unwrap();
        assert!(session.stop().is_err());
        assert!(session.pause().is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_restart_clears_buffer() {
        let (session, hook) = controller();
        session.start().unwrap();
        hook.emit(RawInput::KeyPress("a".into()));
        session.stop().unwrap();
        assert_eq!(session.get_events().len(), 1);

        session.start().unwrap();
        assert!(session.get_events().is_empty());
        assert_eq!(hook.subscriber_count(), 1);

        // Restarting while recording keeps a single subscription.
        session.start().unwrap();
        assert_eq!(hook.subscriber_count(), 1);
    }

    #[test]
    fn test_unavailable_hook_fails_fast() {
        let hook = FakeHook::unavailable();
        let session = SessionController::new(
            CaptureConfig::default(),
            hook,
            Arc::new(FakeScreen::solid([0, 0, 0, 255])),
        );
        assert!(matches!(
            session.start(),
            Err(RecorderError::CaptureUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_resumed_timestamps_never_go_backwards() {
        let (session, hook) = controller();
        session.start().unwrap();
        hook.emit(RawInput::KeyPress("a".into()));
        thread::sleep(Duration::from_millis(30));
        hook.emit(RawInput::KeyRelease("a".into()));
        session.pause().unwrap();

        thread::sleep(Duration::from_millis(200));
        session.resume().unwrap();
        hook.emit(RawInput::KeyPress("b".into()));

        let events = session.get_events();
        let last_before = events[1].timestamp();
        let first_after = events[2].timestamp();
        assert!(first_after >= last_before);
        // The pause is not part of the timeline.
        assert!(first_after - last_before < 0.15);
    }

    #[test]
    fn test_checks_and_comments() {
        let (session, _hook) = controller();
        assert!(session.add_check(None).is_err());

        session.start().unwrap();
        session.add_check(Some("home screen".into())).unwrap();
        session.pause().unwrap();
        session.add_comment("paused here");
        session.add_check(None).unwrap();

        let events = session.get_events();
        assert_eq!(events.len(), 3);
        match &events[0] {
            Action::Check(c) => {
                assert_eq!(c.name.as_deref(), Some("home screen"));
                assert_eq!(c.region, None);
                assert_eq!(c.image.dimensions(), (64, 48));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&events[1], Action::Comment(c) if c.text == "paused here"));
    }

    #[test]
    fn test_replace_events_refused_while_recording() {
        let (session, _hook) = controller();
        session.start().unwrap();
        assert!(session.replace_events(vec![]).is_err());

        session.stop().unwrap();
        let edited = vec![Action::comment("edited", 0.0)];
        session.replace_events(edited.clone()).unwrap();
        assert_eq!(session.get_events(), edited);

        session.clear();
        assert!(session.get_events().is_empty());
    }
}
