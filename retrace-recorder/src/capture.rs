use retrace::{centered_region, keys, MouseButton, ScreenshotProvider};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::actions::Action;
use crate::{lock, RecorderError, Result};

/// Configuration for event capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Width of the reference image taken around each mouse press
    pub snapshot_width: u32,

    /// Height of the reference image taken around each mouse press
    pub snapshot_height: u32,

    pub record_mouse: bool,

    pub record_keyboard: bool,

    /// Whether mouse presses carry a reference image
    pub snapshot_on_click: bool,

    /// Canonical key names that are never recorded (the hotkeys)
    pub ignored_keys: HashSet<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_width: 100,
            snapshot_height: 100,
            record_mouse: true,
            record_keyboard: true,
            snapshot_on_click: true,
            ignored_keys: HashSet::new(),
        }
    }
}

/// Platform-neutral input transition, as delivered by an [`InputHook`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    MouseMove { x: f64, y: f64 },
    ButtonPress(MouseButton),
    ButtonRelease(MouseButton),
    Wheel { dx: i64, dy: i64 },
    /// Canonical key name
    KeyPress(String),
    KeyRelease(String),
}

impl RawInput {
    fn from_rdev(event: &rdev::EventType) -> Option<Self> {
        use rdev::EventType;
        match event {
            EventType::MouseMove { x, y } => Some(RawInput::MouseMove { x: *x, y: *y }),
            EventType::ButtonPress(b) => MouseButton::from_rdev(*b).map(RawInput::ButtonPress),
            EventType::ButtonRelease(b) => MouseButton::from_rdev(*b).map(RawInput::ButtonRelease),
            EventType::Wheel { delta_x, delta_y } => Some(RawInput::Wheel {
                dx: *delta_x,
                dy: *delta_y,
            }),
            EventType::KeyPress(k) => Some(RawInput::KeyPress(keys::key_name(*k))),
            EventType::KeyRelease(k) => Some(RawInput::KeyRelease(keys::key_name(*k))),
        }
    }
}

pub type InputSink = Arc<dyn Fn(&RawInput) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// Process-wide source of raw input. Several consumers (capture, hotkeys)
/// share one hook.
pub trait InputHook: Send + Sync {
    /// Register `sink` for every subsequent event. Fails with
    /// [`RecorderError::CaptureUnavailable`] when the OS hook cannot be
    /// installed.
    fn subscribe(&self, sink: InputSink) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);
}

#[derive(Debug, Clone)]
enum ListenerState {
    NotStarted,
    Running,
    Failed(String),
}

struct HookShared {
    sinks: Mutex<Vec<(SubscriptionId, InputSink)>>,
    next_id: AtomicU64,
}

impl HookShared {
    fn dispatch(&self, event: &rdev::Event) {
        let Some(raw) = RawInput::from_rdev(&event.event_type) else {
            return;
        };
        // Clone the sink list so a sink may (un)subscribe from inside its callback.
        let sinks: Vec<InputSink> = lock(&self.sinks).iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            sink(&raw);
        }
    }
}

/// [`InputHook`] backed by `rdev::listen`.
///
/// `rdev::listen` blocks its thread forever and can only be installed once per
/// process, so the listener thread is started on the first subscription and
/// then shared. Errors from `listen` are returned straight away, so waiting a
/// short moment after spawning is enough to detect an unusable hook.
pub struct RdevHook {
    shared: Arc<HookShared>,
    state: Mutex<ListenerState>,
    startup_grace: Duration,
}

impl Default for RdevHook {
    fn default() -> Self {
        Self::new()
    }
}

impl RdevHook {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HookShared {
                sinks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            state: Mutex::new(ListenerState::NotStarted),
            startup_grace: Duration::from_millis(250),
        }
    }

    fn ensure_listening(&self) -> Result<()> {
        let mut state = lock(&self.state);
        match &*state {
            ListenerState::Running => return Ok(()),
            ListenerState::Failed(reason) => {
                return Err(RecorderError::CaptureUnavailable(reason.clone()))
            }
            ListenerState::NotStarted => {}
        }

        let (failure_tx, failure_rx) = mpsc::channel::<String>();
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("retrace-input-hook".to_string())
            .spawn(move || {
                info!("Installing global input hook");
                if let Err(e) = rdev::listen(move |event| shared.dispatch(&event)) {
                    let reason = format!("could not install the global input hook: {e:?}");
                    error!("{reason}");
                    let _ = failure_tx.send(reason);
                }
            })
            .map_err(|e| RecorderError::CaptureUnavailable(format!("cannot spawn hook thread: {e}")))?;

        match failure_rx.recv_timeout(self.startup_grace) {
            Ok(reason) => {
                *state = ListenerState::Failed(reason.clone());
                Err(RecorderError::CaptureUnavailable(reason))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!("Input hook is running");
                *state = ListenerState::Running;
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let reason = "input hook thread exited unexpectedly".to_string();
                *state = ListenerState::Failed(reason.clone());
                Err(RecorderError::CaptureUnavailable(reason))
            }
        }
    }
}

impl InputHook for RdevHook {
    fn subscribe(&self, sink: InputSink) -> Result<SubscriptionId> {
        self.ensure_listening()?;
        let id = SubscriptionId::from_raw(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.sinks).push((id, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.shared.sinks).retain(|(sid, _)| *sid != id);
    }
}

/// Session clock. Timestamps continue from `offset` while running and stay
/// frozen at it otherwise.
#[derive(Debug)]
struct CaptureClock {
    origin: Instant,
    offset: f64,
    running: bool,
}

impl CaptureClock {
    fn now(&self) -> f64 {
        if self.running {
            self.offset + self.origin.elapsed().as_secs_f64()
        } else {
            self.offset
        }
    }

    fn run_from(&mut self, offset: f64) {
        self.origin = Instant::now();
        self.offset = offset.max(0.0);
        self.running = true;
    }

    fn freeze_at(&mut self, offset: f64) {
        self.offset = offset.max(0.0);
        self.running = false;
    }
}

/// Turns raw input into [`Action`]s appended to a shared buffer.
pub struct EventCapture {
    config: CaptureConfig,
    screenshots: Arc<dyn ScreenshotProvider>,
    buffer: Mutex<Vec<Action>>,
    clock: Mutex<CaptureClock>,
    last_mouse_pos: Mutex<(i32, i32)>,
    armed: AtomicBool,
}

impl EventCapture {
    pub fn new(config: CaptureConfig, screenshots: Arc<dyn ScreenshotProvider>) -> Self {
        Self {
            config,
            screenshots,
            buffer: Mutex::new(Vec::new()),
            clock: Mutex::new(CaptureClock {
                origin: Instant::now(),
                offset: 0.0,
                running: false,
            }),
            last_mouse_pos: Mutex::new((0, 0)),
            armed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Clear the buffer, restart the clock at zero and accept events.
    pub(crate) fn restart(&self) {
        lock(&self.buffer).clear();
        lock(&self.clock).run_from(0.0);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Stop accepting events; the clock freezes at the last recorded timestamp.
    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        let last = self.last_timestamp();
        lock(&self.clock).freeze_at(last);
    }

    /// Accept events again, continuing from the last recorded timestamp.
    pub(crate) fn rearm(&self) {
        let last = self.last_timestamp();
        lock(&self.clock).run_from(last);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn last_timestamp(&self) -> f64 {
        lock(&self.buffer)
            .last()
            .map(Action::timestamp)
            .unwrap_or(0.0)
    }

    /// Current session time in seconds.
    pub fn now(&self) -> f64 {
        lock(&self.clock).now()
    }

    pub fn snapshot(&self) -> Vec<Action> {
        lock(&self.buffer).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buffer).is_empty()
    }

    pub(crate) fn replace(&self, actions: Vec<Action>) {
        *lock(&self.buffer) = actions;
    }

    pub(crate) fn push(&self, action: Action) {
        lock(&self.buffer).push(action);
    }

    /// Handle one raw event at the current session time.
    pub fn handle(&self, raw: &RawInput) {
        if !self.is_armed() {
            return;
        }
        let timestamp = self.now();
        if let Some(action) = self.translate(raw, timestamp) {
            self.push(action);
        }
    }

    fn translate(&self, raw: &RawInput, timestamp: f64) -> Option<Action> {
        match raw {
            RawInput::MouseMove { x, y } => {
                let pos = (x.round() as i32, y.round() as i32);
                *lock(&self.last_mouse_pos) = pos;
                self.config
                    .record_mouse
                    .then(|| Action::mouse_move(pos.0, pos.1, timestamp))
            }
            RawInput::ButtonPress(button) => {
                if !self.config.record_mouse {
                    return None;
                }
                let (x, y) = *lock(&self.last_mouse_pos);
                let action = Action::mouse_down(*button, x, y, timestamp);
                if !self.config.snapshot_on_click {
                    return Some(action);
                }
                match (action, self.snapshot_around(x, y)) {
                    (Action::Mouse(m), Some((shot, left, top))) => {
                        Some(Action::Mouse(m.with_screenshot_at(shot, left, top)))
                    }
                    (action, _) => Some(action),
                }
            }
            RawInput::ButtonRelease(button) => {
                if !self.config.record_mouse {
                    return None;
                }
                let (x, y) = *lock(&self.last_mouse_pos);
                Some(Action::mouse_up(*button, x, y, timestamp))
            }
            RawInput::Wheel { dx, dy } => {
                if !self.config.record_mouse {
                    return None;
                }
                let (x, y) = *lock(&self.last_mouse_pos);
                Some(Action::scroll(x, y, *dx, *dy, timestamp))
            }
            RawInput::KeyPress(key) => self
                .accepts_key(key)
                .then(|| Action::key_down(key.clone(), timestamp)),
            RawInput::KeyRelease(key) => self
                .accepts_key(key)
                .then(|| Action::key_up(key.clone(), timestamp)),
        }
    }

    fn accepts_key(&self, key: &str) -> bool {
        self.config.record_keyboard && !self.config.ignored_keys.contains(key)
    }

    /// Reference image around `(x, y)` and the top-left corner it was taken
    /// from. The provider may return less than requested at a monitor edge.
    fn snapshot_around(&self, x: i32, y: i32) -> Option<(retrace::Bitmap, i32, i32)> {
        let (w, h) = (self.config.snapshot_width, self.config.snapshot_height);
        let (left, top) = centered_region(x, y, w, h);
        match self.screenshots.capture_region(left, top, w, h) {
            Ok(shot) => Some((shot, left, top)),
            Err(e) => {
                warn!("Failed to capture click snapshot at ({x}, {y}), recording without it: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{MouseEventKind, Region};
    use retrace::{Bitmap, DesktopError};

    struct FixedScreen {
        fail: bool,
        requests: Mutex<Vec<(i32, i32, u32, u32)>>,
    }

    impl FixedScreen {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    const MONITOR: (i32, i32) = (1920, 1080);

    impl ScreenshotProvider for FixedScreen {
        fn capture_region(
            &self,
            x: i32,
            y: i32,
            width: u32,
            height: u32,
        ) -> std::result::Result<Bitmap, DesktopError> {
            self.requests.lock().unwrap().push((x, y, width, height));
            if self.fail {
                return Err(DesktopError::PlatformError("no display".into()));
            }
            // Crop at the monitor edge like the real provider does.
            let width = width.min((MONITOR.0 - x).max(0) as u32);
            let height = height.min((MONITOR.1 - y).max(0) as u32);
            Ok(Bitmap::filled(width, height, [1, 2, 3, 255]))
        }

        fn capture_active_window(&self) -> std::result::Result<Bitmap, DesktopError> {
            Ok(Bitmap::filled(10, 10, [0, 0, 0, 255]))
        }

        fn capture_fullscreen(&self) -> std::result::Result<Bitmap, DesktopError> {
            Ok(Bitmap::filled(10, 10, [0, 0, 0, 255]))
        }
    }

    fn armed_capture(config: CaptureConfig, screen: Arc<FixedScreen>) -> EventCapture {
        let capture = EventCapture::new(config, screen);
        capture.restart();
        capture
    }

    #[test]
    fn test_button_uses_last_move_position_and_snapshots() {
        let screen = FixedScreen::new(false);
        let capture = armed_capture(CaptureConfig::default(), screen.clone());

        capture.handle(&RawInput::MouseMove { x: 300.4, y: 200.6 });
        capture.handle(&RawInput::ButtonPress(MouseButton::Left));
        capture.handle(&RawInput::ButtonRelease(MouseButton::Left));

        let actions = capture.snapshot();
        assert_eq!(actions.len(), 3);
        match &actions[1] {
            Action::Mouse(m) => {
                assert_eq!(m.event, MouseEventKind::Down);
                assert_eq!((m.x, m.y), (300, 201));
                assert_eq!(m.screenshot.as_ref().map(|s| s.dimensions()), Some((100, 100)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &actions[2] {
            Action::Mouse(m) => assert!(m.screenshot.is_none()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*screen.requests.lock().unwrap(), vec![(250, 151, 100, 100)]);
    }

    #[test]
    fn test_edge_snapshot_keeps_capture_origin() {
        let screen = FixedScreen::new(false);
        let capture = armed_capture(CaptureConfig::default(), screen.clone());

        capture.handle(&RawInput::MouseMove { x: 1900.0, y: 1060.0 });
        capture.handle(&RawInput::ButtonPress(MouseButton::Left));

        let actions = capture.snapshot();
        let Action::Mouse(m) = &actions[1] else {
            panic!("expected a mouse press, got {:?}", actions[1]);
        };
        assert_eq!(m.screenshot.as_ref().map(|s| s.dimensions()), Some((70, 70)));
        assert_eq!(m.reference_region(), Some(Region::new(1850, 1010, 70, 70)));
        assert_eq!(*screen.requests.lock().unwrap(), vec![(1850, 1010, 100, 100)]);
    }

    #[test]
    fn test_snapshot_failure_still_records_press() {
        let capture = armed_capture(CaptureConfig::default(), FixedScreen::new(true));
        capture.handle(&RawInput::ButtonPress(MouseButton::Right));

        let actions = capture.snapshot();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Mouse(m) => {
                assert_eq!(m.button, Some(MouseButton::Right));
                assert!(m.screenshot.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ignored_keys_and_disabled_sources() {
        let config = CaptureConfig {
            record_mouse: false,
            ignored_keys: ["f8".to_string()].into_iter().collect(),
            ..CaptureConfig::default()
        };
        let capture = armed_capture(config, FixedScreen::new(false));

        capture.handle(&RawInput::MouseMove { x: 1.0, y: 1.0 });
        capture.handle(&RawInput::KeyPress("f8".into()));
        capture.handle(&RawInput::KeyPress("a".into()));
        capture.handle(&RawInput::KeyRelease("f8".into()));
        capture.handle(&RawInput::KeyRelease("a".into()));

        let actions = capture.snapshot();
        assert_eq!(actions, vec![
            Action::key_down("a", actions[0].timestamp()),
            Action::key_up("a", actions[1].timestamp()),
        ]);
    }

    #[test]
    fn test_disarmed_capture_drops_events() {
        let capture = EventCapture::new(CaptureConfig::default(), FixedScreen::new(false));
        capture.handle(&RawInput::KeyPress("a".into()));
        assert!(capture.snapshot().is_empty());
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let capture = armed_capture(CaptureConfig::default(), FixedScreen::new(false));
        for i in 0..20 {
            capture.handle(&RawInput::MouseMove {
                x: f64::from(i),
                y: 0.0,
            });
        }
        let stamps: Vec<f64> = capture.snapshot().iter().map(Action::timestamp).collect();
        assert!(stamps.iter().all(|t| *t >= 0.0));
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_rearm_continues_from_last_timestamp() {
        let capture = armed_capture(CaptureConfig::default(), FixedScreen::new(false));
        capture.replace(vec![Action::key_down("a", 5.0)]);

        capture.disarm();
        assert_eq!(capture.now(), 5.0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(capture.now(), 5.0);

        capture.rearm();
        capture.handle(&RawInput::KeyRelease("a".into()));
        let resumed = capture.snapshot()[1].timestamp();
        assert!(resumed >= 5.0);
        assert!(resumed < 5.05);
    }
}
