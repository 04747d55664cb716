//! In-memory stand-ins for the platform collaborators. Enabled for unit
//! tests and, through the `test-support` feature, for integration tests.

use retrace::{Bitmap, DesktopError, InputSurface, MouseButton, ScreenshotProvider};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::{InputHook, InputSink, RawInput, SubscriptionId};
use crate::{RecorderError, Result};

pub struct FakeHook {
    sinks: Mutex<Vec<(SubscriptionId, InputSink)>>,
    next_id: AtomicU64,
    unavailable: bool,
}

impl FakeHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sinks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            unavailable: false,
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            sinks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            unavailable: true,
        })
    }

    pub fn emit(&self, raw: RawInput) {
        let sinks: Vec<InputSink> = self
            .sinks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for sink in sinks {
            sink(&raw);
        }
    }

    pub fn move_to(&self, x: f64, y: f64) {
        self.emit(RawInput::MouseMove { x, y });
    }

    pub fn click(&self, button: MouseButton) {
        self.emit(RawInput::ButtonPress(button));
        self.emit(RawInput::ButtonRelease(button));
    }

    pub fn tap(&self, key: &str) {
        self.emit(RawInput::KeyPress(key.to_string()));
        self.emit(RawInput::KeyRelease(key.to_string()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

impl InputHook for FakeHook {
    fn subscribe(&self, sink: InputSink) -> Result<SubscriptionId> {
        if self.unavailable {
            return Err(RecorderError::CaptureUnavailable(
                "permission denied".into(),
            ));
        }
        let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sinks.lock().unwrap().push((id, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.sinks.lock().unwrap().retain(|(sid, _)| *sid != id);
    }
}

/// Returns one solid colour for every region; the active window is 64x48.
pub struct FakeScreen {
    rgba: Mutex<[u8; 4]>,
    /// Monitor size; regions reaching past it are cropped
    bounds: Option<(i32, i32)>,
    has_window: bool,
}

impl FakeScreen {
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            rgba: Mutex::new(rgba),
            bounds: None,
            has_window: true,
        }
    }

    pub fn with_bounds(mut self, width: i32, height: i32) -> Self {
        self.bounds = Some((width, height));
        self
    }

    pub fn without_window(mut self) -> Self {
        self.has_window = false;
        self
    }

    pub fn set_colour(&self, rgba: [u8; 4]) {
        *self.rgba.lock().unwrap() = rgba;
    }
}

impl ScreenshotProvider for FakeScreen {
    fn capture_region(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> std::result::Result<Bitmap, DesktopError> {
        let (width, height) = match self.bounds {
            Some((w, h)) => (
                width.min((w - x).max(0) as u32),
                height.min((h - y).max(0) as u32),
            ),
            None => (width, height),
        };
        if width == 0 || height == 0 {
            return Err(DesktopError::InvalidArgument(format!(
                "region at ({x}, {y}) is off screen"
            )));
        }
        Ok(Bitmap::filled(width, height, *self.rgba.lock().unwrap()))
    }

    fn capture_active_window(&self) -> std::result::Result<Bitmap, DesktopError> {
        if !self.has_window {
            return Err(DesktopError::NoActiveWindow("no focused window".into()));
        }
        Ok(Bitmap::filled(64, 48, *self.rgba.lock().unwrap()))
    }

    fn capture_fullscreen(&self) -> std::result::Result<Bitmap, DesktopError> {
        Ok(Bitmap::filled(320, 200, *self.rgba.lock().unwrap()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    Move(i32, i32),
    Down(MouseButton),
    Up(MouseButton),
    Scroll(i64, i64),
    KeyDown(String),
    KeyUp(String),
}

/// Records every injected event together with the (tokio) time it happened.
#[derive(Default)]
pub struct FakeInput {
    pub log: Mutex<Vec<(tokio::time::Instant, Injected)>>,
    pub fail_on_key: Option<String>,
}

impl FakeInput {
    pub fn events(&self) -> Vec<Injected> {
        self.log.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Injected events other than pointer moves.
    pub fn presses(&self) -> Vec<Injected> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Injected::Move(..)))
            .collect()
    }

    fn push(&self, event: Injected) {
        self.log
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), event));
    }
}

impl InputSurface for FakeInput {
    fn move_to(&self, x: i32, y: i32) -> std::result::Result<(), DesktopError> {
        self.push(Injected::Move(x, y));
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> std::result::Result<(), DesktopError> {
        self.push(Injected::Down(button));
        Ok(())
    }

    fn button_up(&self, button: MouseButton) -> std::result::Result<(), DesktopError> {
        self.push(Injected::Up(button));
        Ok(())
    }

    fn scroll(&self, dx: i64, dy: i64) -> std::result::Result<(), DesktopError> {
        self.push(Injected::Scroll(dx, dy));
        Ok(())
    }

    fn key_down(&self, key: &str) -> std::result::Result<(), DesktopError> {
        if self.fail_on_key.as_deref() == Some(key) {
            return Err(DesktopError::InvalidArgument(format!("unknown key name '{key}'")));
        }
        self.push(Injected::KeyDown(key.to_string()));
        Ok(())
    }

    fn key_up(&self, key: &str) -> std::result::Result<(), DesktopError> {
        self.push(Injected::KeyUp(key.to_string()));
        Ok(())
    }
}
