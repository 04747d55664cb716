use rdev::{Button, EventType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{instrument, trace};

use crate::{keys, DesktopError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_rdev(button: Button) -> Option<Self> {
        match button {
            Button::Left => Some(MouseButton::Left),
            Button::Right => Some(MouseButton::Right),
            Button::Middle => Some(MouseButton::Middle),
            Button::Unknown(_) => None,
        }
    }

    pub fn to_rdev(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic input. Keys are canonical names from [`crate::keys`].
pub trait InputSurface: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> Result<(), DesktopError>;
    fn button_down(&self, button: MouseButton) -> Result<(), DesktopError>;
    fn button_up(&self, button: MouseButton) -> Result<(), DesktopError>;
    fn scroll(&self, dx: i64, dy: i64) -> Result<(), DesktopError>;
    fn key_down(&self, key: &str) -> Result<(), DesktopError>;
    fn key_up(&self, key: &str) -> Result<(), DesktopError>;
}

/// [`InputSurface`] that injects OS events through `rdev::simulate`.
#[derive(Debug, Clone)]
pub struct RdevInput {
    /// Pause after each injected event. Some platforms drop events that
    /// arrive back to back. The pause blocks the calling thread, so async
    /// callers drive this type from the blocking pool.
    settle: Duration,
}

impl Default for RdevInput {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(20),
        }
    }
}

impl RdevInput {
    pub fn with_settle(settle: Duration) -> Self {
        Self { settle }
    }

    fn send(&self, event: EventType) -> Result<(), DesktopError> {
        trace!(?event, "simulating");
        rdev::simulate(&event)
            .map_err(|_| DesktopError::Simulation(format!("could not send {event:?}")))?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    fn key(name: &str) -> Result<rdev::Key, DesktopError> {
        keys::key_from_name(name)
            .ok_or_else(|| DesktopError::InvalidArgument(format!("unknown key name '{name}'")))
    }
}

impl InputSurface for RdevInput {
    #[instrument(level = "debug", skip(self))]
    fn move_to(&self, x: i32, y: i32) -> Result<(), DesktopError> {
        self.send(EventType::MouseMove {
            x: f64::from(x),
            y: f64::from(y),
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn button_down(&self, button: MouseButton) -> Result<(), DesktopError> {
        self.send(EventType::ButtonPress(button.to_rdev()))
    }

    #[instrument(level = "debug", skip(self))]
    fn button_up(&self, button: MouseButton) -> Result<(), DesktopError> {
        self.send(EventType::ButtonRelease(button.to_rdev()))
    }

    #[instrument(level = "debug", skip(self))]
    fn scroll(&self, dx: i64, dy: i64) -> Result<(), DesktopError> {
        self.send(EventType::Wheel {
            delta_x: dx,
            delta_y: dy,
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn key_down(&self, key: &str) -> Result<(), DesktopError> {
        self.send(EventType::KeyPress(Self::key(key)?))
    }

    #[instrument(level = "debug", skip(self))]
    fn key_up(&self, key: &str) -> Result<(), DesktopError> {
        self.send(EventType::KeyRelease(Self::key(key)?))
    }
}
