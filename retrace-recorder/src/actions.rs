use retrace::{centered_region, Bitmap, MouseButton};
use serde::{Deserialize, Serialize};

/// Kind of pointer transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseEventKind {
    Move,
    Down,
    Up,
    Scroll,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    #[default]
    Image,
}

/// Screen rectangle in global coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MouseAction {
    pub event: MouseEventKind,
    pub x: i32,
    pub y: i32,

    /// Horizontal wheel delta (scroll only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i64>,

    /// Vertical wheel delta (scroll only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,

    /// Seconds since the session started
    pub timestamp: f64,

    /// Reference image of the region around `(x, y)`, taken when the button
    /// went down. Playback verifies the screen against it before pressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Bitmap>,

    /// Where `screenshot` was taken. Captures near a monitor edge are cropped,
    /// so this is not always the image's size centered on `(x, y)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_region: Option<Region>,
}

impl MouseAction {
    pub fn with_screenshot(mut self, screenshot: Bitmap) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    /// Attach a reference image together with the screen area it came from.
    pub fn with_screenshot_at(mut self, screenshot: Bitmap, left: i32, top: i32) -> Self {
        self.screenshot_region = Some(Region::new(left, top, screenshot.width(), screenshot.height()));
        self.screenshot = Some(screenshot);
        self
    }

    /// Screen area to compare against the reference image. Recordings that
    /// predate stored regions use the image's size centered on the press.
    pub fn reference_region(&self) -> Option<Region> {
        let shot = self.screenshot.as_ref()?;
        let (left, top) = match self.screenshot_region {
            Some(r) => (r.x, r.y),
            None => centered_region(self.x, self.y, shot.width(), shot.height()),
        };
        Some(Region::new(left, top, shot.width(), shot.height()))
    }

    /// Button to press or release; recordings without one mean the left button.
    pub fn button_or_default(&self) -> MouseButton {
        self.button.unwrap_or(MouseButton::Left)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyboardAction {
    pub event: KeyEventKind,
    /// Canonical key name, see [`retrace::keys`].
    pub key: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckAction {
    #[serde(default)]
    pub check_type: CheckType,
    pub image: Bitmap,

    /// Area to compare. Without it the active window is compared, resized to
    /// the reference dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    pub timestamp: f64,

    /// Always report a mismatch. Used to exercise the failure path.
    #[serde(default)]
    pub force_fail: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentAction {
    pub text: String,
    pub timestamp: f64,
}

/// One entry of a recorded session. Position in the sequence is its only
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Mouse(MouseAction),
    Keyboard(KeyboardAction),
    Check(CheckAction),
    Comment(CommentAction),
}

impl Action {
    pub fn mouse_move(x: i32, y: i32, timestamp: f64) -> Self {
        Action::Mouse(MouseAction {
            event: MouseEventKind::Move,
            x,
            y,
            dx: None,
            dy: None,
            button: None,
            timestamp,
            screenshot: None,
            screenshot_region: None,
        })
    }

    pub fn mouse_down(button: MouseButton, x: i32, y: i32, timestamp: f64) -> Self {
        Self::button_event(MouseEventKind::Down, button, x, y, timestamp)
    }

    pub fn mouse_up(button: MouseButton, x: i32, y: i32, timestamp: f64) -> Self {
        Self::button_event(MouseEventKind::Up, button, x, y, timestamp)
    }

    fn button_event(
        event: MouseEventKind,
        button: MouseButton,
        x: i32,
        y: i32,
        timestamp: f64,
    ) -> Self {
        Action::Mouse(MouseAction {
            event,
            x,
            y,
            dx: None,
            dy: None,
            button: Some(button),
            timestamp,
            screenshot: None,
            screenshot_region: None,
        })
    }

    pub fn scroll(x: i32, y: i32, dx: i64, dy: i64, timestamp: f64) -> Self {
        Action::Mouse(MouseAction {
            event: MouseEventKind::Scroll,
            x,
            y,
            dx: Some(dx),
            dy: Some(dy),
            button: None,
            timestamp,
            screenshot: None,
            screenshot_region: None,
        })
    }

    pub fn key_down(key: impl Into<String>, timestamp: f64) -> Self {
        Action::Keyboard(KeyboardAction {
            event: KeyEventKind::Down,
            key: key.into(),
            timestamp,
        })
    }

    pub fn key_up(key: impl Into<String>, timestamp: f64) -> Self {
        Action::Keyboard(KeyboardAction {
            event: KeyEventKind::Up,
            key: key.into(),
            timestamp,
        })
    }

    pub fn check(image: Bitmap, region: Option<Region>, timestamp: f64) -> Self {
        Action::Check(CheckAction {
            check_type: CheckType::Image,
            image,
            region,
            timestamp,
            force_fail: false,
            name: None,
        })
    }

    pub fn comment(text: impl Into<String>, timestamp: f64) -> Self {
        Action::Comment(CommentAction {
            text: text.into(),
            timestamp,
        })
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Action::Mouse(m) => m.timestamp,
            Action::Keyboard(k) => k.timestamp,
            Action::Check(c) => c.timestamp,
            Action::Comment(c) => c.timestamp,
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Action::Mouse(m) if m.event == MouseEventKind::Move)
    }

    /// One-line human readable summary.
    pub fn describe(&self) -> String {
        match self {
            Action::Mouse(m) => {
                let button = m.button.map(|b| format!(" {b}")).unwrap_or_default();
                let base = match m.event {
                    MouseEventKind::Move => format!("mouse move to ({}, {})", m.x, m.y),
                    MouseEventKind::Down => format!("mouse down{button} at ({}, {})", m.x, m.y),
                    MouseEventKind::Up => format!("mouse up{button} at ({}, {})", m.x, m.y),
                    MouseEventKind::Scroll => format!(
                        "scroll ({}, {}) at ({}, {})",
                        m.dx.unwrap_or(0),
                        m.dy.unwrap_or(0),
                        m.x,
                        m.y
                    ),
                };
                match &m.screenshot {
                    Some(shot) => format!("{base} [screenshot {}x{}]", shot.width(), shot.height()),
                    None => base,
                }
            }
            Action::Keyboard(k) => match k.event {
                KeyEventKind::Down => format!("key down {}", k.key),
                KeyEventKind::Up => format!("key up {}", k.key),
            },
            Action::Check(c) => {
                let target = match c.region {
                    Some(r) => format!("region {}x{} at ({}, {})", r.width, r.height, r.x, r.y),
                    None => "active window".to_string(),
                };
                let label = c
                    .name
                    .as_deref()
                    .map(|n| format!(" '{n}'"))
                    .unwrap_or_default();
                let forced = if c.force_fail { " (forced failure)" } else { "" };
                format!("check{label} against {target}{forced}")
            }
            Action::Comment(c) => format!("# {}", c.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_action_json_shape() {
        let action = Action::mouse_down(MouseButton::Left, 10, 20, 1.5);
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "mouse");
        assert_eq!(value["event"], "down");
        assert_eq!(value["button"], "left");
        assert_eq!(value["timestamp"], 1.5);
        assert!(value.get("screenshot").is_none());
        assert!(value.get("dx").is_none());
    }

    #[test]
    fn test_check_defaults_when_fields_missing() {
        let image = Bitmap::filled(2, 2, [0, 0, 0, 255]);
        let json = serde_json::json!({
            "type": "check",
            "image": image.to_base64_png().unwrap(),
            "timestamp": 3.0,
        });
        let action: Action = serde_json::from_value(json).unwrap();
        match action {
            Action::Check(check) => {
                assert_eq!(check.check_type, CheckType::Image);
                assert!(!check.force_fail);
                assert_eq!(check.region, None);
                assert_eq!(check.image, image);
            }
            other => panic!("expected a check, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type": "gesture", "timestamp": 0.0}"#;
        assert!(serde_json::from_str::<Action>(json).is_err());
    }

    #[test]
    fn test_is_move_and_timestamp() {
        assert!(Action::mouse_move(1, 2, 0.5).is_move());
        assert!(!Action::mouse_up(MouseButton::Left, 1, 2, 0.5).is_move());
        assert!(!Action::key_down("a", 0.5).is_move());
        assert_eq!(Action::comment("hi", 4.25).timestamp(), 4.25);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            Action::mouse_down(MouseButton::Right, 5, 6, 0.0).describe(),
            "mouse down right at (5, 6)"
        );
        assert_eq!(Action::key_up("ctrl", 0.0).describe(), "key up ctrl");
        assert_eq!(Action::scroll(1, 2, 0, -3, 0.0).describe(), "scroll (0, -3) at (1, 2)");

        let mut check = Action::check(Bitmap::filled(1, 1, [0; 4]), None, 0.0);
        if let Action::Check(c) = &mut check {
            c.name = Some("login".into());
            c.force_fail = true;
        }
        assert_eq!(check.describe(), "check 'login' against active window (forced failure)");

        let shot = Action::Mouse(MouseAction {
            screenshot: Some(Bitmap::filled(100, 100, [0; 4])),
            ..match Action::mouse_down(MouseButton::Left, 1, 1, 0.0) {
                Action::Mouse(m) => m,
                _ => unreachable!(),
            }
        });
        assert_eq!(shot.describe(), "mouse down left at (1, 1) [screenshot 100x100]");
    }

    #[test]
    fn test_reference_region_prefers_stored_origin() {
        let down = match Action::mouse_down(MouseButton::Left, 1900, 1060, 0.0) {
            Action::Mouse(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(down.reference_region(), None);

        let legacy = down.clone().with_screenshot(Bitmap::filled(70, 70, [0; 4]));
        assert_eq!(legacy.reference_region(), Some(Region::new(1865, 1025, 70, 70)));

        let cropped = down.with_screenshot_at(Bitmap::filled(70, 70, [0; 4]), 1850, 1010);
        assert_eq!(cropped.reference_region(), Some(Region::new(1850, 1010, 70, 70)));

        let value = serde_json::to_value(Action::Mouse(cropped.clone())).unwrap();
        assert_eq!(value["screenshot_region"]["x"], 1850);
        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, Action::Mouse(cropped));
    }
}
