use std::fmt::Write as _;

use super::{CompiledScript, CompilerConfig, Instruction};
use retrace::MouseButton;

/// Renders compiled instructions as a Python program driven by `pyautogui`,
/// using Pillow for the image comparisons.
///
/// The comparison in the generated `_similar` mirrors the engine's: sizes
/// must match and the mean per-channel difference over RGB must not exceed
/// the tolerance.
#[derive(Debug, Clone)]
pub struct PyAutoGuiRenderer {
    tolerance: f64,
    start_delay_secs: f64,
    failsafe: bool,
}

impl Default for PyAutoGuiRenderer {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

const PRELUDE: &str = r#"import os
import sys
import time

import pyautogui
from PIL import Image, ImageChops, ImageStat
"#;

const HELPERS: &str = r#"

def _similar(reference, actual):
    reference = reference.convert("RGB")
    actual = actual.convert("RGB")
    if reference.size != actual.size:
        return False
    means = ImageStat.Stat(ImageChops.difference(reference, actual)).mean
    return sum(means) / len(means) <= TOLERANCE


def _confirm_continue(name):
    answer = input(f"Visual check '{name}' failed. Continue? [y/N] ")
    if answer.strip().lower() not in ("y", "yes"):
        print("Aborted.")
        sys.exit(1)


def _active_window_screenshot():
    try:
        window = pyautogui.getActiveWindow()
    except Exception:
        window = None
    if window is None:
        return pyautogui.screenshot()
    return pyautogui.screenshot(region=(window.left, window.top, window.width, window.height))


def verify_region(name, left, top, width, height):
    reference = Image.open(os.path.join(IMAGES, name))
    actual = pyautogui.screenshot(region=(left, top, width, height))
    if not _similar(reference, actual):
        _confirm_continue(name)


def verify_window(name, region=None):
    reference = Image.open(os.path.join(IMAGES, name))
    if region is None:
        actual = _active_window_screenshot().resize(reference.size)
    else:
        actual = pyautogui.screenshot(region=region)
    if not _similar(reference, actual):
        _confirm_continue(name)

"#;

impl PyAutoGuiRenderer {
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self {
            tolerance: config.tolerance.value(),
            start_delay_secs: config.start_delay_secs,
            failsafe: config.failsafe,
        }
    }

    /// Render `script`. `images_dir` is the directory holding the reference
    /// images, relative to the generated file.
    pub fn render(&self, script: &CompiledScript, images_dir: &str) -> String {
        let mut out = String::new();
        out.push_str("#!/usr/bin/env python3\n");
        out.push_str("# Generated by retrace. Requires pyautogui and Pillow.\n");
        out.push_str(PRELUDE);
        out.push('\n');
        let _ = writeln!(
            out,
            "pyautogui.FAILSAFE = {}",
            if self.failsafe { "True" } else { "False" }
        );
        let _ = writeln!(out, "TOLERANCE = {:?}", self.tolerance);
        let _ = writeln!(
            out,
            "IMAGES = os.path.join(os.path.dirname(os.path.abspath(__file__)), {})",
            py_str(images_dir)
        );
        out.push_str(HELPERS);
        out.push('\n');
        let _ = writeln!(
            out,
            "time.sleep({:.3})  # Wait before starting",
            self.start_delay_secs.max(0.0)
        );

        for instruction in &script.instructions {
            for line in render_instruction(instruction) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

fn render_instruction(instruction: &Instruction) -> Vec<String> {
    match instruction {
        Instruction::Wait(secs) => vec![format!("time.sleep({secs:.3})")],
        Instruction::MoveTo { x, y } => vec![format!("pyautogui.moveTo({x}, {y})")],
        Instruction::Click { x, y, button } => match button {
            MouseButton::Left => vec![format!("pyautogui.click({x}, {y})")],
            other => vec![format!("pyautogui.click({x}, {y}, button={})", py_str(other.as_str()))],
        },
        Instruction::MouseDown(button) => {
            vec![format!("pyautogui.mouseDown(button={})", py_str(button.as_str()))]
        }
        Instruction::MouseUp(button) => {
            vec![format!("pyautogui.mouseUp(button={})", py_str(button.as_str()))]
        }
        Instruction::Scroll { x, y, dx, dy } => {
            let mut lines = Vec::new();
            if *dy != 0 || *dx == 0 {
                lines.push(format!("pyautogui.scroll({dy}, x={x}, y={y})"));
            }
            if *dx != 0 {
                lines.push(format!("pyautogui.hscroll({dx}, x={x}, y={y})"));
            }
            lines
        }
        Instruction::KeyDown(key) | Instruction::Hold(key) => {
            vec![format!("pyautogui.keyDown({})", py_str(key))]
        }
        Instruction::KeyUp(key) | Instruction::Release(key) => {
            vec![format!("pyautogui.keyUp({})", py_str(key))]
        }
        Instruction::Press(key) => vec![format!("pyautogui.press({})", py_str(key))],
        Instruction::TypeText(text) => vec![format!("pyautogui.write({})", py_str(text))],
        Instruction::VerifyRegion { image, region } => vec![format!(
            "verify_region({}, {}, {}, {}, {})",
            py_str(image),
            region.x,
            region.y,
            region.width,
            region.height
        )],
        Instruction::VerifyWindow { image, region } => match region {
            Some(r) => vec![format!(
                "verify_window({}, region=({}, {}, {}, {}))",
                py_str(image),
                r.x,
                r.y,
                r.width,
                r.height
            )],
            None => vec![format!("verify_window({})", py_str(image))],
        },
        Instruction::Comment(text) => comment_lines(text)
            .map(|l| format!("# {}", l.replace(|c: char| c.is_control() && c != '\t', " ")))
            .collect(),
    }
}

/// Python ends a source line at `\r\n`, `\r` or `\n`.
fn comment_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split("\r\n").flat_map(|l| l.split(['\r', '\n']))
}

/// Single-quoted Python string literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Region;
    use retrace::Tolerance;

    fn render(instructions: Vec<Instruction>) -> String {
        PyAutoGuiRenderer::default().render(
            &CompiledScript {
                instructions,
                images: vec![],
            },
            "demo_images",
        )
    }

    #[test]
    fn test_header() {
        let script = render(vec![]);
        assert!(script.starts_with("#!/usr/bin/env python3\n"));
        assert!(script.contains("import pyautogui\n"));
        assert!(script.contains("pyautogui.FAILSAFE = True\n"));
        assert!(script.contains("TOLERANCE = 7.0\n"));
        assert!(script.contains("'demo_images')\n"));
        assert!(script.trim_end().ends_with("time.sleep(2.000)  # Wait before starting"));
    }

    #[test]
    fn test_tolerance_and_failsafe_follow_config() {
        let renderer = PyAutoGuiRenderer::from_config(&CompilerConfig {
            tolerance: Tolerance::Low,
            failsafe: false,
            start_delay_secs: 0.5,
            ..CompilerConfig::default()
        });
        let script = renderer.render(&CompiledScript::default(), "x");
        assert!(script.contains("TOLERANCE = 3.0\n"));
        assert!(script.contains("pyautogui.FAILSAFE = False\n"));
        assert!(script.contains("time.sleep(0.500)  # Wait before starting\n"));
    }

    #[test]
    fn test_instruction_lines() {
        let script = render(vec![
            Instruction::Wait(0.25),
            Instruction::MoveTo { x: 1, y: 2 },
            Instruction::Click {
                x: 3,
                y: 4,
                button: MouseButton::Left,
            },
            Instruction::Click {
                x: 3,
                y: 4,
                button: MouseButton::Right,
            },
            Instruction::MouseDown(MouseButton::Left),
            Instruction::Scroll {
                x: 5,
                y: 6,
                dx: 2,
                dy: -3,
            },
            Instruction::Hold("ctrl".into()),
            Instruction::Press("c".into()),
            Instruction::Release("ctrl".into()),
            Instruction::TypeText("it's".into()),
            Instruction::VerifyRegion {
                image: "screenshot_7.png".into(),
                region: Region::new(0, 10, 100, 100),
            },
            Instruction::VerifyWindow {
                image: "check_8.png".into(),
                region: None,
            },
            Instruction::VerifyWindow {
                image: "check_9.png".into(),
                region: Some(Region::new(1, 2, 3, 4)),
            },
            Instruction::Comment("two\nlines".into()),
        ]);
        let body: Vec<&str> = script
            .lines()
            .skip_while(|l| !l.ends_with("# Wait before starting"))
            .skip(1)
            .collect();
        assert_eq!(
            body,
            vec![
                "time.sleep(0.250)",
                "pyautogui.moveTo(1, 2)",
                "pyautogui.click(3, 4)",
                "pyautogui.click(3, 4, button='right')",
                "pyautogui.mouseDown(button='left')",
                "pyautogui.scroll(-3, x=5, y=6)",
                "pyautogui.hscroll(2, x=5, y=6)",
                "pyautogui.keyDown('ctrl')",
                "pyautogui.press('c')",
                "pyautogui.keyUp('ctrl')",
                "pyautogui.write('it\\'s')",
                "verify_region('screenshot_7.png', 0, 10, 100, 100)",
                "verify_window('check_8.png')",
                "verify_window('check_9.png', region=(1, 2, 3, 4))",
                "# two",
                "# lines",
            ]
        );
    }

    #[test]
    fn test_comment_line_breaks_stay_commented() {
        let script = render(vec![Instruction::Comment(
            "note\rprint('x')\r\nend\x0bhere".into(),
        )]);
        let body: Vec<&str> = script
            .lines()
            .skip_while(|l| !l.ends_with("# Wait before starting"))
            .skip(1)
            .collect();
        assert_eq!(body, vec!["# note", "# print('x')", "# end here"]);
        assert!(!script.contains('\r'));
    }

    #[test]
    fn test_py_str_escapes() {
        assert_eq!(py_str("a\\b"), "'a\\\\b'");
        assert_eq!(py_str("tab\t"), "'tab\\t'");
        assert_eq!(py_str("\u{1}"), "'\\x01'");
    }
}
