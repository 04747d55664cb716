//! Compiles recorded actions into a standalone automation program.
//!
//! Compilation is a single left-to-right pass producing a flat list of
//! [`Instruction`]s plus the reference images they verify against. Consecutive
//! low-level events are folded where the result is unambiguous: presses and
//! releases at one spot become clicks, plain typing becomes text, and keys
//! pressed under `ctrl`/`alt`/`shift` become chords. Pacing and move
//! throttling follow the playback engine exactly.

use retrace::{keys, Bitmap, MouseButton, Tolerance};
use tracing::debug;

use crate::actions::{Action, KeyEventKind, KeyboardAction, MouseAction, MouseEventKind, Region};

mod export;
mod pyautogui;

pub use export::{ExportSummary, ScriptExporter};
pub use pyautogui::PyAutoGuiRenderer;

/// Configuration for script compilation
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Only every Nth consecutive mouse move is emitted
    pub move_event_stride: usize,

    /// Tolerance used by the generated verification routines
    pub tolerance: Tolerance,

    /// Delay before the first instruction, giving the user time to switch windows
    pub start_delay_secs: f64,

    /// Abort the generated program when the pointer hits a screen corner
    pub failsafe: bool,

    /// Gaps shorter than this produce no wait
    pub min_wait_secs: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            move_event_stride: 5,
            tolerance: Tolerance::Medium,
            start_delay_secs: 2.0,
            failsafe: true,
            min_wait_secs: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Wait(f64),
    MoveTo {
        x: i32,
        y: i32,
    },
    Click {
        x: i32,
        y: i32,
        button: MouseButton,
    },
    /// Press at the current pointer position
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    Scroll {
        x: i32,
        y: i32,
        dx: i64,
        dy: i64,
    },
    KeyDown(String),
    KeyUp(String),
    /// Down and up of one key
    Press(String),
    /// Start holding a chord modifier
    Hold(String),
    Release(String),
    TypeText(String),
    /// Compare the screen area the image was recorded from
    VerifyRegion {
        image: String,
        region: Region,
    },
    /// Compare `region`, or the active window resized to the image
    VerifyWindow {
        image: String,
        region: Option<Region>,
    },
    Comment(String),
}

/// A reference image to persist next to the generated program.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub image: Bitmap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledScript {
    pub instructions: Vec<Instruction>,
    pub images: Vec<ReferenceImage>,
}

/// Per-compilation cursor state.
#[derive(Default)]
struct Cursor {
    last_time: f64,
    move_count: usize,
    /// Modifiers currently held, in the order they were pressed
    held: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptCompiler {
    config: CompilerConfig,
}

impl ScriptCompiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, actions: &[Action]) -> CompiledScript {
        let stride = self.config.move_event_stride.max(1);
        let mut out = CompiledScript::default();
        let mut cursor = Cursor::default();
        let mut i = 0;

        while i < actions.len() {
            let action = &actions[i];
            let timestamp = action.timestamp();
            let wait = (timestamp - cursor.last_time).max(0.0);
            cursor.last_time = timestamp;

            if action.is_move() {
                cursor.move_count += 1;
                if cursor.move_count % stride != 0 {
                    i += 1;
                    continue;
                }
            } else {
                cursor.move_count = 0;
                if wait >= self.config.min_wait_secs {
                    out.instructions.push(Instruction::Wait(wait));
                }
            }

            let consumed = match action {
                Action::Mouse(mouse) => Self::compile_mouse(actions, i, mouse, &mut out),
                Action::Keyboard(key) => Self::compile_key(actions, i, key, &mut cursor, &mut out),
                Action::Check(check) => {
                    let file_name = format!("check_{i}.png");
                    out.images.push(ReferenceImage {
                        file_name: file_name.clone(),
                        image: check.image.clone(),
                    });
                    out.instructions.push(Instruction::VerifyWindow {
                        image: file_name,
                        region: check.region,
                    });
                    1
                }
                Action::Comment(comment) => {
                    out.instructions
                        .push(Instruction::Comment(comment.text.clone()));
                    1
                }
            };

            // Folded events still move the clock forward.
            if consumed > 1 {
                cursor.last_time = actions[i + consumed - 1].timestamp();
            }
            i += consumed;
        }

        for modifier in cursor.held.drain(..) {
            out.instructions.push(Instruction::Release(modifier));
        }

        debug!(
            actions = actions.len(),
            instructions = out.instructions.len(),
            images = out.images.len(),
            "Compiled script"
        );
        out
    }

    /// Returns how many actions were consumed, starting at `i`.
    fn compile_mouse(
        actions: &[Action],
        i: usize,
        mouse: &MouseAction,
        out: &mut CompiledScript,
    ) -> usize {
        let (x, y) = (mouse.x, mouse.y);
        let button = mouse.button_or_default();
        match mouse.event {
            MouseEventKind::Move => {
                out.instructions.push(Instruction::MoveTo { x, y });
                1
            }
            MouseEventKind::Down => {
                if let (Some(shot), Some(region)) =
                    (&mouse.screenshot, mouse.reference_region())
                {
                    let file_name = format!("screenshot_{i}.png");
                    out.images.push(ReferenceImage {
                        file_name: file_name.clone(),
                        image: shot.clone(),
                    });
                    out.instructions.push(Instruction::VerifyRegion {
                        image: file_name,
                        region,
                    });
                }
                let released_here = matches!(
                    actions.get(i + 1),
                    Some(Action::Mouse(up))
                        if up.event == MouseEventKind::Up
                            && (up.x, up.y) == (x, y)
                            && up.button_or_default() == button
                );
                if released_here {
                    out.instructions.push(Instruction::Click { x, y, button });
                    2
                } else {
                    out.instructions.push(Instruction::MoveTo { x, y });
                    out.instructions.push(Instruction::MouseDown(button));
                    1
                }
            }
            MouseEventKind::Up => {
                out.instructions.push(Instruction::MoveTo { x, y });
                out.instructions.push(Instruction::MouseUp(button));
                1
            }
            MouseEventKind::Scroll => {
                out.instructions.push(Instruction::Scroll {
                    x,
                    y,
                    dx: mouse.dx.unwrap_or(0),
                    dy: mouse.dy.unwrap_or(0),
                });
                1
            }
        }
    }

    fn compile_key(
        actions: &[Action],
        i: usize,
        key: &KeyboardAction,
        cursor: &mut Cursor,
        out: &mut CompiledScript,
    ) -> usize {
        let name = keys::canonical_name(&key.key);

        if keys::is_modifier(&name) {
            match key.event {
                KeyEventKind::Down => {
                    if !cursor.held.contains(&name) {
                        out.instructions.push(Instruction::Hold(name.clone()));
                        cursor.held.push(name);
                    }
                }
                KeyEventKind::Up => {
                    if let Some(pos) = cursor.held.iter().position(|m| *m == name) {
                        cursor.held.remove(pos);
                        out.instructions.push(Instruction::Release(name));
                    }
                }
            }
            return 1;
        }

        if key.event == KeyEventKind::Up {
            out.instructions.push(Instruction::KeyUp(name));
            return 1;
        }

        if cursor.held.is_empty() && keys::is_printable(&name) {
            let (text, consumed) = Self::collect_text(actions, i);
            out.instructions.push(Instruction::TypeText(text));
            return consumed;
        }

        let released_next = Self::is_key_up(actions.get(i + 1), &name);
        if !cursor.held.is_empty() || released_next {
            out.instructions.push(Instruction::Press(name));
            return if released_next { 2 } else { 1 };
        }

        out.instructions.push(Instruction::KeyDown(name));
        1
    }

    /// Collect a run of printable key downs starting at `start`, swallowing
    /// each one's immediately following up.
    fn collect_text(actions: &[Action], start: usize) -> (String, usize) {
        let mut text = String::new();
        let mut j = start;
        while let Some(Action::Keyboard(k)) = actions.get(j) {
            if k.event != KeyEventKind::Down {
                break;
            }
            let name = keys::canonical_name(&k.key);
            if keys::is_modifier(&name) {
                break;
            }
            let Some(c) = keys::printable_char(&name) else {
                break;
            };
            text.push(c);
            j += 1;
            if Self::is_key_up(actions.get(j), &name) {
                j += 1;
            }
        }
        (text, j - start)
    }

    fn is_key_up(action: Option<&Action>, name: &str) -> bool {
        matches!(
            action,
            Some(Action::Keyboard(k))
                if k.event == KeyEventKind::Up && keys::canonical_name(&k.key) == name
        )
    }
}
