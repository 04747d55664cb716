//! Record, edit, replay and export desktop input sessions.
//!
//! Raw input from an [`InputHook`] is turned into [`Action`]s by a
//! [`SessionController`]. The resulting sequence can be edited with an
//! [`ActionEditor`], replayed with visual verification by a [`Player`], saved
//! with [`save_actions`], or compiled into a standalone program by a
//! [`ScriptExporter`].

pub mod actions;
pub mod capture;
pub mod editor;
pub mod error;
pub mod hotkeys;
pub mod playback;
pub mod script;
pub mod session;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use actions::{
    Action, CheckAction, CheckType, CommentAction, KeyEventKind, KeyboardAction, MouseAction,
    MouseEventKind, Region,
};
pub use capture::{
    CaptureConfig, EventCapture, InputHook, InputSink, RawInput, RdevHook, SubscriptionId,
};
pub use editor::ActionEditor;
pub use error::{RecorderError, Result};
pub use hotkeys::{GlobalHotkeys, HotkeyBindings, HotkeyCallback, HotkeyCallbacks, HotkeyCapability};
pub use playback::{
    Decision, DecisionSignal, FailureHandler, PlaybackConfig, PlaybackHandle, PlaybackOutcome,
    PlaybackRunner, Player,
};
pub use script::{
    CompiledScript, CompilerConfig, ExportSummary, Instruction, PyAutoGuiRenderer,
    ReferenceImage, ScriptCompiler, ScriptExporter,
};
pub use session::{SessionController, SessionState};
pub use storage::{load_actions, save_actions, SessionFile, SESSION_FORMAT_VERSION};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it. Every critical section here leaves the data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
