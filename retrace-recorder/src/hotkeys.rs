use retrace::keys;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::capture::{InputHook, InputSink, RawInput, SubscriptionId};
use crate::{lock, Result};

/// Keys bound to recorder controls, as canonical key names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub pause: String,
    pub stop: String,
    pub check: String,
    pub resume: String,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            pause: "f8".to_string(),
            stop: "f10".to_string(),
            check: "f7".to_string(),
            resume: "f9".to_string(),
        }
    }
}

impl HotkeyBindings {
    /// Every bound key, normalized. Capture ignores these so the controls
    /// never end up in a recording.
    pub fn keys(&self) -> HashSet<String> {
        [&self.pause, &self.stop, &self.check, &self.resume]
            .into_iter()
            .map(|k| keys::canonical_name(k))
            .collect()
    }
}

pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct HotkeyCallbacks {
    pub on_pause: Option<HotkeyCallback>,
    pub on_stop: Option<HotkeyCallback>,
    pub on_check: Option<HotkeyCallback>,
    pub on_resume: Option<HotkeyCallback>,
}

impl HotkeyCallbacks {
    fn for_key(&self, bindings: &HotkeyBindings, key: &str) -> Option<HotkeyCallback> {
        let matches = |bound: &str| keys::canonical_name(bound) == key;
        if matches(&bindings.pause) {
            self.on_pause.clone()
        } else if matches(&bindings.stop) {
            self.on_stop.clone()
        } else if matches(&bindings.check) {
            self.on_check.clone()
        } else if matches(&bindings.resume) {
            self.on_resume.clone()
        } else {
            None
        }
    }
}

/// Process-wide recorder controls with an explicit lifecycle.
pub trait HotkeyCapability: Send + Sync {
    /// Begin dispatching key presses to `callbacks`, replacing any earlier set.
    fn start(&self, callbacks: HotkeyCallbacks) -> Result<()>;

    fn stop(&self);

    fn is_active(&self) -> bool;
}

/// [`HotkeyCapability`] listening on a shared [`InputHook`].
pub struct GlobalHotkeys {
    hook: Arc<dyn InputHook>,
    bindings: HotkeyBindings,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl GlobalHotkeys {
    pub fn new(hook: Arc<dyn InputHook>, bindings: HotkeyBindings) -> Self {
        Self {
            hook,
            bindings,
            subscription: Mutex::new(None),
        }
    }

    pub fn bindings(&self) -> &HotkeyBindings {
        &self.bindings
    }
}

impl HotkeyCapability for GlobalHotkeys {
    fn start(&self, callbacks: HotkeyCallbacks) -> Result<()> {
        let mut subscription = lock(&self.subscription);
        if let Some(id) = subscription.take() {
            self.hook.unsubscribe(id);
        }

        let bindings = self.bindings.clone();
        let sink: InputSink = Arc::new(move |raw| {
            if let RawInput::KeyPress(key) = raw {
                if let Some(callback) = callbacks.for_key(&bindings, key) {
                    debug!(key = %key, "Hotkey pressed");
                    callback();
                }
            }
        });
        *subscription = Some(self.hook.subscribe(sink)?);
        info!(
            pause = %self.bindings.pause,
            resume = %self.bindings.resume,
            check = %self.bindings.check,
            stop = %self.bindings.stop,
            "Hotkeys active"
        );
        Ok(())
    }

    fn stop(&self) {
        if let Some(id) = lock(&self.subscription).take() {
            self.hook.unsubscribe(id);
            debug!("Hotkeys stopped");
        }
    }

    fn is_active(&self) -> bool {
        lock(&self.subscription).is_some()
    }
}

impl Drop for GlobalHotkeys {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHook;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, HotkeyCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_dispatches_bound_keys_on_press_only() {
        let hook = FakeHook::new();
        let hotkeys = GlobalHotkeys::new(hook.clone(), HotkeyBindings::default());

        let (pauses, on_pause) = counter();
        let (stops, on_stop) = counter();
        hotkeys
            .start(HotkeyCallbacks {
                on_pause: Some(on_pause),
                on_stop: Some(on_stop),
                ..HotkeyCallbacks::default()
            })
            .unwrap();

        hook.emit(RawInput::KeyPress("f8".into()));
        hook.emit(RawInput::KeyRelease("f8".into()));
        hook.emit(RawInput::KeyPress("f10".into()));
        hook.emit(RawInput::KeyPress("f7".into()));
        hook.emit(RawInput::KeyPress("a".into()));

        assert_eq!(pauses.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_unsubscribes_and_restart_replaces() {
        let hook = FakeHook::new();
        let hotkeys = GlobalHotkeys::new(hook.clone(), HotkeyBindings::default());
        let (checks, on_check) = counter();
        let callbacks = HotkeyCallbacks {
            on_check: Some(on_check),
            ..HotkeyCallbacks::default()
        };

        hotkeys.start(callbacks.clone()).unwrap();
        hotkeys.start(callbacks).unwrap();
        assert_eq!(hook.subscriber_count(), 1);
        hook.emit(RawInput::KeyPress("f7".into()));
        assert_eq!(checks.load(Ordering::SeqCst), 1);

        hotkeys.stop();
        assert!(!hotkeys.is_active());
        hook.emit(RawInput::KeyPress("f7".into()));
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_binding_keys_are_canonical() {
        let bindings = HotkeyBindings {
            pause: "F1".into(),
            ..HotkeyBindings::default()
        };
        let keys = bindings.keys();
        assert!(keys.contains("f1"));
        assert!(keys.contains("f10"));
        assert_eq!(keys.len(), 4);
    }
}
