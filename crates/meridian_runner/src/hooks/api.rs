//! Hook registration and invocation.
//!
//! [`RunnerHooks`] keeps, per [`RunnerEventKind`], an ordered list of named
//! observers. Names are unique per kind so a plugin cannot accidentally
//! register twice; the same name may be used on different kinds.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::events::{RunnerEvent, RunnerEventKind};

type Observer = Arc<dyn Fn(&RunnerEvent) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// HookRegistrationError
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during hook registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRegistrationError {
    /// A hook with this name already exists for the event kind.
    DuplicateName {
        /// The kind where the duplicate was found.
        kind: RunnerEventKind,
        /// The duplicate hook name.
        name: String,
    },
}

impl fmt::Display for HookRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookRegistrationError::DuplicateName { kind, name } => {
                write!(f, "hook '{}' already registered for '{}' events", name, kind)
            }
        }
    }
}

impl core::error::Error for HookRegistrationError {}

// ─────────────────────────────────────────────────────────────────────────────
// RunnerHooks
// ─────────────────────────────────────────────────────────────────────────────

struct HookEntry {
    name: String,
    observer: Observer,
}

/// Registry of observers for [`RunnerEvent`]s.
///
/// Registration and invocation may happen concurrently. Observers are called
/// outside the registry lock, so an observer may itself register hooks.
#[derive(Default)]
pub struct RunnerHooks {
    hooks: RwLock<HashMap<RunnerEventKind, Vec<HookEntry>>>,
}

impl fmt::Debug for RunnerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut map = f.debug_map();
        for kind in RunnerEventKind::ALL {
            if let Some(entries) = hooks.get(&kind) {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                map.entry(&kind, &names);
            }
        }
        map.finish()
    }
}

impl RunnerHooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for every event kind.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if `name` is already
    /// registered for any kind. Nothing is registered in that case.
    pub fn register_observer<F>(
        &self,
        name: impl Into<String>,
        hook: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&RunnerEvent) + Send + Sync + 'static,
    {
        self.register_observer_for(&RunnerEventKind::ALL, name, hook)
    }

    /// Registers an observer for the given event kinds.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if `name` is already
    /// registered for one of `kinds`. Nothing is registered in that case.
    pub fn register_observer_for<F>(
        &self,
        kinds: &[RunnerEventKind],
        name: impl Into<String>,
        hook: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&RunnerEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let observer: Observer = Arc::new(hook);

        let mut hooks = self.hooks.write();
        for kind in kinds {
            if hooks
                .get(kind)
                .is_some_and(|entries| entries.iter().any(|entry| entry.name == name))
            {
                return Err(HookRegistrationError::DuplicateName {
                    kind: *kind,
                    name,
                });
            }
        }
        for kind in kinds {
            let entries = hooks.entry(*kind).or_default();
            if entries.iter().all(|entry| entry.name != name) {
                entries.push(HookEntry {
                    name: name.clone(),
                    observer: Arc::clone(&observer),
                });
            }
        }
        Ok(self)
    }

    /// Removes the hook named `name` from every kind. Returns whether any
    /// registration was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        for entries in self.hooks.write().values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.name != name);
            removed |= entries.len() != before;
        }
        removed
    }

    /// Calls every observer registered for the event's kind, in
    /// registration order.
    pub fn invoke(&self, event: &RunnerEvent) {
        let observers: Vec<Observer> = match self.hooks.read().get(&event.kind()) {
            Some(entries) => entries.iter().map(|e| Arc::clone(&e.observer)).collect(),
            None => return,
        };
        for observer in observers {
            observer(event);
        }
    }

    /// Number of hooks registered for `kind`.
    #[must_use]
    pub fn hook_count(&self, kind: RunnerEventKind) -> usize {
        self.hooks.read().get(&kind).map_or(0, Vec::len)
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started(node: &str) -> RunnerEvent {
        RunnerEvent::AttemptStarted {
            node_name: node.to_string(),
            attempt: 0,
        }
    }

    #[test]
    fn register_increments_count() {
        let hooks = RunnerHooks::new();
        hooks
            .register_observer_for(&[RunnerEventKind::AttemptStarted], "a", |_| {})
            .expect("registration should succeed");
        hooks
            .register_observer_for(&[RunnerEventKind::AttemptStarted], "b", |_| {})
            .expect("registration should succeed");
        assert_eq!(hooks.hook_count(RunnerEventKind::AttemptStarted), 2);
        assert_eq!(hooks.hook_count(RunnerEventKind::Failed), 0);
    }

    #[test]
    fn invoke_calls_hooks_in_order() {
        let hooks = RunnerHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            hooks
                .register_observer(name, move |_| order.lock().unwrap().push(name))
                .unwrap();
        }

        hooks.invoke(&started("n"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn filtered_observer_skips_other_kinds() {
        let hooks = RunnerHooks::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        hooks
            .register_observer_for(&[RunnerEventKind::Cancelled], "cancel", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        hooks.invoke(&started("n"));
        hooks.invoke(&RunnerEvent::Cancelled {
            node_name: "n".into(),
            attempts: 1,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_names_are_rejected_atomically() {
        let hooks = RunnerHooks::new();
        hooks
            .register_observer_for(&[RunnerEventKind::Failed], "log", |_| {})
            .unwrap();

        let err = hooks.register_observer("log", |_| {}).unwrap_err();
        assert_eq!(
            err,
            HookRegistrationError::DuplicateName {
                kind: RunnerEventKind::Failed,
                name: "log".into(),
            }
        );
        assert_eq!(hooks.hook_count(RunnerEventKind::AttemptStarted), 0);
        assert!(err.to_string().contains("'failed'"));
    }

    #[test]
    fn same_name_on_different_kinds_is_allowed() {
        let hooks = RunnerHooks::new();
        hooks
            .register_observer_for(&[RunnerEventKind::Succeeded], "log", |_| {})
            .unwrap()
            .register_observer_for(&[RunnerEventKind::Failed], "log", |_| {})
            .unwrap();
        assert_eq!(hooks.hook_count(RunnerEventKind::Succeeded), 1);
        assert_eq!(hooks.hook_count(RunnerEventKind::Failed), 1);
    }

    #[test]
    fn unregister_removes_everywhere() {
        let hooks = RunnerHooks::new();
        hooks.register_observer("all", |_| {}).unwrap();
        assert!(hooks.unregister("all"));
        assert!(hooks.is_empty());
        assert!(!hooks.unregister("all"));
    }

    #[test]
    fn observers_may_register_during_invoke() {
        let hooks = Arc::new(RunnerHooks::new());
        let inner = Arc::clone(&hooks);
        hooks
            .register_observer_for(&[RunnerEventKind::AttemptStarted], "spawner", move |_| {
                let _ = inner.register_observer_for(&[RunnerEventKind::Failed], "late", |_| {});
            })
            .unwrap();

        hooks.invoke(&started("n"));
        assert_eq!(hooks.hook_count(RunnerEventKind::Failed), 1);
    }
}
