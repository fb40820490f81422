#![forbid(unsafe_code)]

//! Runtime handle: read context, observe switch, configuration and the
//! diagnostic channel.
//!
//! Every entry point of the crate takes a [`Runtime`]. Installed accessors
//! and observers keep a clone, so reads and writes always consult the
//! runtime their value was observed under. There is no ambient global
//! state.
//!
//! # Invariants
//!
//! 1. At most one subscriber is active per runtime.
//! 2. [`ReaderGuard`] restores the previous reader on drop, including
//!    during unwinding, so nested evaluations leave the outer one intact.
//! 3. The observe switch is a plain flag; callers pair on/off themselves
//!    (or use [`ObservePause`]).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dep::SubscriberHandle;
use crate::value::PropKey;

/// Callback receiving every emitted [`Diagnostic`].
pub type WarnHandler = Rc<dyn Fn(&Diagnostic)>;

/// Runtime configuration.
#[derive(Clone)]
pub struct ObserverConfig {
    /// Build debugger events, call `on_track`/`on_trigger` hooks, run
    /// custom setter hooks and emit diagnostics.
    /// Default: `cfg!(debug_assertions)`.
    pub dev_diagnostics: bool,

    /// Non-interactive render-only context: observation declines unless
    /// simulated reactivity is requested. Default: false.
    pub server_rendering: bool,

    /// Receives diagnostics in addition to the `tracing` warning.
    /// Default: none.
    pub warn_handler: Option<WarnHandler>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            dev_diagnostics: cfg!(debug_assertions),
            server_rendering: false,
            warn_handler: None,
        }
    }
}

impl ObserverConfig {
    #[must_use]
    pub fn with_dev_diagnostics(mut self, enabled: bool) -> Self {
        self.dev_diagnostics = enabled;
        self
    }

    #[must_use]
    pub fn with_server_rendering(mut self, enabled: bool) -> Self {
        self.server_rendering = enabled;
        self
    }

    #[must_use]
    pub fn with_warn_handler(mut self, handler: impl Fn(&Diagnostic) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for ObserverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverConfig")
            .field("dev_diagnostics", &self.dev_diagnostics)
            .field("server_rendering", &self.server_rendering)
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

/// Imperative operation a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Set,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Set => "set",
            Self::Delete => "delete",
        })
    }
}

/// Developer-facing warning. Never affects control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `set`/`delete` on undefined, null or a primitive.
    PrimitiveTarget {
        kind: MutationKind,
        type_name: &'static str,
    },
    /// `set`/`delete` on a composite marked read-only.
    ReadonlyTarget { kind: MutationKind, key: PropKey },
    /// New key on a composite used as framework root state.
    RootAdd { key: PropKey },
    /// Deletion on a composite used as framework root state.
    RootDelete { key: PropKey },
    /// `set` on an array index the array can never grow to cover.
    IndexOutOfRange { index: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimitiveTarget { kind, type_name } => write!(
                f,
                "cannot {kind} reactive property on undefined, null, or primitive value: {type_name}"
            ),
            Self::ReadonlyTarget { kind, key } => {
                write!(f, "{kind} operation on key \"{key}\" failed: target is readonly")
            }
            Self::RootAdd { key } => write!(
                f,
                "avoid adding reactive property \"{key}\" to root state at runtime; declare it upfront"
            ),
            Self::RootDelete { key } => write!(
                f,
                "avoid deleting property \"{key}\" on root state; set it to null instead"
            ),
            Self::IndexOutOfRange { index } => {
                write!(f, "cannot set array index {index}: exceeds the maximum array length")
            }
        }
    }
}

struct RuntimeInner {
    config: ObserverConfig,
    active: RefCell<Option<SubscriberHandle>>,
    observing: Cell<bool>,
}

/// Shared observation context. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ObserverConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ObserverConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                active: RefCell::new(None),
                observing: Cell::new(true),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ObserverConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.inner.config.dev_diagnostics
    }

    #[must_use]
    pub fn is_server_rendering(&self) -> bool {
        self.inner.config.server_rendering
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Read context ─────────────────────────────────────────────────

    /// The subscriber currently being evaluated.
    #[must_use]
    pub fn active_reader(&self) -> Option<SubscriberHandle> {
        self.inner.active.borrow().clone()
    }

    #[must_use]
    pub fn has_active_reader(&self) -> bool {
        self.inner.active.borrow().is_some()
    }

    /// Replace the active reader, returning the previous one so the caller
    /// can restore it.
    pub fn set_active_reader(&self, reader: Option<SubscriberHandle>) -> Option<SubscriberHandle> {
        self.inner.active.replace(reader)
    }

    /// Make `reader` active until the guard drops.
    pub fn enter_reader(&self, reader: SubscriberHandle) -> ReaderGuard {
        let previous = self.set_active_reader(Some(reader));
        ReaderGuard {
            rt: self.clone(),
            previous,
        }
    }

    /// Evaluate `f` with no active reader: its reads are not tracked.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.set_active_reader(None);
        let _guard = ReaderGuard {
            rt: self.clone(),
            previous,
        };
        f()
    }

    // ── Observe switch ───────────────────────────────────────────────

    #[must_use]
    pub fn should_observe(&self) -> bool {
        self.inner.observing.get()
    }

    pub fn toggle_observing(&self, enabled: bool) {
        self.inner.observing.set(enabled);
    }

    /// Disable observation until the guard drops.
    pub fn pause_observing(&self) -> ObservePause {
        let previous = self.inner.observing.replace(false);
        ObservePause {
            rt: self.clone(),
            previous,
        }
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    /// Emit a diagnostic when dev diagnostics are enabled.
    pub fn warn(&self, diagnostic: Diagnostic) {
        if !self.is_dev() {
            return;
        }
        tracing::warn!(%diagnostic, "observer diagnostic");
        if let Some(handler) = &self.inner.config.warn_handler {
            handler(&diagnostic);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("has_active_reader", &self.has_active_reader())
            .field("observing", &self.should_observe())
            .finish()
    }
}

/// Restores the previous active reader on drop.
#[must_use = "the reader is deactivated as soon as the guard drops"]
pub struct ReaderGuard {
    rt: Runtime,
    previous: Option<SubscriberHandle>,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.rt.set_active_reader(self.previous.take());
    }
}

/// Restores the previous observe switch on drop.
#[must_use = "observation resumes as soon as the guard drops"]
pub struct ObservePause {
    rt: Runtime,
    previous: bool,
}

impl Drop for ObservePause {
    fn drop(&mut self) {
        self.rt.toggle_observing(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep::{Subscriber, SubscriberId};
    use crate::error::RerunError;

    struct Noop(SubscriberId);

    impl Subscriber for Noop {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn update(&self) -> Result<(), RerunError> {
            Ok(())
        }
    }

    fn handle() -> SubscriberHandle {
        Rc::new(Noop(SubscriberId::next()))
    }

    #[test]
    fn set_active_reader_returns_previous() {
        let rt = Runtime::new();
        let a = handle();
        assert!(rt.set_active_reader(Some(a.clone())).is_none());
        let prev = rt.set_active_reader(None).expect("a was active");
        assert_eq!(prev.id(), a.id());
    }

    #[test]
    fn nested_guards_restore_outer_reader() {
        let rt = Runtime::new();
        let outer = handle();
        let inner = handle();
        let _outer_guard = rt.enter_reader(outer.clone());
        {
            let _inner_guard = rt.enter_reader(inner.clone());
            assert_eq!(rt.active_reader().map(|r| r.id()), Some(inner.id()));
        }
        assert_eq!(rt.active_reader().map(|r| r.id()), Some(outer.id()));
    }

    #[test]
    fn untracked_clears_then_restores() {
        let rt = Runtime::new();
        let reader = handle();
        let _guard = rt.enter_reader(reader.clone());
        let seen = rt.untracked(|| rt.has_active_reader());
        assert!(!seen);
        assert!(rt.has_active_reader());
    }

    #[test]
    fn pause_observing_restores_flag() {
        let rt = Runtime::new();
        {
            let _pause = rt.pause_observing();
            assert!(!rt.should_observe());
        }
        assert!(rt.should_observe());
        rt.toggle_observing(false);
        assert!(!rt.should_observe());
        rt.toggle_observing(true);
        assert!(rt.should_observe());
    }

    #[test]
    fn warn_reaches_handler_only_in_dev() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let rt = Runtime::with_config(
            ObserverConfig::default()
                .with_dev_diagnostics(true)
                .with_warn_handler(move |d| sink.borrow_mut().push(d.clone())),
        );
        rt.warn(Diagnostic::RootAdd { key: "x".into() });
        assert_eq!(seen.borrow().len(), 1);

        let quiet_seen = Rc::new(RefCell::new(0));
        let quiet_sink = Rc::clone(&quiet_seen);
        let quiet = Runtime::with_config(
            ObserverConfig::default()
                .with_dev_diagnostics(false)
                .with_warn_handler(move |_| *quiet_sink.borrow_mut() += 1),
        );
        quiet.warn(Diagnostic::RootAdd { key: "x".into() });
        assert_eq!(*quiet_seen.borrow(), 0);
    }

    #[test]
    fn diagnostic_messages() {
        let d = Diagnostic::ReadonlyTarget {
            kind: MutationKind::Delete,
            key: "name".into(),
        };
        assert_eq!(d.to_string(), "delete operation on key \"name\" failed: target is readonly");
        let d = Diagnostic::PrimitiveTarget {
            kind: MutationKind::Set,
            type_name: "number",
        };
        assert!(d.to_string().contains("primitive value: number"));
    }
}
