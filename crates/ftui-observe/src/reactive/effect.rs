#![forbid(unsafe_code)]

//! Side-effecting subscribers that re-run when what they read changes.
//!
//! # Design
//!
//! An [`Effect`] runs its closure once on creation with itself as the
//! runtime's active reader, so every reactive property read during the run
//! subscribes it. Before each re-run it drops all previous subscriptions and
//! collects a fresh set, so branches no longer taken stop triggering it.
//!
//! # Invariants
//!
//! 1. While the closure runs, the effect is the active reader; the previous
//!    reader is restored afterwards, even on unwinding.
//! 2. A trigger arriving while the effect is already running is ignored.
//! 3. After [`stop()`](Effect::stop) the effect holds no subscriptions and
//!    never runs again. Stopping from inside the closure takes effect
//!    immediately: reads after the stop are not tracked.
//! 4. Dropping the [`Effect`] handle stops it.
//!
//! # Failure Modes
//!
//! - **Closure returns an error**: the subscriptions collected up to that
//!   point are kept; the error goes to the notifying node, which logs it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::debug::DebuggerEvent;
use crate::dep::{Dep, Subscriber, SubscriberHandle, SubscriberId};
use crate::error::RerunError;
use crate::runtime::Runtime;

type RunFn = Box<dyn FnMut() -> Result<(), RerunError>>;
type EventHook = Rc<dyn Fn(&DebuggerEvent)>;

/// Dev-mode callbacks for an [`Effect`].
#[derive(Clone, Default)]
pub struct EffectHooks {
    /// A read subscribed the effect.
    pub on_track: Option<EventHook>,
    /// A write is about to re-run the effect.
    pub on_trigger: Option<EventHook>,
}

impl EffectHooks {
    #[must_use]
    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_track = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_trigger = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for EffectHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHooks")
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

struct EffectInner {
    id: SubscriberId,
    rt: Runtime,
    run_fn: RefCell<RunFn>,
    deps: RefCell<Vec<Dep>>,
    running: Cell<bool>,
    active: Cell<bool>,
    runs: Cell<u64>,
    hooks: EffectHooks,
    this: Weak<EffectInner>,
}

/// Clears the running flag on scope exit.
struct Running<'a>(&'a Cell<bool>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl EffectInner {
    fn run(&self) -> Result<(), RerunError> {
        if !self.active.get() {
            return Err(RerunError::Stopped);
        }
        if self.running.get() {
            tracing::trace!(effect = %self.id, "re-entrant trigger skipped");
            return Ok(());
        }
        let Some(this) = self.this.upgrade() else {
            return Err(RerunError::Stopped);
        };

        self.cleanup();
        self.running.set(true);
        let _running = Running(&self.running);
        self.runs.set(self.runs.get() + 1);

        let handle: SubscriberHandle = this;
        let _reader = self.rt.enter_reader(handle);
        let mut run_fn = self.run_fn.borrow_mut();
        (run_fn)()
    }

    fn cleanup(&self) {
        for dep in self.deps.take() {
            dep.unsubscribe(self.id);
        }
    }

    fn stop(&self) {
        if self.active.replace(false) {
            self.cleanup();
            tracing::trace!(effect = %self.id, "stopped");
        }
    }
}

impl Subscriber for EffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) -> Result<(), RerunError> {
        self.run()
    }

    fn should_track(&self, dep: &Dep) -> bool {
        if !self.active.get() {
            return false;
        }
        let mut deps = self.deps.borrow_mut();
        if !deps.iter().any(|d| d.ptr_eq(dep)) {
            deps.push(dep.clone());
        }
        true
    }

    fn on_track(&self, event: &DebuggerEvent) {
        if let Some(hook) = &self.hooks.on_track {
            hook(event);
        }
    }

    fn on_trigger(&self, event: &DebuggerEvent) {
        if let Some(hook) = &self.hooks.on_trigger {
            hook(event);
        }
    }
}

/// A closure that re-runs whenever a reactive value it read changes.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create and run an effect.
    pub fn new(rt: &Runtime, mut f: impl FnMut() + 'static) -> Self {
        Self::build(rt, EffectHooks::default(), move || {
            f();
            Ok(())
        })
    }

    /// Create and run an effect with dev-mode hooks.
    pub fn with_hooks(rt: &Runtime, hooks: EffectHooks, mut f: impl FnMut() + 'static) -> Self {
        Self::build(rt, hooks, move || {
            f();
            Ok(())
        })
    }

    /// Create and run an effect whose closure can fail.
    ///
    /// # Errors
    ///
    /// The error of the first run. The effect is stopped in that case.
    pub fn fallible(
        rt: &Runtime,
        f: impl FnMut() -> Result<(), RerunError> + 'static,
    ) -> Result<Self, RerunError> {
        let effect = Self::new_idle(rt, EffectHooks::default(), f);
        if let Err(err) = effect.inner.run() {
            effect.inner.stop();
            return Err(err);
        }
        Ok(effect)
    }

    fn build(
        rt: &Runtime,
        hooks: EffectHooks,
        f: impl FnMut() -> Result<(), RerunError> + 'static,
    ) -> Self {
        let effect = Self::new_idle(rt, hooks, f);
        if let Err(err) = effect.inner.run() {
            tracing::error!(effect = %effect.inner.id, error = %err, "initial run failed");
        }
        effect
    }

    fn new_idle(
        rt: &Runtime,
        hooks: EffectHooks,
        f: impl FnMut() -> Result<(), RerunError> + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|this| EffectInner {
            id: SubscriberId::next(),
            rt: rt.clone(),
            run_fn: RefCell::new(Box::new(f)),
            deps: RefCell::new(Vec::new()),
            running: Cell::new(false),
            active: Cell::new(true),
            runs: Cell::new(0),
            hooks,
            this: this.clone(),
        });
        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the closure now, re-collecting dependencies.
    ///
    /// # Errors
    ///
    /// [`RerunError::Stopped`] after [`stop()`](Self::stop); otherwise
    /// whatever the closure returns.
    pub fn run(&self) -> Result<(), RerunError> {
        self.inner.run()
    }

    /// Unsubscribe everywhere and never run again.
    pub fn stop(&self) {
        self.inner.stop();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of times the closure has started.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Number of nodes the effect is currently subscribed to.
    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// A handle that can stop the effect without keeping it alive, for
    /// closures that stop their own effect.
    #[must_use]
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.inner.active.get())
            .field("runs", &self.inner.runs.get())
            .field("deps", &self.inner.deps.borrow().len())
            .finish()
    }
}

/// Non-owning handle to an [`Effect`].
#[derive(Clone, Default)]
pub struct WeakEffect {
    inner: Weak<EffectInner>,
}

impl WeakEffect {
    /// Stop the effect if it is still alive.
    pub fn stop(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.stop();
        }
    }
}
