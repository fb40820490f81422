#![forbid(unsafe_code)]

//! Dependency nodes: subscriber registries for one reactive unit.
//!
//! A [`Dep`] exists per reactive property and per observed composite. Reads
//! performed while a subscriber is active call [`Dep::depend`]; writes call
//! [`Dep::notify`], which synchronously re-runs every subscriber.
//!
//! # Invariants
//!
//! 1. A subscriber appears at most once per node (identity by
//!    [`SubscriberId`]).
//! 2. `notify` re-runs subscribers in subscription order over a snapshot
//!    taken when it starts; a subscriber removed before its turn is skipped.
//! 3. No borrow of the subscriber list is held while a subscriber runs, so
//!    re-runs may subscribe, unsubscribe or notify freely.
//! 4. One failing subscriber never prevents the others from running.
//!
//! # Failure Modes
//!
//! - **Subscriber re-run fails**: logged at `error` with the subscriber id;
//!   counted in the return value of `notify`.
//! - **Mock node**: every operation is a no-op and `notify` returns 0.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::debug::DebuggerEvent;
use crate::error::RerunError;
use crate::runtime::Runtime;

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a fresh, process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A computation that can be re-run when something it read changes.
pub trait Subscriber {
    fn id(&self) -> SubscriberId;

    /// Re-run the computation.
    ///
    /// # Errors
    ///
    /// Any [`RerunError`]; the notifying node logs it and continues.
    fn update(&self) -> Result<(), RerunError>;

    /// Asked before a tracked read registers this subscriber on `dep`.
    /// Evaluation drivers use it to remember their dependencies, or return
    /// `false` to decline (a stopped driver, say).
    fn should_track(&self, _dep: &Dep) -> bool {
        true
    }

    /// Dev-mode hook: a tracked read happened.
    fn on_track(&self, _event: &DebuggerEvent) {}

    /// Dev-mode hook: a dependency is about to re-run this subscriber.
    fn on_trigger(&self, _event: &DebuggerEvent) {}
}

pub type SubscriberHandle = Rc<dyn Subscriber>;

struct DepInner {
    id: u64,
    subs: RefCell<Vec<SubscriberHandle>>,
}

/// Subscriber registry for one reactive unit. Cloning shares the registry.
#[derive(Clone)]
pub struct Dep {
    /// `None` for a mock node.
    inner: Option<Rc<DepInner>>,
}

impl Dep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Some(Rc::new(DepInner {
                id: NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed),
                subs: RefCell::new(Vec::new()),
            })),
        }
    }

    /// An inert node, used by observers in simulated mode.
    #[must_use]
    pub fn mock() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.inner.is_none()
    }

    /// Process-unique id; 0 for mock nodes.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.id)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Add `sub` unless it is already registered.
    pub fn subscribe(&self, sub: SubscriberHandle) {
        let Some(inner) = &self.inner else { return };
        let mut subs = inner.subs.borrow_mut();
        let id = sub.id();
        if !subs.iter().any(|s| s.id() == id) {
            subs.push(sub);
        }
    }

    /// Remove the subscriber with `id`, if present.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let Some(inner) = &self.inner else { return };
        inner.subs.borrow_mut().retain(|s| s.id() != id);
    }

    #[must_use]
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.subs.borrow().iter().any(|s| s.id() == id))
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.subs.borrow().len())
    }

    /// Register the runtime's active reader, if any.
    pub fn depend(&self, rt: &Runtime) {
        self.depend_inner(rt, None);
    }

    /// Dev path of [`depend`](Self::depend): also reports `event` to the
    /// reader's `on_track` hook.
    pub fn depend_with(&self, rt: &Runtime, event: DebuggerEvent) {
        self.depend_inner(rt, Some(event));
    }

    fn depend_inner(&self, rt: &Runtime, event: Option<DebuggerEvent>) {
        if self.is_mock() {
            return;
        }
        let Some(reader) = rt.active_reader() else {
            return;
        };
        if !reader.should_track(self) {
            return;
        }
        self.subscribe(Rc::clone(&reader));
        if let Some(event) = event {
            reader.on_track(&event);
        }
    }

    /// Re-run every subscriber. Returns the number of failed re-runs.
    pub fn notify(&self) -> usize {
        self.notify_inner(None)
    }

    /// Dev path of [`notify`](Self::notify): each subscriber's `on_trigger`
    /// hook sees `event` before it re-runs.
    pub fn notify_with(&self, event: DebuggerEvent) -> usize {
        self.notify_inner(Some(&event))
    }

    fn notify_inner(&self, event: Option<&DebuggerEvent>) -> usize {
        let Some(inner) = &self.inner else { return 0 };
        let snapshot: SmallVec<[SubscriberHandle; 8]> =
            inner.subs.borrow().iter().cloned().collect();
        tracing::trace!(dep = inner.id, subscribers = snapshot.len(), "notify");

        let mut failures = 0;
        for sub in snapshot {
            let id = sub.id();
            if !self.has_subscriber(id) {
                continue;
            }
            if let Some(event) = event {
                sub.on_trigger(event);
            }
            if let Err(err) = sub.update() {
                failures += 1;
                tracing::error!(dep = inner.id, subscriber = %id, error = %err, "subscriber re-run failed");
            }
        }
        failures
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Dep(mock)"),
            Some(inner) => f
                .debug_struct("Dep")
                .field("id", &inner.id)
                .field("subscribers", &inner.subs.borrow().len())
                .finish(),
        }
    }
}
