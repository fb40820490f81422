#![forbid(unsafe_code)]

//! Lazy computed values that auto-update from the reactive properties they
//! read.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. The compute function runs with the computed
//! as the runtime's active reader, so it subscribes to every reactive
//! property it touches. When any of them changes, the cached value is
//! invalidated (marked dirty) and readers of the computed are notified. The
//! next call to [`get()`](Computed::get) recomputes and caches the result.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of all
//!    dependencies (no stale reads after a dependency mutation completes).
//! 2. The compute function is called at most once per dependency change cycle
//!    (memoization).
//! 3. If no dependency has changed, `get()` returns the cached value without
//!    recomputing.
//! 4. Version increments by exactly 1 per recomputation.
//! 5. Readers are notified only on the clean-to-dirty transition, so a burst
//!    of source writes between two reads notifies once.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: The cached value remains from the last
//!   successful computation. The dirty flag stays set so the next `get()` will
//!   retry.
//! - **Reading inside its own compute function**: the nested `get()` sees
//!   the previous cached value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dep::{Dep, Subscriber, SubscriberHandle, SubscriberId};
use crate::error::RerunError;
use crate::runtime::Runtime;

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    id: SubscriberId,
    rt: Runtime,
    /// The computation function.
    compute: Box<dyn Fn() -> T>,
    /// Cached result (None only before first computation).
    cached: RefCell<Option<T>>,
    /// Whether the cached value is stale.
    dirty: Cell<bool>,
    computing: Cell<bool>,
    /// Monotonically increasing version, bumped on each recomputation.
    version: Cell<u64>,
    /// Readers of this computed.
    dep: Dep,
    /// Nodes the last computation read from.
    sources: RefCell<Vec<Dep>>,
}

impl<T> ComputedInner<T> {
    fn detach(&self) {
        for source in self.sources.take() {
            source.unsubscribe(self.id);
        }
    }
}

impl<T> Subscriber for ComputedInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) -> Result<(), RerunError> {
        if !self.dirty.replace(true) {
            self.dep.notify();
        }
        Ok(())
    }

    fn should_track(&self, dep: &Dep) -> bool {
        let mut sources = self.sources.borrow_mut();
        if !sources.iter().any(|s| s.ptr_eq(dep)) {
            sources.push(dep.clone());
        }
        true
    }
}

/// Holds the computing flag for the duration of one evaluation.
struct Computing<'a>(&'a Cell<bool>);

impl<'a> Computing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A lazily-evaluated, memoized value derived from reactive state.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
///
/// # Invariants
///
/// 1. `dirty` is true after any dependency changes and before `get()`.
/// 2. `version` increments by 1 on each recomputation.
/// 3. The compute function is called only when `dirty` is true and `get()`
///    is called.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("version", &self.inner.version.get())
            .field("sources", &self.inner.sources.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. Nothing runs until the first read.
    pub fn new(rt: &Runtime, compute: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(ComputedInner {
                id: SubscriberId::next(),
                rt: rt.clone(),
                compute: Box::new(compute),
                cached: RefCell::new(None),
                dirty: Cell::new(true), // Dirty initially; computes on first get().
                computing: Cell::new(false),
                version: Cell::new(0),
                dep: Dep::new(),
                sources: RefCell::new(Vec::new()),
            }),
        }
    }

    fn refresh(&self) {
        let inner = &self.inner;
        let stale = inner.dirty.get() || inner.cached.borrow().is_none();
        if !stale || inner.computing.get() {
            return;
        }
        inner.detach();
        let value = {
            let _computing = Computing::enter(&inner.computing);
            let handle: SubscriberHandle = Rc::clone(&self.inner) as SubscriberHandle;
            let _reader = inner.rt.enter_reader(handle);
            (inner.compute)()
        };
        *inner.cached.borrow_mut() = Some(value);
        inner.dirty.set(false);
        inner.version.set(inner.version.get() + 1);
    }

    /// Get the current value, recomputing if any dependency has changed.
    ///
    /// Returns a clone of the cached value. A subscriber reading this
    /// subscribes to the computed itself.
    ///
    /// # Panics
    ///
    /// Panics if the compute function reads this same `Computed` before
    /// it has ever produced a value.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Access the current value by reference without cloning.
    ///
    /// Forces recomputation if dirty. The closure receives an immutable
    /// reference to the cached value.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes state this `Computed` depends on and
    /// then reads it again (re-entrant borrow), or in the case described
    /// under [`get()`](Self::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.refresh();
        self.inner.dep.depend(&self.inner.rt);
        let cached = self.inner.cached.borrow();
        f(cached.as_ref().expect("cached is always Some after refresh"))
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Force invalidation of the cached value. The next `get()` will
    /// recompute.
    pub fn invalidate(&self) {
        self.inner.dirty.set(true);
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Node notified when the cached value goes stale.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Number of nodes the last computation read from.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }

    /// Unsubscribe from every source and mark dirty. The next `get()`
    /// resubscribes.
    pub fn detach(&self) {
        self.inner.detach();
        self.inner.dirty.set(true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
