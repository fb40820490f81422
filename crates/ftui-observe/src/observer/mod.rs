#![forbid(unsafe_code)]

//! Recursive instrumentation of composite values.
//!
//! [`observe`] attaches one [`Observer`] to an object or array. For objects
//! every enumerable own key becomes a reactive accessor pair
//! ([`define_reactive`]); for arrays the mutator table is swapped for the
//! intercepting one and the elements are observed in turn.
//!
//! # Invariants
//!
//! 1. A composite carries at most one observer for its whole lifetime.
//!    Observing it again returns the same `Rc<Observer>`.
//! 2. The back-reference is attached before keys are walked, so cyclic
//!    structures terminate.
//! 3. A mock observer has an inert [`Dep`] and never installs the bridge.
//! 4. Only the seven array mutators and the imperative [`set`]/[`delete`]
//!    notify structural changes. Index writes, length writes and plain
//!    assignment of new keys do not.

mod bridge;
mod define;
mod mutate;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::debug::DebuggerEvent;
use crate::dep::Dep;
use crate::runtime::Runtime;
use crate::value::{Composite, CompositeFlags, Value, WeakComposite};

pub use define::{CustomSetter, ReactiveOptions, define_reactive};
pub use mutate::{delete, set};

/// Per-composite controller.
pub struct Observer {
    value: WeakComposite,
    dep: Dep,
    vm_count: Cell<u32>,
    shallow: bool,
    mock: bool,
    rt: Runtime,
}

impl Observer {
    fn attach(rt: &Runtime, composite: &Composite, shallow: bool, mock: bool) -> Rc<Self> {
        let observer = Rc::new(Self {
            value: composite.downgrade(),
            dep: if mock { Dep::mock() } else { Dep::new() },
            vm_count: Cell::new(0),
            shallow,
            mock,
            rt: rt.clone(),
        });
        composite.header().attach_observer(Rc::clone(&observer));

        match composite {
            Composite::Array(arr) => {
                if !mock {
                    bridge::install(arr);
                }
                if !shallow {
                    observer.observe_array(&arr.to_vec());
                }
            }
            Composite::Object(obj) => {
                let options = ReactiveOptions::default()
                    .with_shallow(shallow)
                    .with_mock(mock);
                for key in obj.keys() {
                    define_reactive(rt, obj, &key, None, options.clone());
                }
            }
        }
        observer
    }

    /// Structural-change node of the composite.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// The observed composite, while it is alive.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.value.upgrade().map(|c| c.to_value())
    }

    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Runtime this observer instruments under.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Number of framework roots using this composite as root state.
    #[must_use]
    pub fn vm_count(&self) -> u32 {
        self.vm_count.get()
    }

    /// Record that a framework root adopted this composite. New keys are
    /// refused while the count is non-zero.
    pub fn claim_root(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub fn release_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }

    /// Observe each item deeply, in this observer's mock mode.
    pub fn observe_array(&self, items: &[Value]) {
        for item in items {
            observe(&self.rt, item, false, self.mock);
        }
    }

    /// Notify the composite's node; the event is only built in dev mode.
    pub(crate) fn trigger(&self, event: impl FnOnce() -> DebuggerEvent) -> usize {
        if self.rt.is_dev() {
            self.dep.notify_with(event())
        } else {
            self.dep.notify()
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("vm_count", &self.vm_count.get())
            .field("shallow", &self.shallow)
            .field("mock", &self.mock)
            .finish()
    }
}

/// Attach an observer to `value`, or return the one it already carries.
///
/// Declines (`None`) when observing is switched off, when the value is not
/// an object or array, is non-extensible, opted out, backs a reference cell
/// or is a render-tree node, and in server rendering unless `mock` asks for
/// simulated reactivity.
pub fn observe(rt: &Runtime, value: &Value, shallow: bool, mock: bool) -> Option<Rc<Observer>> {
    let composite = value.as_composite()?;
    if let Some(existing) = composite.observer() {
        return Some(existing);
    }
    if !rt.should_observe() || (rt.is_server_rendering() && !mock) {
        return None;
    }
    let declined = CompositeFlags::NON_EXTENSIBLE
        | CompositeFlags::SKIP
        | CompositeFlags::REF
        | CompositeFlags::RENDER_NODE;
    if composite.flags().intersects(declined) {
        return None;
    }
    tracing::trace!(kind = value.type_name(), shallow, mock, "observe");
    Some(Observer::attach(rt, &composite, shallow, mock))
}
