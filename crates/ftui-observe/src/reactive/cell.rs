#![forbid(unsafe_code)]

//! Reactive reference cells.
//!
//! A [`Ref`] stores one value behind a reactive `value` property of a hidden
//! holder object. The holder is flagged as cell storage so observation never
//! walks into it, and a `Ref` stored in a reactive property is dereferenced
//! on read and written through on assignment.

use std::fmt;

use crate::debug::{DebuggerEvent, TriggerOp};
use crate::dep::Dep;
use crate::observer::{ReactiveOptions, define_reactive};
use crate::runtime::Runtime;
use crate::value::{CompositeFlags, Object, ReferenceCell, Value};

const VALUE_KEY: &str = "value";

/// A reactive box around a single [`Value`]. Clones share the box.
#[derive(Clone)]
pub struct Ref {
    holder: Object,
    dep: Dep,
    shallow: bool,
    rt: Runtime,
}

impl Ref {
    /// A deep cell: composite values stored in it are observed.
    pub fn new(rt: &Runtime, value: Value) -> Self {
        Self::create(rt, value, false)
    }

    /// A shallow cell: only replacing the value is reactive.
    pub fn shallow(rt: &Runtime, value: Value) -> Self {
        Self::create(rt, value, true)
    }

    fn create(rt: &Runtime, value: Value, shallow: bool) -> Self {
        let holder = Object::with_flags(CompositeFlags::REF);
        let options = ReactiveOptions::default()
            .with_shallow(shallow)
            .with_mock(rt.is_server_rendering());
        // A fresh holder always accepts the accessor.
        let dep = define_reactive(rt, &holder, VALUE_KEY, Some(value), options)
            .unwrap_or_else(Dep::mock);
        Self {
            holder,
            dep,
            shallow,
            rt: rt.clone(),
        }
    }

    /// Read the value, subscribing the active reader.
    #[must_use]
    pub fn get(&self) -> Value {
        self.holder.get(VALUE_KEY)
    }

    /// Replace the value. Readers re-run unless it is the same value.
    pub fn set(&self, value: Value) {
        self.holder.set(VALUE_KEY, value);
    }

    /// Re-run readers without changing the value, e.g. after mutating the
    /// inside of a shallow cell's content.
    pub fn trigger(&self) {
        if self.rt.is_dev() {
            self.dep.notify_with(
                DebuggerEvent::trigger(TriggerOp::Set, Value::Object(self.holder.clone()))
                    .with_key(VALUE_KEY.into()),
            );
        } else {
            self.dep.notify();
        }
    }

    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    /// Wrap as a [`Value`] so it can be stored in reactive state.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::cell(self.clone())
    }
}

impl ReferenceCell for Ref {
    fn get(&self) -> Value {
        Ref::get(self)
    }

    fn set(&self, value: Value) {
        Ref::set(self, value);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.rt.untracked(|| self.get());
        f.debug_struct("Ref")
            .field("value", &value)
            .field("shallow", &self.shallow)
            .finish()
    }
}

/// Whether `value` is a reference cell.
#[must_use]
pub fn is_ref(value: &Value) -> bool {
    value.is_cell()
}

/// The inner value of a cell, or `value` itself.
#[must_use]
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Cell(cell) => cell.get(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::reactive::Effect;
    use crate::runtime::ObserverConfig;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_effect(rt: &Runtime, read: impl Fn() + 'static) -> (Effect, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let effect = Effect::new(rt, move || {
            read();
            r.set(r.get() + 1);
        });
        (effect, runs)
    }

    #[test]
    fn get_set_and_notify() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from(1));
        let c = cell.clone();
        let (_effect, runs) = counting_effect(&rt, move || {
            let _ = c.get();
        });
        cell.set(Value::from(2));
        cell.set(Value::from(2));
        assert_eq!(cell.get(), Value::from(2));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn deep_cell_observes_content() {
        let rt = Runtime::new();
        let content = Value::from_json(&json!({"x": 1}));
        let cell = Ref::new(&rt, content.clone());
        assert!(content.observer().is_some());

        let shallow_content = Value::from_json(&json!({"x": 1}));
        let shallow = Ref::shallow(&rt, shallow_content.clone());
        assert!(shallow.is_shallow());
        assert!(shallow_content.observer().is_none());
        assert!(cell.get().as_object().is_some());
    }

    #[test]
    fn trigger_forces_rerun() {
        let rt = Runtime::new();
        let cell = Ref::shallow(&rt, Value::from_json(&json!({"x": 1})));
        let c = cell.clone();
        let (_effect, runs) = counting_effect(&rt, move || {
            let _ = c.get();
        });
        cell.trigger();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn holder_is_never_observed() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from(1));
        let holder = Value::Object(cell.holder.clone());
        assert!(observe(&rt, &holder, false, false).is_none());
    }

    #[test]
    fn reactive_property_unwraps_and_writes_through() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from(1));
        let state = Value::from_json(&json!({}));
        let obj = state.as_object().expect("object").clone();
        obj.set("count", cell.to_value());
        observe(&rt, &state, false, false).expect("observed");

        assert_eq!(obj.get("count"), Value::from(1));
        obj.set("count", Value::from(5));
        assert_eq!(cell.get(), Value::from(5));

        let other = Ref::new(&rt, Value::from(9));
        obj.set("count", other.to_value());
        assert_eq!(obj.get("count"), Value::from(9));
        assert_eq!(cell.get(), Value::from(5));
    }

    #[test]
    fn server_rendering_uses_mock_content() {
        let rt = Runtime::with_config(ObserverConfig::default().with_server_rendering(true));
        let content = Value::from_json(&json!({"x": 1}));
        let _cell = Ref::new(&rt, content.clone());
        let ob = content.observer().expect("mock observed");
        assert!(ob.is_mock());
    }

    #[test]
    fn unref_passes_plain_values_through() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from("a"));
        assert_eq!(unref(&cell.to_value()), Value::from("a"));
        assert_eq!(unref(&Value::from(3)), Value::from(3));
        assert!(!is_ref(&Value::Null));
    }

    #[test]
    fn debug_does_not_track() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from(1));
        let c = cell.clone();
        let (_effect, runs) = counting_effect(&rt, move || {
            let _ = format!("{c:?}");
        });
        cell.set(Value::from(2));
        assert_eq!(runs.get(), 1);
    }
}
