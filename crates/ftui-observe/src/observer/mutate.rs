#![forbid(unsafe_code)]

//! Imperative structural edits: adding keys, deleting keys and writing
//! array slots in a way the observers can see.

use super::{ReactiveOptions, define_reactive, observe};
use crate::debug::{DebuggerEvent, TriggerOp};
use crate::runtime::{Diagnostic, MutationKind, Runtime};
use crate::value::{Array, Composite, MAX_INDEX, Object, PropKey, Value};

/// Set `target[key] = value`, adding a reactive property and notifying
/// structural readers when the key is new. Returns `value`, or `Undefined`
/// when the target was refused.
///
/// On arrays, an index beyond the end grows the array first; the write
/// goes through `splice` so the array's readers are notified. Named keys
/// that are not indices leave an array untouched. An index past
/// [`MAX_INDEX`] is refused with a diagnostic.
pub fn set(rt: &Runtime, target: &Value, key: impl Into<PropKey>, value: Value) -> Value {
    let key = key.into();
    let Some(composite) = target.as_composite() else {
        rt.warn(Diagnostic::PrimitiveTarget {
            kind: MutationKind::Set,
            type_name: target.type_name(),
        });
        return Value::Undefined;
    };
    if composite.is_readonly() {
        rt.warn(Diagnostic::ReadonlyTarget {
            kind: MutationKind::Set,
            key,
        });
        return Value::Undefined;
    }

    match &composite {
        Composite::Array(arr) => {
            match key.as_index() {
                Some(index) if !set_index(arr, index, value.clone()) => {
                    rt.warn(Diagnostic::IndexOutOfRange { index });
                    Value::Undefined
                }
                _ => value,
            }
        }
        Composite::Object(obj) => set_key(rt, obj, &key, value),
    }
}

fn set_index(arr: &Array, index: usize, value: Value) -> bool {
    let Ok(start) = i64::try_from(index) else {
        return false;
    };
    if index > MAX_INDEX || (index > arr.len() && !arr.set_len(index)) {
        return false;
    }
    arr.splice(start, Some(1), [value.clone()]);
    // Mock observers leave the native table in place, so the splice above
    // did not observe the new element.
    if let Some(observer) = arr.observer() {
        if observer.is_mock() && !observer.is_shallow() {
            observe(observer.runtime(), &value, false, true);
        }
    }
    true
}

fn set_key(rt: &Runtime, obj: &Object, key: &PropKey, value: Value) -> Value {
    let name = key.to_name();
    if obj.has_own(&name) {
        obj.set(&name, value.clone());
        return value;
    }

    let observer = obj.observer();
    if observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
        rt.warn(Diagnostic::RootAdd { key: key.clone() });
        return value;
    }
    let Some(observer) = observer else {
        obj.set(&name, value.clone());
        return value;
    };

    let options = ReactiveOptions::default()
        .with_shallow(observer.is_shallow())
        .with_mock(observer.is_mock());
    if define_reactive(observer.runtime(), obj, &name, Some(value.clone()), options).is_none() {
        return value;
    }
    observer.trigger(|| {
        DebuggerEvent::trigger(TriggerOp::Add, Value::Object(obj.clone()))
            .with_key(name.clone())
            .with_values(value.clone(), None)
    });
    value
}

/// Remove `target[key]` and notify structural readers.
///
/// Array indices are removed with `splice`. Absent keys, read-only targets
/// and root state are left alone.
pub fn delete(rt: &Runtime, target: &Value, key: impl Into<PropKey>) {
    let key = key.into();
    let Some(composite) = target.as_composite() else {
        rt.warn(Diagnostic::PrimitiveTarget {
            kind: MutationKind::Delete,
            type_name: target.type_name(),
        });
        return;
    };
    if composite.is_readonly() {
        rt.warn(Diagnostic::ReadonlyTarget {
            kind: MutationKind::Delete,
            key,
        });
        return;
    }

    match &composite {
        Composite::Array(arr) => {
            if let Some(index) = key.as_index() {
                // Past the end the splice removes nothing.
                let start = i64::try_from(index).unwrap_or(i64::MAX);
                arr.splice(start, Some(1), []);
            }
        }
        Composite::Object(obj) => delete_key(rt, obj, &key),
    }
}

fn delete_key(rt: &Runtime, obj: &Object, key: &PropKey) {
    let observer = obj.observer();
    if observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
        rt.warn(Diagnostic::RootDelete { key: key.clone() });
        return;
    }
    let name = key.to_name();
    if !obj.has_own(&name) || !obj.remove(&name) {
        return;
    }
    if let Some(observer) = observer {
        observer.trigger(|| {
            DebuggerEvent::trigger(TriggerOp::Delete, Value::Object(obj.clone())).with_key(name.clone())
        });
    }
}
