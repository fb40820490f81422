#![forbid(unsafe_code)]

//! Property interception: one reactive accessor pair per key.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{Observer, observe};
use crate::debug::{DebuggerEvent, TriggerOp};
use crate::dep::Dep;
use crate::runtime::Runtime;
use crate::value::{Array, Descriptor, Getter, Object, Setter, Value, has_changed};

/// Dev-only hook run by the setter before a real change is stored.
pub type CustomSetter = Rc<dyn Fn()>;

/// Knobs for [`define_reactive`].
#[derive(Clone, Default)]
pub struct ReactiveOptions {
    /// Do not instrument the value itself; reuse its observer if it has one.
    pub shallow: bool,
    /// Simulated reactivity for nested values.
    pub mock: bool,
    pub custom_setter: Option<CustomSetter>,
}

impl ReactiveOptions {
    #[must_use]
    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    #[must_use]
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    #[must_use]
    pub fn with_custom_setter(mut self, hook: impl Fn() + 'static) -> Self {
        self.custom_setter = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for ReactiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveOptions")
            .field("shallow", &self.shallow)
            .field("mock", &self.mock)
            .field("custom_setter", &self.custom_setter.is_some())
            .finish()
    }
}

/// State the accessor pair closes over.
struct Slot {
    value: Value,
    child: Option<Rc<Observer>>,
}

/// Replace `obj[key]` with a reactive accessor pair backed by a fresh
/// [`Dep`], which is returned.
///
/// `initial: None` reads the current value off the object (unless the
/// property is a getter without a setter). Non-configurable properties are
/// left alone and yield `None`.
pub fn define_reactive(
    rt: &Runtime,
    obj: &Object,
    key: &str,
    initial: Option<Value>,
    options: ReactiveOptions,
) -> Option<Dep> {
    let existing = obj.own_property(key);
    if existing.as_ref().is_some_and(|desc| !desc.configurable) {
        return None;
    }
    let getter = existing.as_ref().and_then(|desc| desc.getter().cloned());
    let setter = existing.as_ref().and_then(|desc| desc.setter().cloned());

    let value = match initial {
        Some(value) => value,
        None if getter.is_none() || setter.is_some() => obj.get(key),
        None => Value::Undefined,
    };

    let ReactiveOptions {
        shallow,
        mock,
        custom_setter,
    } = options;
    let child = if shallow {
        value.observer()
    } else {
        observe(rt, &value, false, mock)
    };

    let dep = Dep::new();
    let key: Rc<str> = key.into();
    let slot = Rc::new(RefCell::new(Slot { value, child }));

    let get: Getter = {
        let rt = rt.clone();
        let dep = dep.clone();
        let slot = Rc::clone(&slot);
        let key = key.clone();
        let getter = getter.clone();
        Rc::new(move |obj: &Object| {
            let value = match &getter {
                Some(getter) => getter(obj),
                None => slot.borrow().value.clone(),
            };
            if rt.has_active_reader() {
                if rt.is_dev() {
                    dep.depend_with(&rt, DebuggerEvent::track(Value::Object(obj.clone()), key.clone()));
                } else {
                    dep.depend(&rt);
                }
                let child = slot.borrow().child.clone();
                if let Some(child) = child {
                    child.dep().depend(&rt);
                    if let Value::Array(arr) = &value {
                        depend_array(&rt, arr);
                    }
                }
            }
            if !shallow {
                if let Value::Cell(cell) = &value {
                    return cell.get();
                }
            }
            value
        })
    };

    let set: Setter = {
        let rt = rt.clone();
        let dep = dep.clone();
        let key = key.clone();
        Rc::new(move |obj: &Object, new_value: Value| {
            let current = match &getter {
                Some(getter) => getter(obj),
                None => slot.borrow().value.clone(),
            };
            if !has_changed(&current, &new_value) {
                return;
            }
            if rt.is_dev() {
                if let Some(hook) = &custom_setter {
                    hook();
                }
            }

            if let Some(setter) = &setter {
                setter(obj, new_value.clone());
            } else if getter.is_some() {
                // Getter without setter: read-only accessor.
                return;
            } else if !shallow && current.is_cell() && !new_value.is_cell() {
                if let Value::Cell(cell) = &current {
                    cell.set(new_value);
                }
                return;
            } else {
                slot.borrow_mut().value = new_value.clone();
            }

            let child = if shallow {
                new_value.observer()
            } else {
                observe(&rt, &new_value, false, mock)
            };
            slot.borrow_mut().child = child;

            if rt.is_dev() {
                dep.notify_with(
                    DebuggerEvent::trigger(TriggerOp::Set, Value::Object(obj.clone()))
                        .with_key(key.clone())
                        .with_values(new_value, Some(current)),
                );
            } else {
                dep.notify();
            }
        })
    };

    if let Err(err) = obj.define_property(&key, Descriptor::accessor(Some(get), Some(set))) {
        tracing::debug!(key = %key, error = %err, "property left non-reactive");
        return None;
    }
    Some(dep)
}

/// Register the active reader on every observed element, recursing into
/// nested arrays. Index reads cannot be intercepted, so reading an array
/// property depends on all of its elements.
fn depend_array(rt: &Runtime, arr: &Array) {
    for item in arr.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend(rt);
        }
        if let Value::Array(nested) = &item {
            depend_array(rt, nested);
        }
    }
}
