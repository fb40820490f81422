#![forbid(unsafe_code)]

//! Ordered property maps with data and accessor descriptors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use super::{CompositeFlags, Header, Value};
use crate::error::{ModelError, Result};
use crate::observer::Observer;

/// Accessor read half. Receives the object the property was read from.
pub type Getter = Rc<dyn Fn(&Object) -> Value>;

/// Accessor write half. Receives the object the property was written on.
pub type Setter = Rc<dyn Fn(&Object, Value)>;

/// What a property holds.
#[derive(Clone)]
pub enum Property {
    Data { value: Value, writable: bool },
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
}

/// Full description of one own property.
#[derive(Clone)]
pub struct Descriptor {
    pub property: Property,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Descriptor {
    /// Writable, enumerable, configurable data property.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self {
            property: Property::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// Enumerable, configurable accessor property.
    #[must_use]
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self {
            property: Property::Accessor { get, set },
            enumerable: true,
            configurable: true,
        }
    }

    #[must_use]
    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    #[must_use]
    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    /// Make a data property non-writable. No effect on accessors.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        if let Property::Data { writable, .. } = &mut self.property {
            *writable = false;
        }
        self
    }

    #[must_use]
    pub fn getter(&self) -> Option<&Getter> {
        match &self.property {
            Property::Accessor { get, .. } => get.as_ref(),
            Property::Data { .. } => None,
        }
    }

    #[must_use]
    pub fn setter(&self) -> Option<&Setter> {
        match &self.property {
            Property::Accessor { set, .. } => set.as_ref(),
            Property::Data { .. } => None,
        }
    }

    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(self.property, Property::Accessor { .. })
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Descriptor");
        match &self.property {
            Property::Data { value, writable } => {
                s.field("value", value).field("writable", writable);
            }
            Property::Accessor { get, set } => {
                s.field("get", &get.is_some()).field("set", &set.is_some());
            }
        }
        s.field("enumerable", &self.enumerable)
            .field("configurable", &self.configurable)
            .finish()
    }
}

#[derive(Default)]
struct PropertyMap {
    order: Vec<Rc<str>>,
    slots: AHashMap<Rc<str>, Descriptor>,
}

impl PropertyMap {
    fn upsert(&mut self, key: Rc<str>, desc: Descriptor) {
        if !self.slots.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.slots.insert(key, desc);
    }

    fn remove(&mut self, key: &str) {
        if self.slots.remove(key).is_some() {
            self.order.retain(|k| k.as_ref() != key);
        }
    }
}

pub(crate) struct ObjectInner {
    header: Header,
    props: RefCell<PropertyMap>,
}

/// Shared handle to a dynamic object.
#[derive(Clone)]
pub struct Object {
    pub(crate) inner: Rc<ObjectInner>,
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::with_flags(CompositeFlags::empty())
    }

    pub(crate) fn with_flags(flags: CompositeFlags) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                header: Header::with_flags(flags),
                props: RefCell::new(PropertyMap::default()),
            }),
        }
    }

    /// A render-tree node. Observation always declines these.
    #[must_use]
    pub fn render_node() -> Self {
        Self::with_flags(CompositeFlags::RENDER_NODE)
    }

    /// Plain data properties, in iteration order.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        {
            let mut props = obj.inner.props.borrow_mut();
            for (key, value) in entries {
                props.upsert(key.into(), Descriptor::data(value));
            }
        }
        obj
    }

    /// Build from a JSON object; `None` for any other JSON value.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match Value::from_json(json) {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn header(&self) -> &Header {
        &self.inner.header
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn flags(&self) -> CompositeFlags {
        self.inner.header.flags()
    }

    /// Observer attached to this object, if any.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.header.observer()
    }

    /// Read a property, running its getter if it has one.
    ///
    /// Absent keys and getter-less accessors read as `Undefined`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let getter = {
            let props = self.inner.props.borrow();
            match props.slots.get(key).map(|d| &d.property) {
                None => return Value::Undefined,
                Some(Property::Data { value, .. }) => return value.clone(),
                Some(Property::Accessor { get, .. }) => match get {
                    Some(get) => get.clone(),
                    None => return Value::Undefined,
                },
            }
        };
        getter(self)
    }

    /// Ordinary assignment.
    ///
    /// Runs the setter of an accessor, overwrites a writable data property,
    /// or adds a plain data property when the key is absent and the object
    /// is extensible. Writes to non-writable data, setter-less accessors and
    /// absent keys of non-extensible objects are dropped and return `false`.
    pub fn set(&self, key: &str, value: Value) -> bool {
        let setter = {
            let mut props = self.inner.props.borrow_mut();
            match props.slots.get_mut(key) {
                Some(desc) => match &mut desc.property {
                    Property::Data { value: slot, writable } => {
                        if !*writable {
                            return false;
                        }
                        *slot = value;
                        return true;
                    }
                    Property::Accessor { set, .. } => match set {
                        Some(set) => set.clone(),
                        None => return false,
                    },
                },
                None => {
                    if !self.is_extensible() {
                        return false;
                    }
                    props.upsert(key.into(), Descriptor::data(value));
                    return true;
                }
            }
        };
        setter(self, value);
        true
    }

    /// Define or replace an own property.
    ///
    /// # Errors
    ///
    /// [`ModelError::NotConfigurable`] when the existing property is
    /// non-configurable; [`ModelError::NotExtensible`] when the key is absent
    /// and the object is not extensible.
    pub fn define_property(&self, key: &str, desc: Descriptor) -> Result<()> {
        let mut props = self.inner.props.borrow_mut();
        match props.slots.get(key) {
            Some(existing) if !existing.configurable => {
                return Err(ModelError::NotConfigurable { key: key.into() });
            }
            None if !self.is_extensible() => {
                return Err(ModelError::NotExtensible { key: key.into() });
            }
            _ => {}
        }
        props.upsert(key.into(), desc);
        Ok(())
    }

    /// Own property descriptor.
    #[must_use]
    pub fn own_property(&self, key: &str) -> Option<Descriptor> {
        self.inner.props.borrow().slots.get(key).cloned()
    }

    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.props.borrow().slots.contains_key(key)
    }

    /// Enumerable own keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        let props = self.inner.props.borrow();
        props
            .order
            .iter()
            .filter(|k| props.slots.get(*k).is_some_and(|d| d.enumerable))
            .cloned()
            .collect()
    }

    /// Number of own properties, enumerable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.props.borrow().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinary deletion. Returns `false` only for non-configurable keys.
    pub fn remove(&self, key: &str) -> bool {
        let mut props = self.inner.props.borrow_mut();
        match props.slots.get(key) {
            None => true,
            Some(desc) if !desc.configurable => false,
            Some(_) => {
                props.remove(key);
                true
            }
        }
    }

    pub fn prevent_extensions(&self) {
        self.inner
            .header
            .insert_flags(CompositeFlags::NON_EXTENSIBLE);
    }

    /// Make every property non-configurable (data non-writable) and the
    /// object non-extensible.
    pub fn freeze(&self) {
        {
            let mut props = self.inner.props.borrow_mut();
            for desc in props.slots.values_mut() {
                desc.configurable = false;
                if let Property::Data { writable, .. } = &mut desc.property {
                    *writable = false;
                }
            }
        }
        self.prevent_extensions();
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        !self.flags().contains(CompositeFlags::NON_EXTENSIBLE)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("flags", &self.flags())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
