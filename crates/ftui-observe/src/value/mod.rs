#![forbid(unsafe_code)]

//! Dynamic host values that observation instruments.
//!
//! The observer needs values whose properties can be swapped for accessor
//! pairs at runtime, so this module provides a small object model with that
//! capability:
//!
//! - [`Value`]: primitives plus shared composite handles.
//! - [`Object`]: ordered property map with data and accessor descriptors.
//! - [`Array`]: indexable sequence whose in-place mutators dispatch through
//!   a swappable [`ArrayProto`].
//! - [`ReferenceCell`]: capability trait for boxed values that dereference
//!   transparently when stored in a reactive property.
//!
//! # Invariants
//!
//! 1. Cloning an [`Object`] or [`Array`] clones the handle, never the data.
//!    Two clones alias the same storage and the same observer.
//! 2. [`Value::same_value`] is `Object.is`: identity for composites and
//!    cells, `NaN` equals `NaN`, `+0` differs from `-0`.
//! 3. No `RefCell` borrow is held while user code (accessors, comparators)
//!    runs, so accessors may freely re-enter their own object.

pub mod array;
pub mod object;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::observer::Observer;

pub use array::{
    Array, ArrayMethod, ArrayProto, Comparator, MAX_INDEX, Mutation, MutationOutcome,
};
pub use object::{Descriptor, Getter, Object, Property, Setter};

bitflags! {
    /// Per-composite marker bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompositeFlags: u8 {
        /// `prevent_extensions` or `freeze` has been applied.
        const NON_EXTENSIBLE = 1 << 0;
        /// Opted out of reactivity.
        const SKIP = 1 << 1;
        /// Imperative `set`/`delete` refuse to touch this value.
        const READONLY = 1 << 2;
        /// Render-tree node with its own lifecycle.
        const RENDER_NODE = 1 << 3;
        /// Backing storage of a reference cell.
        const REF = 1 << 4;
    }
}

/// State shared by objects and arrays: marker bits and the hidden observer
/// back-reference.
#[derive(Default)]
pub(crate) struct Header {
    flags: Cell<CompositeFlags>,
    observer: RefCell<Option<Rc<Observer>>>,
}

impl Header {
    pub(crate) fn with_flags(flags: CompositeFlags) -> Self {
        Self {
            flags: Cell::new(flags),
            observer: RefCell::new(None),
        }
    }

    pub(crate) fn flags(&self) -> CompositeFlags {
        self.flags.get()
    }

    pub(crate) fn insert_flags(&self, flags: CompositeFlags) {
        self.flags.set(self.flags.get() | flags);
    }

    pub(crate) fn observer(&self) -> Option<Rc<Observer>> {
        self.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.observer.borrow_mut() = Some(observer);
    }
}

/// A boxed value that a reactive property dereferences on read and writes
/// through on assignment.
///
/// Implementations provide their own reactivity; observation never
/// instruments a cell.
pub trait ReferenceCell {
    /// Current inner value.
    fn get(&self) -> Value;

    /// Replace the inner value.
    fn set(&self, value: Value);
}

pub type CellRef = Rc<dyn ReferenceCell>;

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Object),
    Array(Array),
    Cell(CellRef),
}

impl Value {
    /// Wrap a reference cell.
    pub fn cell(cell: impl ReferenceCell + 'static) -> Self {
        Self::Cell(Rc::new(cell))
    }

    /// `Object.is` comparison.
    #[must_use]
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Cell(a), Self::Cell(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Anything that is not an object, array or cell.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_) | Self::Array(_) | Self::Cell(_))
    }

    #[must_use]
    pub fn is_cell(&self) -> bool {
        matches!(self, Self::Cell(_))
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_cell(&self) -> Option<&CellRef> {
        match self {
            Self::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    /// The composite behind this value, if any.
    #[must_use]
    pub fn as_composite(&self) -> Option<Composite> {
        match self {
            Self::Object(obj) => Some(Composite::Object(obj.clone())),
            Self::Array(arr) => Some(Composite::Array(arr.clone())),
            _ => None,
        }
    }

    /// Observer attached to this value, without creating one.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.as_composite().and_then(|c| c.observer())
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Cell(_) => "cell",
        }
    }

    /// String conversion used by default array sorting.
    #[must_use]
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => number_to_string(*n),
            Self::Str(s) => s.to_string(),
            Self::Object(_) | Self::Cell(_) => "[object Object]".to_string(),
            Self::Array(arr) => arr
                .to_vec()
                .iter()
                .map(|v| match v {
                    Self::Undefined | Self::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Build a fresh value tree from JSON. Object keys follow `serde_json`'s
    /// map ordering.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::Str(s.as_str().into()),
            serde_json::Value::Array(items) => {
                Self::Array(Array::from_values(items.iter().map(Self::from_json)))
            }
            serde_json::Value::Object(map) => Self::Object(Object::from_entries(
                map.iter().map(|(k, v)| (k.as_str(), Self::from_json(v))),
            )),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Object(obj) => obj.fmt(f),
            Self::Array(arr) => arr.fmt(f),
            Self::Cell(_) => f.write_str("Cell(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Self::Object(obj)
    }
}

impl From<Array> for Value {
    fn from(arr: Array) -> Self {
        Self::Array(arr)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(&json)
    }
}

/// Whether assigning `new` over `old` counts as a change.
#[must_use]
pub fn has_changed(old: &Value, new: &Value) -> bool {
    !old.same_value(new)
}

/// An object or an array.
#[derive(Clone, Debug)]
pub enum Composite {
    Object(Object),
    Array(Array),
}

impl Composite {
    pub(crate) fn header(&self) -> &Header {
        match self {
            Self::Object(obj) => obj.header(),
            Self::Array(arr) => arr.header(),
        }
    }

    #[must_use]
    pub fn flags(&self) -> CompositeFlags {
        self.header().flags()
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.header().observer()
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        !self.flags().contains(CompositeFlags::NON_EXTENSIBLE)
    }

    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.flags().contains(CompositeFlags::READONLY)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Object(obj) => Value::Object(obj.clone()),
            Self::Array(arr) => Value::Array(arr.clone()),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakComposite {
        match self {
            Self::Object(obj) => WeakComposite::Object(Rc::downgrade(&obj.inner)),
            Self::Array(arr) => WeakComposite::Array(Rc::downgrade(&arr.inner)),
        }
    }
}

/// Non-owning composite reference held by an [`Observer`].
#[derive(Clone)]
pub(crate) enum WeakComposite {
    Object(std::rc::Weak<object::ObjectInner>),
    Array(std::rc::Weak<array::ArrayInner>),
}

impl WeakComposite {
    pub(crate) fn upgrade(&self) -> Option<Composite> {
        match self {
            Self::Object(weak) => weak.upgrade().map(|inner| Composite::Object(Object { inner })),
            Self::Array(weak) => weak.upgrade().map(|inner| Composite::Array(Array { inner })),
        }
    }
}

/// Opt a composite out of reactivity. Returns the value for chaining.
pub fn mark_raw(value: &Value) -> &Value {
    if let Some(composite) = value.as_composite() {
        composite.header().insert_flags(CompositeFlags::SKIP);
    }
    value
}

/// Make imperative `set`/`delete` refuse this composite.
pub fn mark_readonly(value: &Value) -> &Value {
    if let Some(composite) = value.as_composite() {
        composite.header().insert_flags(CompositeFlags::READONLY);
    }
    value
}

/// Key accepted by the imperative mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Rc<str>),
    Index(usize),
}

impl PropKey {
    /// Array index this key denotes: an `Index`, or a name spelling a
    /// canonical non-negative integer.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(name) => {
                let canonical = !name.is_empty()
                    && name.bytes().all(|b| b.is_ascii_digit())
                    && (name.len() == 1 || !name.starts_with('0'));
                if canonical { name.parse().ok() } else { None }
            }
        }
    }

    /// Property name this key denotes on an object.
    #[must_use]
    pub fn to_name(&self) -> Rc<str> {
        match self {
            Self::Name(name) => name.clone(),
            Self::Index(i) => i.to_string().into(),
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        Self::Name(name.into())
    }
}

impl From<Rc<str>> for PropKey {
    fn from(name: Rc<str>) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_treats_nan_as_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(nan.same_value(&Value::Number(f64::NAN)));
        assert!(!has_changed(&nan, &Value::Number(f64::NAN)));
    }

    #[test]
    fn same_value_distinguishes_signed_zero() {
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
        assert!(Value::Number(-0.0).same_value(&Value::Number(-0.0)));
    }

    #[test]
    fn composites_compare_by_identity() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::from(a.clone()).same_value(&Value::from(a.clone())));
        assert!(!Value::from(a).same_value(&Value::from(b)));

        let x = Array::new();
        assert_eq!(Value::from(x.clone()), Value::from(x));
        assert_ne!(Value::from(Array::new()), Value::from(Array::new()));
    }

    #[test]
    fn strings_compare_by_content() {
        assert_eq!(Value::from("abc"), Value::from(String::from("abc")));
        assert_ne!(Value::from("abc"), Value::from("abd"));
        assert_ne!(Value::from("1"), Value::from(1));
    }

    #[test]
    fn prop_key_index_parsing() {
        assert_eq!(PropKey::from(3usize).as_index(), Some(3));
        assert_eq!(PropKey::from("12").as_index(), Some(12));
        assert_eq!(PropKey::from("0").as_index(), Some(0));
        assert_eq!(PropKey::from("012").as_index(), None);
        assert_eq!(PropKey::from("-1").as_index(), None);
        assert_eq!(PropKey::from("1.5").as_index(), None);
        assert_eq!(PropKey::from("").as_index(), None);
        assert_eq!(PropKey::from(7usize).to_name().as_ref(), "7");
    }

    #[test]
    fn js_string_conversion() {
        assert_eq!(Value::from(10).to_js_string(), "10");
        assert_eq!(Value::from(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_js_string(), "0");
        assert_eq!(Value::Number(f64::NAN).to_js_string(), "NaN");
        assert_eq!(Value::Undefined.to_js_string(), "undefined");
        let arr = Value::from_json(&json!([1, null, "x"]));
        assert_eq!(arr.to_js_string(), "1,,x");
    }

    #[test]
    fn from_json_builds_nested_composites() {
        let value = Value::from_json(&json!({"a": {"b": [1, 2]}, "c": "s"}));
        let obj = value.as_object().expect("object");
        assert_eq!(obj.get("c"), Value::from("s"));
        let inner = obj.get("a");
        let list = inner.as_object().expect("inner").get("b");
        assert_eq!(list.as_array().expect("array").len(), 2);
    }

    #[test]
    fn markers_set_flags() {
        let value = Value::from(Object::new());
        mark_raw(&value);
        mark_readonly(&value);
        let flags = value.as_composite().expect("composite").flags();
        assert!(flags.contains(CompositeFlags::SKIP | CompositeFlags::READONLY));

        // Primitives are ignored.
        mark_raw(&Value::from(1));
    }
}
