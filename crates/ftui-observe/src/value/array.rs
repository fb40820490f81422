#![forbid(unsafe_code)]

//! Indexable sequences with a swappable mutator table.
//!
//! Every in-place mutator (`push`, `pop`, `shift`, `unshift`, `splice`,
//! `sort`, `reverse`) is funnelled into one [`Mutation`] and dispatched
//! through the array's current [`ArrayProto`]. A fresh array uses the native
//! table; observation swaps in an intercepting one. Index writes and length
//! changes ([`Array::set_index`], [`Array::set_len`]) never go through the
//! table.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::{CompositeFlags, Header, Value};
use crate::observer::Observer;

/// Largest valid element index. Index writes and length changes never grow
/// an array past `MAX_INDEX + 1` elements.
pub const MAX_INDEX: usize = u32::MAX as usize - 1;

/// Comparator for [`Array::sort_by`].
pub type Comparator = Rc<dyn Fn(&Value, &Value) -> Ordering>;

/// The seven in-place mutators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    pub const ALL: [ArrayMethod; 7] = [
        Self::Push,
        Self::Pop,
        Self::Shift,
        Self::Unshift,
        Self::Splice,
        Self::Sort,
        Self::Reverse,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Shift => "shift",
            Self::Unshift => "unshift",
            Self::Splice => "splice",
            Self::Sort => "sort",
            Self::Reverse => "reverse",
        }
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One mutator call with its arguments.
#[derive(Clone)]
pub enum Mutation {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    /// `start` counts from the end when negative; `delete_count: None`
    /// removes everything from `start`.
    Splice {
        start: i64,
        delete_count: Option<usize>,
        items: Vec<Value>,
    },
    Sort(Option<Comparator>),
    Reverse,
}

impl Mutation {
    #[must_use]
    pub fn method(&self) -> ArrayMethod {
        match self {
            Self::Push(_) => ArrayMethod::Push,
            Self::Pop => ArrayMethod::Pop,
            Self::Shift => ArrayMethod::Shift,
            Self::Unshift(_) => ArrayMethod::Unshift,
            Self::Splice { .. } => ArrayMethod::Splice,
            Self::Sort(_) => ArrayMethod::Sort,
            Self::Reverse => ArrayMethod::Reverse,
        }
    }

    /// Arguments that become new elements: all of them for push/unshift,
    /// the items after the two positional ones for splice, none otherwise.
    #[must_use]
    pub fn inserted(&self) -> &[Value] {
        match self {
            Self::Push(items) | Self::Unshift(items) | Self::Splice { items, .. } => items,
            Self::Pop | Self::Shift | Self::Sort(_) | Self::Reverse => &[],
        }
    }
}

/// What a mutator returned.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// New length (push, unshift).
    Length(usize),
    /// Removed element, `Undefined` if the array was empty (pop, shift).
    Item(Value),
    /// Removed elements (splice).
    Removed(Vec<Value>),
    /// Sorted or reversed in place.
    Done,
}

/// Dispatch table for the in-place mutators.
pub struct ArrayProto {
    pub name: &'static str,
    pub(crate) mutate: fn(&Array, Mutation) -> MutationOutcome,
}

impl fmt::Debug for ArrayProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayProto").field("name", &self.name).finish()
    }
}

pub(crate) static NATIVE_PROTO: ArrayProto = ArrayProto {
    name: "native",
    mutate: Array::apply_native,
};

pub(crate) struct ArrayInner {
    header: Header,
    items: RefCell<Vec<Value>>,
    proto: Cell<&'static ArrayProto>,
}

/// Shared handle to a dynamic array.
#[derive(Clone)]
pub struct Array {
    pub(crate) inner: Rc<ArrayInner>,
}

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::from_values(std::iter::empty())
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                header: Header::with_flags(CompositeFlags::empty()),
                items: RefCell::new(values.into_iter().collect()),
                proto: Cell::new(&NATIVE_PROTO),
            }),
        }
    }

    pub(crate) fn header(&self) -> &Header {
        &self.inner.header
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn flags(&self) -> CompositeFlags {
        self.inner.header.flags()
    }

    pub fn prevent_extensions(&self) {
        self.inner
            .header
            .insert_flags(CompositeFlags::NON_EXTENSIBLE);
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.header.observer()
    }

    /// Current dispatch table.
    #[must_use]
    pub fn proto(&self) -> &'static ArrayProto {
        self.inner.proto.get()
    }

    /// Whether mutators are routed through a non-native table.
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        !std::ptr::eq(self.inner.proto.get(), &NATIVE_PROTO)
    }

    pub(crate) fn set_proto(&self, proto: &'static ArrayProto) {
        self.inner.proto.set(proto);
    }

    // ── Read-sequence ────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, `Undefined` when out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// `arr[index] = value`. Grows the array with `Undefined` holes when
    /// needed. Bypasses the mutator table.
    ///
    /// Returns `false` and leaves the array untouched when `index` is past
    /// [`MAX_INDEX`] or the holes cannot be allocated.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        let Some(len) = index.checked_add(1) else {
            return false;
        };
        let mut items = self.inner.items.borrow_mut();
        if index >= items.len() && !grow(&mut items, len) {
            return false;
        }
        items[index] = value;
        true
    }

    /// `arr.length = len`. Bypasses the mutator table.
    ///
    /// Returns `false` and leaves the array untouched when `len` exceeds
    /// `MAX_INDEX + 1` or the holes cannot be allocated.
    pub fn set_len(&self, len: usize) -> bool {
        let mut items = self.inner.items.borrow_mut();
        if len <= items.len() {
            items.truncate(len);
            return true;
        }
        grow(&mut items, len)
    }

    // ── Mutate-sequence ──────────────────────────────────────────────

    /// Run a mutator through the current dispatch table.
    pub fn mutate(&self, mutation: Mutation) -> MutationOutcome {
        (self.inner.proto.get().mutate)(self, mutation)
    }

    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> usize {
        match self.mutate(Mutation::Push(items.into_iter().collect())) {
            MutationOutcome::Length(len) => len,
            _ => self.len(),
        }
    }

    pub fn pop(&self) -> Value {
        match self.mutate(Mutation::Pop) {
            MutationOutcome::Item(value) => value,
            _ => Value::Undefined,
        }
    }

    pub fn shift(&self) -> Value {
        match self.mutate(Mutation::Shift) {
            MutationOutcome::Item(value) => value,
            _ => Value::Undefined,
        }
    }

    pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> usize {
        match self.mutate(Mutation::Unshift(items.into_iter().collect())) {
            MutationOutcome::Length(len) => len,
            _ => self.len(),
        }
    }

    pub fn splice(
        &self,
        start: i64,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let mutation = Mutation::Splice {
            start,
            delete_count,
            items: items.into_iter().collect(),
        };
        match self.mutate(mutation) {
            MutationOutcome::Removed(removed) => removed,
            _ => Vec::new(),
        }
    }

    /// Default ordering: `Undefined` last, everything else by string
    /// conversion.
    pub fn sort(&self) {
        self.mutate(Mutation::Sort(None));
    }

    pub fn sort_by(&self, cmp: impl Fn(&Value, &Value) -> Ordering + 'static) {
        self.mutate(Mutation::Sort(Some(Rc::new(cmp))));
    }

    pub fn reverse(&self) {
        self.mutate(Mutation::Reverse);
    }

    /// The mutators without any interception.
    pub(crate) fn apply_native(arr: &Array, mutation: Mutation) -> MutationOutcome {
        match mutation {
            Mutation::Push(new) => {
                let mut items = arr.inner.items.borrow_mut();
                items.extend(new);
                MutationOutcome::Length(items.len())
            }
            Mutation::Pop => {
                MutationOutcome::Item(arr.inner.items.borrow_mut().pop().unwrap_or_default())
            }
            Mutation::Shift => {
                let mut items = arr.inner.items.borrow_mut();
                if items.is_empty() {
                    MutationOutcome::Item(Value::Undefined)
                } else {
                    MutationOutcome::Item(items.remove(0))
                }
            }
            Mutation::Unshift(new) => {
                let mut items = arr.inner.items.borrow_mut();
                items.splice(0..0, new);
                MutationOutcome::Length(items.len())
            }
            Mutation::Splice {
                start,
                delete_count,
                items: new,
            } => {
                let mut items = arr.inner.items.borrow_mut();
                let len = items.len();
                let start = if start < 0 {
                    len.saturating_sub(start.unsigned_abs() as usize)
                } else {
                    (start as usize).min(len)
                };
                let end = match delete_count {
                    Some(count) => start + count.min(len - start),
                    None => len,
                };
                let removed: Vec<Value> = items.splice(start..end, new).collect();
                MutationOutcome::Removed(removed)
            }
            Mutation::Sort(cmp) => {
                // Taken out so a comparator may read the array.
                let mut items = std::mem::take(&mut *arr.inner.items.borrow_mut());
                match cmp {
                    Some(cmp) => items.sort_by(|a, b| cmp(a, b)),
                    None => items.sort_by(default_order),
                }
                *arr.inner.items.borrow_mut() = items;
                MutationOutcome::Done
            }
            Mutation::Reverse => {
                arr.inner.items.borrow_mut().reverse();
                MutationOutcome::Done
            }
        }
    }
}

/// Pad `items` with `Undefined` up to `len` elements.
fn grow(items: &mut Vec<Value>, len: usize) -> bool {
    if len > MAX_INDEX + 1 {
        return false;
    }
    let additional = len - items.len();
    if let Err(err) = items.try_reserve_exact(additional) {
        tracing::warn!(len, error = %err, "array growth refused");
        return false;
    }
    items.resize(len, Value::Undefined);
    true
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_js_string().cmp(&b.to_js_string()),
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("proto", &self.proto().name)
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
