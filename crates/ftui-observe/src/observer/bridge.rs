#![forbid(unsafe_code)]

//! Intercepting dispatch table for observed arrays.
//!
//! Swapping an array's [`ArrayProto`] reroutes its seven in-place mutators
//! through [`mutate_observed`]: the native operation runs first, newly
//! inserted elements are observed, and the array's own node is notified
//! once. Index and length writes never pass through the table.

use crate::debug::{DebuggerEvent, TriggerOp};
use crate::value::{Array, ArrayProto, Mutation, MutationOutcome, Value};

/// Dispatch table installed on every array with a non-mock observer.
pub(crate) static INTERCEPTING_PROTO: ArrayProto = ArrayProto {
    name: "observed",
    mutate: mutate_observed,
};

/// Route `arr`'s mutators through the intercepting table.
pub(crate) fn install(arr: &Array) {
    arr.set_proto(&INTERCEPTING_PROTO);
}

fn mutate_observed(arr: &Array, mutation: Mutation) -> MutationOutcome {
    let method = mutation.method();
    let inserted = mutation.inserted().to_vec();
    let outcome = Array::apply_native(arr, mutation);

    let Some(observer) = arr.observer() else {
        return outcome;
    };
    if !inserted.is_empty() && !observer.is_shallow() {
        observer.observe_array(&inserted);
    }
    observer.trigger(|| {
        let op = if inserted.is_empty() {
            TriggerOp::ArrayMutation
        } else {
            TriggerOp::Add
        };
        DebuggerEvent::trigger(op, Value::Array(arr.clone())).with_method(method)
    });
    outcome
}
