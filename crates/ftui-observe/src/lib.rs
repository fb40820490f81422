#![forbid(unsafe_code)]

//! Observe: fine-grained dependency tracking and change notification over
//! dynamic object graphs.
//!
//! [`observe`] instruments an object or array in place. Every property read
//! performed while a subscriber is the runtime's active reader records a
//! dependency; every write that changes a value re-runs the subscribers that
//! read it. Arrays are tracked through their seven in-place mutators, and
//! [`set`] / [`delete`] cover the structural edits interception cannot see.

pub mod debug;
pub mod dep;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod runtime;
pub mod value;

pub use debug::{DebugOp, DebuggerEvent, TrackOp, TriggerOp};
pub use dep::{Dep, Subscriber, SubscriberHandle, SubscriberId};
pub use error::{ModelError, RerunError};
pub use observer::{Observer, ReactiveOptions, define_reactive, delete, observe, set};
pub use reactive::{Computed, Effect, EffectHooks, Ref, is_ref, unref};
pub use runtime::{Diagnostic, MutationKind, ObservePause, ObserverConfig, ReaderGuard, Runtime};
pub use value::{
    Array, ArrayMethod, CompositeFlags, Descriptor, Object, PropKey, ReferenceCell, Value,
    has_changed, mark_raw, mark_readonly,
};
