#![forbid(unsafe_code)]

//! Evaluation drivers built on the observation core.
//!
//! - [`Effect`]: a closure re-run synchronously whenever a reactive value it
//!   read changes. Dependencies are re-collected on every run.
//! - [`Computed`]: a lazily-evaluated, memoized value that is itself
//!   reactive to its readers.
//! - [`Ref`]: a reactive box around one value, transparently dereferenced
//!   when stored in reactive state.
//!
//! # Architecture
//!
//! Each driver implements [`Subscriber`](crate::dep::Subscriber) and makes
//! itself the runtime's active reader while it evaluates, so the
//! property interceptors installed by [`observe`](crate::observer::observe)
//! subscribe it without any explicit wiring.
//!
//! # Invariants
//!
//! 1. A driver's dependency set is exactly what its last evaluation read.
//! 2. Writing a value identical to the current one re-runs nothing.
//! 3. `Computed::get()` never returns a stale value.

pub mod cell;
pub mod computed;
pub mod effect;

pub use cell::{Ref, is_ref, unref};
pub use computed::Computed;
pub use effect::{Effect, EffectHooks, WeakEffect};
