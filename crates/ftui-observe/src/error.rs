#![forbid(unsafe_code)]

//! Error types.
//!
//! Observation itself never fails loudly: unobservable input, inert
//! properties and refused mutations degrade to `None` or a
//! [`Diagnostic`](crate::runtime::Diagnostic). The types here cover the two
//! places where a caller genuinely needs a `Result`: the host object model
//! and subscriber re-runs.

use std::rc::Rc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Failure of a structural operation on the host object model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("cannot redefine non-configurable property: {key}")]
    NotConfigurable { key: Rc<str> },

    #[error("cannot define property {key}: object is not extensible")]
    NotExtensible { key: Rc<str> },
}

/// Failure reported by a subscriber's re-run.
///
/// [`Dep::notify`](crate::dep::Dep::notify) logs these and moves on to the
/// next subscriber; they never abort a notification pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RerunError {
    #[error("re-run failed: {message}")]
    Failed { message: String },

    #[error("subscriber has been stopped")]
    Stopped,
}

impl RerunError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
