#![forbid(unsafe_code)]

//! Diagnostic metadata passed to `on_track` / `on_trigger` hooks.
//!
//! Only built when dev diagnostics are enabled. Nothing in the engine reads
//! these back; they exist for developer tooling.

use std::rc::Rc;

use crate::value::{ArrayMethod, Value};

/// Why a dependency was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
}

/// Why subscribers are being re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    /// In-place array mutation that inserted nothing.
    ArrayMutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// One tracked read or one triggered write.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    pub op: DebugOp,
    pub target: Value,
    pub key: Option<Rc<str>>,
    pub method: Option<ArrayMethod>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

impl DebuggerEvent {
    #[must_use]
    pub fn track(target: Value, key: Rc<str>) -> Self {
        Self {
            op: DebugOp::Track(TrackOp::Get),
            target,
            key: Some(key),
            method: None,
            new_value: None,
            old_value: None,
        }
    }

    #[must_use]
    pub fn trigger(op: TriggerOp, target: Value) -> Self {
        Self {
            op: DebugOp::Trigger(op),
            target,
            key: None,
            method: None,
            new_value: None,
            old_value: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: Rc<str>) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: ArrayMethod) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn with_values(mut self, new_value: Value, old_value: Option<Value>) -> Self {
        self.new_value = Some(new_value);
        self.old_value = old_value;
        self
    }

    #[must_use]
    pub fn trigger_op(&self) -> Option<TriggerOp> {
        match self.op {
            DebugOp::Trigger(op) => Some(op),
            DebugOp::Track(_) => None,
        }
    }
}
