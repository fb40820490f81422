//! End-to-end scenarios for observation, interception and imperative
//! mutation, driven through `Effect` subscribers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ftui_observe::{
    Array, ArrayMethod, Dep, Effect, Object, ObserverConfig, Ref, Runtime, Subscriber,
    SubscriberId, Value, delete, observe, set,
};
use serde_json::json;

// ── Helpers ──────────────────────────────────────────────────────────

fn observed(rt: &Runtime, json: serde_json::Value) -> Value {
    let v = Value::from_json(&json);
    observe(rt, &v, false, false).expect("observed");
    v
}

fn object(v: &Value) -> Object {
    v.as_object().expect("object").clone()
}

/// Effect that records every value `read` returns.
fn log_effect(
    rt: &Runtime,
    read: impl Fn() -> Value + 'static,
) -> (Effect, Rc<RefCell<Vec<Value>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let effect = Effect::new(rt, move || sink.borrow_mut().push(read()));
    (effect, log)
}

/// Subscriber that only counts, registered directly on a node.
struct Probe {
    id: SubscriberId,
    hits: Cell<u32>,
}

impl Probe {
    fn on(dep: &Dep) -> Rc<Self> {
        let probe = Rc::new(Self {
            id: SubscriberId::next(),
            hits: Cell::new(0),
        });
        dep.subscribe(probe.clone());
        probe
    }
}

impl Subscriber for Probe {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) -> Result<(), ftui_observe::RerunError> {
        self.hits.set(self.hits.get() + 1);
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════
// End-to-end
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn end_to_end_single_rerun_then_suppressed() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"a": 1}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, log) = log_effect(&rt, move || reader.get("a"));

    o.set("a", Value::from(2));
    assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(2)]);

    o.set("a", Value::from(2));
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(effect.run_count(), 2);
}

// ═════════════════════════════════════════════════════════════════════════
// Identity suppression
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn nan_to_nan_never_notifies() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"n": 0}));
    let o = object(&state);
    o.set("n", Value::from(f64::NAN));
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("n"));

    o.set("n", Value::from(f64::NAN));
    assert_eq!(effect.run_count(), 1);
    o.set("n", Value::from(1));
    assert_eq!(effect.run_count(), 2);
}

#[test]
fn same_composite_is_suppressed() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"child": {"x": 1}}));
    let o = object(&state);
    let child = o.get("child");
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("child"));

    o.set("child", child);
    assert_eq!(effect.run_count(), 1);
    o.set("child", Value::from_json(&json!({"x": 1})));
    assert_eq!(effect.run_count(), 2);
}

// ═════════════════════════════════════════════════════════════════════════
// Read/write round trip
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn reader_subscribes_to_property_node() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"k": "a", "other": 0}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, log) = log_effect(&rt, move || reader.get("k"));
    assert_eq!(effect.dep_count(), 1);

    o.set("other", Value::from(1));
    assert_eq!(effect.run_count(), 1);
    o.set("k", Value::from("b"));
    assert_eq!(log.borrow().last(), Some(&Value::from("b")));
}

#[test]
fn untracked_reads_do_not_subscribe() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"k": 1}));
    let o = object(&state);
    let reader = o.clone();
    let rt2 = rt.clone();
    let (effect, _) = log_effect(&rt, move || rt2.untracked(|| reader.get("k")));
    assert_eq!(effect.dep_count(), 0);
    o.set("k", Value::from(2));
    assert_eq!(effect.run_count(), 1);
}

// ═════════════════════════════════════════════════════════════════════════
// Structural add
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn plain_add_is_invisible_but_set_is_not() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"a": 1}));
    let o = object(&state);
    let ob = state.observer().expect("observer");
    let structural = Probe::on(ob.dep());

    o.set("plain", Value::from(1));
    assert_eq!(structural.hits.get(), 0);
    assert!(!o.own_property("plain").expect("plain").is_accessor());

    set(&rt, &state, "added", Value::from(1));
    assert_eq!(structural.hits.get(), 1);

    let reader = o.clone();
    let (effect, log) = log_effect(&rt, move || reader.get("added"));
    o.set("added", Value::from(2));
    assert_eq!(effect.run_count(), 2);
    assert_eq!(log.borrow().last(), Some(&Value::from(2)));
}

#[test]
fn reading_nested_object_depends_on_its_structure() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"inner": {}}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("inner"));

    let inner = o.get("inner");
    set(&rt, &inner, "k", Value::from(1));
    assert_eq!(effect.run_count(), 2);
    delete(&rt, &inner, "k");
    assert_eq!(effect.run_count(), 3);
}

// ═════════════════════════════════════════════════════════════════════════
// Arrays
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn every_mutator_reruns_a_reader_once() {
    let rt = Runtime::new();
    for method in ArrayMethod::ALL {
        let state = observed(&rt, json!({"list": [2, 3, 1]}));
        let o = object(&state);
        let reader = o.clone();
        let (effect, _) = log_effect(&rt, move || reader.get("list"));
        let list = o.get("list");
        let arr = list.as_array().expect("array");

        match method {
            ArrayMethod::Push => {
                arr.push([Value::from(4)]);
            }
            ArrayMethod::Pop => {
                arr.pop();
            }
            ArrayMethod::Shift => {
                arr.shift();
            }
            ArrayMethod::Unshift => {
                arr.unshift([Value::from(0)]);
            }
            ArrayMethod::Splice => {
                arr.splice(0, Some(1), [Value::from(9), Value::from(8)]);
            }
            ArrayMethod::Sort => arr.sort(),
            ArrayMethod::Reverse => arr.reverse(),
        }
        assert_eq!(effect.run_count(), 2, "{method}");
    }
}

#[test]
fn pushed_objects_are_independently_reactive() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"list": []}));
    let o = object(&state);
    let list = o.get("list");
    let arr = list.as_array().expect("array").clone();

    arr.push([Value::from_json(&json!({"name": "a"}))]);
    let item = object(&arr.get(0));
    let reader = item.clone();
    let (effect, log) = log_effect(&rt, move || reader.get("name"));

    item.set("name", Value::from("b"));
    assert_eq!(effect.run_count(), 2);
    assert_eq!(log.borrow().last(), Some(&Value::from("b")));
}

#[test]
fn element_mutation_reaches_array_reader() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"rows": [{"v": 1}]}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("rows"));

    let row = o.get("rows").as_array().expect("array").get(0);
    set(&rt, &row, "extra", Value::from(true));
    assert_eq!(effect.run_count(), 2);
}

#[test]
fn index_and_length_writes_need_the_api() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"list": [1, 2, 3]}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("list"));
    let list = o.get("list");
    let arr: &Array = list.as_array().expect("array");

    arr.set_index(0, Value::from(10));
    arr.set_len(2);
    assert_eq!(effect.run_count(), 1);

    set(&rt, &list, 0usize, Value::from(20));
    assert_eq!(effect.run_count(), 2);
    delete(&rt, &list, 0usize);
    assert_eq!(effect.run_count(), 3);
    assert_eq!(arr.to_vec(), vec![Value::from(2)]);
}

// ═════════════════════════════════════════════════════════════════════════
// Aliasing
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn shared_child_has_one_observer_and_reaches_every_parent_reader() {
    let rt = Runtime::new();
    let shared = Value::from_json(&json!({"k": 1}));
    let left = Object::new();
    left.set("a", shared.clone());
    left.set("b", shared.clone());
    let right = Object::new();
    right.set("c", shared.clone());
    let left_v = Value::from(left.clone());
    let right_v = Value::from(right.clone());
    observe(&rt, &left_v, false, false).expect("observed");
    observe(&rt, &right_v, false, false).expect("observed");

    let ob = shared.observer().expect("observer");
    for (parent, key) in [(&left, "a"), (&left, "b"), (&right, "c")] {
        let via = parent.get(key).observer().expect("observer");
        assert!(Rc::ptr_eq(&via, &ob), "{key}");
    }
    assert!(Rc::ptr_eq(
        &observe(&rt, &shared, false, false).expect("observed"),
        &ob
    ));

    let (ra, rb, rc) = (left.clone(), left.clone(), right.clone());
    let (via_a, _) = log_effect(&rt, move || ra.get("a"));
    let (via_b, _) = log_effect(&rt, move || rb.get("b"));
    let (via_c, _) = log_effect(&rt, move || rc.get("c"));

    set(&rt, &shared, "extra", Value::from(true));
    assert_eq!(
        [via_a.run_count(), via_b.run_count(), via_c.run_count()],
        [2, 2, 2]
    );

    delete(&rt, &shared, "extra");
    assert_eq!(
        [via_a.run_count(), via_b.run_count(), via_c.run_count()],
        [3, 3, 3]
    );
}

// ═════════════════════════════════════════════════════════════════════════
// Release notify path
// ═════════════════════════════════════════════════════════════════════════

fn release_runtime() -> Runtime {
    Runtime::with_config(ObserverConfig::default().with_dev_diagnostics(false))
}

#[test]
fn release_round_trip_tracks_and_notifies() {
    let rt = release_runtime();
    assert!(!rt.is_dev());
    let state = observed(&rt, json!({"a": 1, "list": [1]}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, log) = log_effect(&rt, move || reader.get("a"));
    assert_eq!(effect.dep_count(), 1);

    o.set("a", Value::from(2));
    o.set("a", Value::from(2));
    assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(2)]);
}

#[test]
fn release_bridged_mutation_notifies_once() {
    let rt = release_runtime();
    let state = observed(&rt, json!({"list": [3, 1, 2]}));
    let o = object(&state);
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("list"));
    let list = o.get("list");
    let arr = list.as_array().expect("array");

    arr.push([Value::from(4)]);
    assert_eq!(effect.run_count(), 2);
    arr.sort();
    assert_eq!(effect.run_count(), 3);
}

#[test]
fn release_set_and_delete_notify_structural_readers() {
    let rt = release_runtime();
    let state = observed(&rt, json!({"inner": {}, "list": [1, 2]}));
    let o = object(&state);
    let ob = state.observer().expect("observer");
    let structural = Probe::on(ob.dep());

    set(&rt, &state, "added", Value::from(1));
    assert_eq!(structural.hits.get(), 1);
    delete(&rt, &state, "added");
    assert_eq!(structural.hits.get(), 2);

    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("list"));
    let list = o.get("list");
    set(&rt, &list, 5usize, Value::from(6));
    assert_eq!(effect.run_count(), 2);
    delete(&rt, &list, 0usize);
    assert_eq!(effect.run_count(), 3);
}

#[test]
fn release_ref_trigger_reruns_readers() {
    let rt = release_runtime();
    let cell = Ref::shallow(&rt, Value::from_json(&json!({"x": 1})));
    let reader = cell.clone();
    let (effect, _) = log_effect(&rt, move || reader.get());
    cell.trigger();
    assert_eq!(effect.run_count(), 2);
    cell.set(Value::from(2));
    assert_eq!(effect.run_count(), 3);
}

// ═════════════════════════════════════════════════════════════════════════
// Idempotence and shallow mode
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn observing_twice_keeps_one_node_per_key() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"a": 1}));
    let again = observe(&rt, &state, false, false).expect("observed");
    assert!(Rc::ptr_eq(&again, &state.observer().expect("observer")));

    let o = object(&state);
    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || reader.get("a"));
    o.set("a", Value::from(2));
    assert_eq!(effect.run_count(), 2);
    assert_eq!(effect.dep_count(), 1);
}

#[test]
fn shallow_observation_leaves_nested_plain() {
    let rt = Runtime::new();
    let state = Value::from_json(&json!({"nested": {"x": 1}}));
    observe(&rt, &state, true, false).expect("observed");
    let o = object(&state);
    let nested = object(&o.get("nested"));
    assert!(!nested.own_property("x").expect("x").is_accessor());

    let reader = o.clone();
    let (effect, _) = log_effect(&rt, move || {
        let nested = reader.get("nested");
        nested.as_object().map_or(Value::Undefined, |n| n.get("x"))
    });
    nested.set("x", Value::from(2));
    assert_eq!(effect.run_count(), 1);

    o.set("nested", Value::from_json(&json!({"x": 3})));
    assert_eq!(effect.run_count(), 2);
}

// ═════════════════════════════════════════════════════════════════════════
// Failure isolation
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn failing_effect_does_not_block_others() {
    let rt = Runtime::new();
    let state = observed(&rt, json!({"a": 1}));
    let o = object(&state);

    let r1 = o.clone();
    let failing = Effect::fallible(&rt, move || {
        if r1.get("a") == Value::from(2) {
            Err(ftui_observe::RerunError::failed("refused"))
        } else {
            Ok(())
        }
    })
    .expect("first run succeeds");

    let r2 = o.clone();
    let (healthy, log) = log_effect(&rt, move || r2.get("a"));

    o.set("a", Value::from(2));
    assert_eq!(failing.run_count(), 2);
    assert_eq!(healthy.run_count(), 2);
    assert_eq!(log.borrow().last(), Some(&Value::from(2)));
}
