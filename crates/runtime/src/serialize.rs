//! Bounded, cycle-safe conversion of host values to JSON.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Number, Value};

use crate::value::HostValue;

/// Lists and maps are cut to this many entries, silently.
pub const MAX_ITEMS: usize = 100;

/// Nesting depth kept by [`serialize`] unless the caller asks otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 3;

pub const CIRCULAR_REFERENCE: &str = "<circular reference>";
pub const MAX_DEPTH_REACHED: &str = "<max depth reached>";
pub const UNSERIALIZABLE: &str = "<unserializable>";

// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert `value` into JSON that is always finite and bounded.
///
/// The top-level value sits at depth 0; anything nested deeper than
/// `max_depth` becomes [`MAX_DEPTH_REACHED`]. A list or map that appears
/// again on its own ancestor path becomes [`CIRCULAR_REFERENCE`]; the same
/// structure reached through sibling branches is serialized each time.
pub fn serialize(value: &HostValue, max_depth: usize) -> Value {
    let mut path = Vec::new();
    serialize_at(value, max_depth, 0, &mut path)
}

fn serialize_at(
    value: &HostValue,
    max_depth: usize,
    depth: usize,
    path: &mut Vec<*const ()>,
) -> Value {
    if depth > max_depth {
        return Value::String(MAX_DEPTH_REACHED.into());
    }

    match value {
        HostValue::Null | HostValue::Undefined => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Number(n) => number(*n),
        HostValue::String(s) => Value::String(s.clone()),
        HostValue::List(items) => {
            let Some((id, items)) = enter(items, path) else {
                return Value::String(CIRCULAR_REFERENCE.into());
            };
            path.push(id);
            let mut out = Vec::with_capacity(items.len().min(MAX_ITEMS));
            for item in items.iter().take(MAX_ITEMS) {
                out.push(serialize_at(item, max_depth, depth + 1, path));
            }
            path.pop();
            Value::Array(out)
        }
        HostValue::Map(entries) => {
            let Some((id, entries)) = enter(entries, path) else {
                return Value::String(CIRCULAR_REFERENCE.into());
            };
            path.push(id);
            let mut out = Map::new();
            for (key, item) in entries.iter().take(MAX_ITEMS) {
                if item.is_undefined() {
                    continue;
                }
                out.insert(key.clone(), serialize_at(item, max_depth, depth + 1, path));
            }
            path.pop();
            Value::Object(out)
        }
        HostValue::Opaque(display) => describe(display.as_ref()),
    }
}

/// Identity of `shared` plus a snapshot of its contents, or `None` if it
/// is already on the path.
fn enter<T: Clone>(shared: &Arc<Mutex<T>>, path: &[*const ()]) -> Option<(*const (), T)> {
    let id = Arc::as_ptr(shared) as *const ();
    if path.contains(&id) {
        return None;
    }
    // Snapshot and release the lock before recursing into children.
    let contents = shared.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Some((id, contents))
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

// A `Display` impl that errors or panics yields the fallback string.
fn describe(display: &(dyn fmt::Display + Send + Sync)) -> Value {
    let mut out = String::new();
    let written = panic::catch_unwind(AssertUnwindSafe(|| {
        fmt::write(&mut out, format_args!("{display}"))
    }));
    match written {
        Ok(Ok(())) => Value::String(out),
        _ => Value::String(UNSERIALIZABLE.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Widget;

    impl fmt::Display for Widget {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("[object Widget]")
        }
    }

    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    struct Exploding;

    impl fmt::Display for Exploding {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("widget already disposed")
        }
    }

    fn nested(levels: usize) -> HostValue {
        let mut value = HostValue::from("leaf");
        for _ in 0..levels {
            value = HostValue::list(vec![value]);
        }
        value
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(serialize(&HostValue::Null, 3), json!(null));
        assert_eq!(serialize(&HostValue::Undefined, 3), json!(null));
        assert_eq!(serialize(&true.into(), 3), json!(true));
        assert_eq!(serialize(&42i64.into(), 3), json!(42));
        assert_eq!(serialize(&1.5f64.into(), 3), json!(1.5));
        assert_eq!(serialize(&"hi".into(), 3), json!("hi"));
        assert_eq!(serialize(&f64::NAN.into(), 3), json!(null));
    }

    #[test]
    fn json_input_is_preserved() {
        let input = json!({"b": [1, 2, {"c": null}], "a": "x"});
        let value = HostValue::from(input.clone());
        assert_eq!(serialize(&value, 3), input);
    }

    #[test]
    fn self_referencing_list_terminates() {
        let list = HostValue::list(vec![1i64.into()]);
        list.push(list.clone());
        assert_eq!(serialize(&list, 3), json!([1, CIRCULAR_REFERENCE]));
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let parent = HostValue::map([("name", HostValue::from("parent"))]);
        let child = HostValue::map([("parent", parent.clone())]);
        parent.insert("child", child);

        assert_eq!(
            serialize(&parent, 3),
            json!({"name": "parent", "child": {"parent": CIRCULAR_REFERENCE}})
        );
    }

    #[test]
    fn shared_sibling_is_serialized_twice() {
        let shared = HostValue::list(vec![7i64.into()]);
        let root = HostValue::map([("left", shared.clone()), ("right", shared)]);
        assert_eq!(serialize(&root, 3), json!({"left": [7], "right": [7]}));
    }

    #[test]
    fn long_list_is_cut_to_limit() {
        let list = HostValue::list((0..250i64).map(HostValue::from).collect());
        let out = serialize(&list, 3);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), MAX_ITEMS);
        assert_eq!(items[99], json!(99));
    }

    #[test]
    fn wide_map_keeps_first_keys_in_order() {
        let map = HostValue::map((0..150).map(|i| (format!("k{i}"), HostValue::from(i as i64))));
        let out = serialize(&map, 3);
        let object = out.as_object().unwrap();
        assert_eq!(object.len(), MAX_ITEMS);
        assert_eq!(object.keys().next().unwrap(), "k0");
        assert_eq!(object.keys().last().unwrap(), "k99");
        assert!(!object.contains_key("k100"));
    }

    #[test]
    fn depth_limit_applies_past_max_depth() {
        // Leaf at depth 3: kept.
        assert_eq!(serialize(&nested(3), 3), json!([[["leaf"]]]));
        // Leaf at depth 4: replaced.
        assert_eq!(serialize(&nested(4), 3), json!([[[[MAX_DEPTH_REACHED]]]]));
        assert_eq!(serialize(&nested(3), 2), json!([[[MAX_DEPTH_REACHED]]]));
    }

    #[test]
    fn opaque_values_use_display() {
        let value = HostValue::map([
            ("widget", HostValue::opaque(Widget)),
            ("broken", HostValue::opaque(Broken)),
            ("ok", HostValue::from(1i64)),
        ]);
        assert_eq!(
            serialize(&value, 3),
            json!({"widget": "[object Widget]", "broken": UNSERIALIZABLE, "ok": 1})
        );
    }

    #[test]
    fn panicking_display_is_unserializable() {
        let value = HostValue::list(vec![HostValue::opaque(Exploding), HostValue::from("after")]);
        assert_eq!(serialize(&value, 3), json!([UNSERIALIZABLE, "after"]));
    }

    #[test]
    fn undefined_map_values_are_dropped() {
        let value = HostValue::map([("a", HostValue::Undefined), ("b", HostValue::Null)]);
        assert_eq!(serialize(&value, 3), json!({"b": null}));
    }
}
