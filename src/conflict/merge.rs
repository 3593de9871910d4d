//! Deep merge of local and server JSON values.
//!
//! Merge rules, applied recursively:
//! - objects merge key-wise, the server value winning scalar conflicts;
//! - arrays whose elements are all objects carrying a stable `id` merge by
//!   that id, the server winning duplicates;
//! - other arrays union by structural equality, preserving first occurrence;
//! - anything else takes the server value.
//!
//! The merge is idempotent: `merge(merge(a, b), b) == merge(a, b)`.

use serde_json::{Map, Value};

/// Merges `server` into `local`, returning the resolved value.
pub fn deep_merge(local: &Value, server: &Value) -> Value {
    match (local, server) {
        (Value::Object(local_map), Value::Object(server_map)) => {
            merge_objects(local_map, server_map)
        }
        (Value::Array(local_items), Value::Array(server_items)) => {
            Value::Array(merge_arrays(local_items, server_items))
        }
        // Scalar or mixed-shape conflict: server wins.
        (_, server) => server.clone(),
    }
}

fn merge_objects(local: &Map<String, Value>, server: &Map<String, Value>) -> Value {
    let mut merged = local.clone();

    for (key, server_value) in server {
        match merged.get(key) {
            Some(local_value) => {
                merged.insert(key.clone(), deep_merge(local_value, server_value));
            }
            None => {
                merged.insert(key.clone(), server_value.clone());
            }
        }
    }

    Value::Object(merged)
}

fn merge_arrays(local: &[Value], server: &[Value]) -> Vec<Value> {
    if is_id_keyed(local) && is_id_keyed(server) {
        merge_by_id(local, server)
    } else {
        union_preserving_first(local, server)
    }
}

/// True when every element is an object carrying an `id` key. Vacuously true
/// for an empty slice, so the branch choice stays stable when one side is
/// empty and a re-merge would otherwise flip from union to id-merge.
fn is_id_keyed(items: &[Value]) -> bool {
    items
        .iter()
        .all(|item| item.as_object().is_some_and(|obj| obj.contains_key("id")))
}

fn merge_by_id(local: &[Value], server: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = local.to_vec();

    for server_item in server {
        let server_id = &server_item["id"];
        match merged
            .iter_mut()
            .find(|item| &item["id"] == server_id)
        {
            // Duplicate id: the server's element replaces the local one.
            Some(slot) => *slot = server_item.clone(),
            None => merged.push(server_item.clone()),
        }
    }

    merged
}

fn union_preserving_first(local: &[Value], server: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = local.to_vec();

    for server_item in server {
        if !merged.contains(server_item) {
            merged.push(server_item.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Expect server to win scalar conflicts
    #[test]
    fn server_wins_scalars() {
        let local = json!({"name": "old", "kept": true});
        let server = json!({"name": "new"});

        let merged = deep_merge(&local, &server);
        assert_eq!(merged, json!({"name": "new", "kept": true}));
    }

    /// Expect nested objects to merge recursively
    #[test]
    fn recurses_into_nested_objects() {
        let local = json!({"profile": {"bio": "hi", "avatar": "a.png"}});
        let server = json!({"profile": {"bio": "hello"}});

        let merged = deep_merge(&local, &server);
        assert_eq!(
            merged,
            json!({"profile": {"bio": "hello", "avatar": "a.png"}})
        );
    }

    /// Expect server-only keys to be added
    #[test]
    fn adds_server_only_keys() {
        let local = json!({"a": 1});
        let server = json!({"b": 2});

        assert_eq!(deep_merge(&local, &server), json!({"a": 1, "b": 2}));
    }

    /// Expect id-keyed arrays to merge by id with server winning duplicates
    #[test]
    fn merges_id_keyed_arrays() {
        let local = json!([{"id": 1, "qty": 2}, {"id": 2, "qty": 1}]);
        let server = json!([{"id": 2, "qty": 5}, {"id": 3, "qty": 1}]);

        let merged = deep_merge(&local, &server);
        assert_eq!(
            merged,
            json!([{"id": 1, "qty": 2}, {"id": 2, "qty": 5}, {"id": 3, "qty": 1}])
        );
    }

    /// Expect plain arrays to union preserving first occurrence
    #[test]
    fn unions_plain_arrays() {
        let local = json!(["a", "b"]);
        let server = json!(["b", "c"]);

        assert_eq!(deep_merge(&local, &server), json!(["a", "b", "c"]));
    }

    /// Expect mixed-shape values to take the server side
    #[test]
    fn mixed_shapes_take_server() {
        let local = json!({"a": 1});
        let server = json!([1, 2]);

        assert_eq!(deep_merge(&local, &server), json!([1, 2]));
    }

    /// Expect merge to be idempotent
    #[test]
    fn merge_is_idempotent() {
        let local = json!({
            "name": "old",
            "tags": ["a", "b"],
            "items": [{"id": 1, "qty": 2}],
            "nested": {"x": 1, "y": 2}
        });
        let server = json!({
            "name": "new",
            "tags": ["b", "c"],
            "items": [{"id": 1, "qty": 9}, {"id": 2, "qty": 1}],
            "nested": {"y": 3}
        });

        let once = deep_merge(&local, &server);
        let twice = deep_merge(&once, &server);
        assert_eq!(once, twice);
    }
}
