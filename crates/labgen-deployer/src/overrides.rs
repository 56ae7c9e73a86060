//! Override merging.
//!
//! Override trees are plain JSON objects. Objects merge key by key, any
//! other value in the override replaces what was there.

use serde_json::{Map, Value};

/// Merge `overlay` into `base`, overlay winning on conflict.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_maps(base, overlay),
        (base, overlay) => *base = overlay.clone(),
    }
}

pub fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Combine override scopes in precedence order, later scopes winning.
pub fn combine<'a>(scopes: impl IntoIterator<Item = Option<&'a Map<String, Value>>>) -> Map<String, Value> {
    let mut combined = Map::new();
    for scope in scopes.into_iter().flatten() {
        merge_maps(&mut combined, scope);
    }
    combined
}
