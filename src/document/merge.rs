use serde_yaml::{Mapping, Value};

/// Deep-merge `overlay` on top of `base`.
///
/// Mappings merge key by key, sequences are replaced wholesale and every
/// other combination lets the overlay win.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut target), Value::Mapping(source)) => {
            merge_mapping(&mut target, source);
            Value::Mapping(target)
        }
        (_, overlay) => overlay,
    }
}

pub fn merge_mapping(target: &mut Mapping, source: Mapping) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => {
                let current = std::mem::take(existing);
                *existing = deep_merge(current, value);
            }
            None => {
                target.insert(key, value);
            }
        }
    }
}
