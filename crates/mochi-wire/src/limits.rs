use std::time::Duration;

pub const CHALLENGE_LEN: usize = 16;
pub const HEADERS_MAX_BYTES: usize = 4 * 1024;
pub const CONTENT_MAX_BYTES: usize = 100 * 1024 * 1024;
pub const MAX_MAP_PAIRS: usize = 1000;
pub const MAX_NESTED_LEVELS: usize = 32;
pub const MAX_KEY_BYTES: usize = 256;
pub const SEGMENT_DEADLINE: Duration = Duration::from_secs(30);

/// Walks a decoded CBOR value and rejects structures that exceed the
/// bounded limits from spec §4.7, independent of the byte-size cap already
/// enforced before decoding (a small but deeply-nested or wide payload can
/// still be an allocation-attack vector once expanded into a `Value` tree).
pub fn check_structure(value: &ciborium::value::Value) -> Result<(), String> {
    check_depth(value, 0)
}

fn check_depth(value: &ciborium::value::Value, depth: usize) -> Result<(), String> {
    if depth > MAX_NESTED_LEVELS {
        return Err(format!("nesting exceeds {MAX_NESTED_LEVELS} levels"));
    }
    use ciborium::value::Value as V;
    match value {
        V::Array(items) => {
            if items.len() > MAX_MAP_PAIRS {
                return Err(format!("array exceeds {MAX_MAP_PAIRS} elements"));
            }
            for item in items {
                check_depth(item, depth + 1)?;
            }
            Ok(())
        }
        V::Map(pairs) => {
            if pairs.len() > MAX_MAP_PAIRS {
                return Err(format!("map exceeds {MAX_MAP_PAIRS} pairs"));
            }
            for (k, v) in pairs {
                check_key_length(k)?;
                check_depth(k, depth + 1)?;
                check_depth(v, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Map keys are spec-bound to `MAX_KEY_BYTES` (spec §4.7); only text keys
/// carry a byte length, so non-text keys (integers, etc.) pass through
/// unchecked here.
fn check_key_length(key: &ciborium::value::Value) -> Result<(), String> {
    if let ciborium::value::Value::Text(text) = key {
        if text.len() > MAX_KEY_BYTES {
            return Err(format!("map key exceeds {MAX_KEY_BYTES} bytes"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::value::Value as V;

    #[test]
    fn flat_map_passes() {
        let value = V::Map(vec![(V::Text("a".into()), V::Integer(1.into()))]);
        assert!(check_structure(&value).is_ok());
    }

    #[test]
    fn oversized_array_is_rejected() {
        let items: Vec<V> = (0..(MAX_MAP_PAIRS + 1)).map(|i| V::Integer(i.into())).collect();
        let value = V::Array(items);
        assert!(check_structure(&value).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut value = V::Integer(1.into());
        for _ in 0..(MAX_NESTED_LEVELS + 2) {
            value = V::Array(vec![value]);
        }
        assert!(check_structure(&value).is_err());
    }

    #[test]
    fn oversized_map_key_is_rejected() {
        let key = "x".repeat(MAX_KEY_BYTES + 1);
        let value = V::Map(vec![(V::Text(key), V::Integer(1.into()))]);
        assert!(check_structure(&value).is_err());
    }

    #[test]
    fn map_key_at_limit_passes() {
        let key = "x".repeat(MAX_KEY_BYTES);
        let value = V::Map(vec![(V::Text(key), V::Integer(1.into()))]);
        assert!(check_structure(&value).is_ok());
    }
}
