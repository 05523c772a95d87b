use mochi_core::Value as HostValue;
use starlark::collections::SmallMap;
use starlark::values::dict::Dict;
use starlark::values::list::ListRef;
use starlark::values::{Heap, Value as StarlarkValue};

use crate::error::RuntimeError;

/// Allocates a [`HostValue`] onto a Starlark heap. Scripts see plain
/// Starlark `None`/`bool`/`int`/`float`/`str`/`list`/`dict`; `Bytes` and
/// `Stream` (which Starlark has no native representation for) round-trip
/// through their JSON projection, matching `mochi_core::Value::to_json`.
pub fn to_starlark<'v>(heap: &'v Heap, value: &HostValue) -> StarlarkValue<'v> {
    match value {
        HostValue::None => StarlarkValue::new_none(),
        HostValue::Bool(b) => StarlarkValue::new_bool(*b),
        HostValue::Int(i) => heap.alloc(*i),
        HostValue::Float(f) => heap.alloc(*f),
        HostValue::Bytes(_) | HostValue::Stream(_) => heap.alloc(json_string(value)),
        HostValue::String(s) => heap.alloc(s.as_str()),
        HostValue::List(items) => {
            let allocated: Vec<StarlarkValue<'v>> = items.iter().map(|i| to_starlark(heap, i)).collect();
            heap.alloc(allocated)
        }
        HostValue::Map(map) => {
            let mut small_map = SmallMap::with_capacity(map.len());
            for (key, val) in map {
                small_map.insert_hashed(
                    heap.alloc_str(key).to_value().get_hashed().expect("str is hashable"),
                    to_starlark(heap, val),
                );
            }
            heap.alloc(Dict::new(small_map))
        }
    }
}

fn json_string(value: &HostValue) -> String {
    value.to_json().to_string()
}

/// Converts a Starlark return/argument value back into [`HostValue`],
/// erroring on shapes with no host representation (functions, modules).
pub fn from_starlark(value: StarlarkValue<'_>) -> Result<HostValue, RuntimeError> {
    if value.is_none() {
        return Ok(HostValue::None);
    }
    if let Some(b) = value.unpack_bool() {
        return Ok(HostValue::Bool(b));
    }
    if let Some(i) = value.unpack_i32() {
        return Ok(HostValue::Int(i as i64));
    }
    if let Some(f) = value.unpack_num() {
        return Ok(HostValue::Float(f));
    }
    if let Some(s) = value.unpack_str() {
        return Ok(HostValue::String(s.to_string()));
    }
    if let Some(list) = ListRef::from_value(value) {
        let items = list
            .iter()
            .map(from_starlark)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(HostValue::List(items));
    }
    if let Some(dict) = starlark::values::dict::DictRef::from_value(value) {
        let mut map = std::collections::BTreeMap::new();
        for (k, v) in dict.iter() {
            let key = k
                .unpack_str()
                .ok_or_else(|| RuntimeError::Argument("dict keys must be strings".into()))?
                .to_string();
            map.insert(key, from_starlark(v)?);
        }
        return Ok(HostValue::Map(map));
    }
    Err(RuntimeError::Argument(format!(
        "value of type '{}' has no host representation",
        value.get_type()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use starlark::values::Heap;

    #[test]
    fn scalars_round_trip() {
        let heap = Heap::new();
        for value in [HostValue::None, HostValue::Bool(true), HostValue::Int(42), HostValue::String("hi".into())] {
            let starlark_value = to_starlark(&heap, &value);
            assert_eq!(from_starlark(starlark_value).unwrap(), value);
        }
    }

    #[test]
    fn list_round_trips() {
        let heap = Heap::new();
        let value = HostValue::List(vec![HostValue::Int(1), HostValue::Int(2)]);
        let starlark_value = to_starlark(&heap, &value);
        assert_eq!(from_starlark(starlark_value).unwrap(), value);
    }
}
