use crate::value::Value;
use std::collections::BTreeMap;

/// String marker used in place of values that are not known until apply.
pub const UNKNOWN_VALUE: &str = "04da6b54-80e4-46f7-96ec-b56ff0331ba9";

/// Converts a `Value` into a `prost_types::Value` for gRPC transmission.
///
/// Sets travel as lists and maps as structs; use [`protobuf_to_value_as`] to
/// get them back.
pub fn value_to_protobuf(val: &Value) -> prost_types::Value {
    use prost_types::value::Kind;

    let kind = match val {
        Value::Null => Kind::NullValue(0),
        Value::Unknown => Kind::StringValue(UNKNOWN_VALUE.to_string()),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(*n),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::List(items) | Value::Set(items) => {
            let values: Vec<prost_types::Value> = items.iter().map(value_to_protobuf).collect();
            Kind::ListValue(prost_types::ListValue { values })
        }
        Value::Object(entries) | Value::Map(entries) => Kind::StructValue(entries_to_struct(entries)),
    };

    prost_types::Value { kind: Some(kind) }
}

fn entries_to_struct(entries: &BTreeMap<String, Value>) -> prost_types::Struct {
    let fields: BTreeMap<String, prost_types::Value> = entries
        .iter()
        .map(|(k, v)| (k.clone(), value_to_protobuf(v)))
        .collect();
    prost_types::Struct { fields }
}

/// Encodes an object or map as a `google.protobuf.Struct`. Returns `None`
/// for any other value.
pub fn value_to_struct(val: &Value) -> Option<prost_types::Struct> {
    match val {
        Value::Object(entries) | Value::Map(entries) => Some(entries_to_struct(entries)),
        _ => None,
    }
}

/// Converts a `prost_types::Value` back into a `Value`.
pub fn protobuf_to_value(pv: &prost_types::Value) -> Value {
    protobuf_to_value_as(pv, &Value::Null)
}

/// Converts a `prost_types::Value` back into a `Value`, restoring sets and
/// maps wherever `shape` has one at the same position. A request's config is
/// the usual shape for decoding the matching response.
pub fn protobuf_to_value_as(pv: &prost_types::Value, shape: &Value) -> Value {
    use prost_types::value::Kind;

    let kind = match &pv.kind {
        Some(k) => k,
        None => return Value::Null,
    };

    match kind {
        Kind::NullValue(_) => Value::Null,
        Kind::BoolValue(b) => Value::Bool(*b),
        Kind::NumberValue(n) => Value::Number(*n),
        Kind::StringValue(s) => {
            if s == UNKNOWN_VALUE {
                Value::Unknown
            } else {
                Value::String(s.clone())
            }
        }
        Kind::ListValue(list) => {
            let element_shape = shape.elements().first().unwrap_or(&Value::Null);
            let values: Vec<Value> = list
                .values
                .iter()
                .map(|v| protobuf_to_value_as(v, element_shape))
                .collect();
            match shape {
                Value::Set(_) => Value::Set(values),
                _ => Value::List(values),
            }
        }
        Kind::StructValue(obj) => struct_to_value_as(obj, shape),
    }
}

/// Decodes a `google.protobuf.Struct` as an object, or as a map when
/// `shape` is one.
pub fn struct_to_value_as(obj: &prost_types::Struct, shape: &Value) -> Value {
    let entries: BTreeMap<String, Value> = obj
        .fields
        .iter()
        .map(|(k, v)| {
            let field_shape = match shape {
                // Map entries share one element type.
                Value::Map(m) => m.values().next().unwrap_or(&Value::Null),
                _ => shape.get_attr(k).unwrap_or(&Value::Null),
            };
            (k.clone(), protobuf_to_value_as(v, field_shape))
        })
        .collect();
    match shape {
        Value::Map(_) => Value::Map(entries),
        _ => Value::Object(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(val: Value) -> Value {
        let pb = value_to_protobuf(&val);
        protobuf_to_value(&pb)
    }

    #[test]
    fn test_scalars_round_trip() {
        assert_eq!(round_trip(Value::Null), Value::Null);
        assert_eq!(round_trip(Value::Bool(false)), Value::Bool(false));
        assert_eq!(round_trip(Value::Number(2.75)), Value::Number(2.75));
        assert_eq!(round_trip(Value::from("hello")), Value::from("hello"));
    }

    #[test]
    fn test_unknown_uses_sentinel() {
        let pb = value_to_protobuf(&Value::Unknown);
        assert_eq!(
            pb.kind,
            Some(prost_types::value::Kind::StringValue(UNKNOWN_VALUE.to_string()))
        );
        assert_eq!(protobuf_to_value(&pb), Value::Unknown);
    }

    #[test]
    fn test_nested_object_round_trip() {
        let v = Value::object([
            ("ami", Value::from("ami-1")),
            (
                "ebs",
                Value::List(vec![Value::object([("size", Value::from(10)), ("id", Value::Unknown)])]),
            ),
        ]);
        assert_eq!(round_trip(v.clone()), v);
    }

    #[test]
    fn test_set_and_map_need_a_shape() {
        let v = Value::object([
            ("tags", Value::map([("env", Value::from("prod"))])),
            ("zones", Value::Set(vec![Value::from("a"), Value::from("b")])),
        ]);
        let pb = value_to_protobuf(&v);

        let plain = protobuf_to_value(&pb);
        assert!(matches!(plain.get_attr("tags"), Some(Value::Object(_))));
        assert!(matches!(plain.get_attr("zones"), Some(Value::List(_))));

        let shaped = protobuf_to_value_as(&pb, &v);
        assert_eq!(shaped, v);
    }

    #[test]
    fn test_shape_applies_to_every_element() {
        let shape = Value::List(vec![Value::object([("ports", Value::Set(vec![]))])]);
        let v = Value::List(vec![
            Value::object([("ports", Value::Set(vec![Value::from(80)]))]),
            Value::object([("ports", Value::Set(vec![Value::from(443), Value::from(8443)]))]),
        ]);
        let decoded = protobuf_to_value_as(&value_to_protobuf(&v), &shape);
        assert_eq!(decoded, v);
    }

    #[test]
    fn test_value_to_struct() {
        let s = value_to_struct(&Value::object([("a", Value::from(true))])).unwrap();
        assert_eq!(s.fields.len(), 1);
        assert!(value_to_struct(&Value::from("x")).is_none());
        let back = struct_to_value_as(&s, &Value::Null);
        assert_eq!(back.get_attr("a"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_missing_kind_is_null() {
        assert_eq!(protobuf_to_value(&prost_types::Value { kind: None }), Value::Null);
    }
}
