//! Inverse of [`crate::decoder`]: renders a [`Value`] back into the tagged
//! MessagePack layout the evaluator emits.
//!
//! Used by test fixtures that impersonate the evaluator. `List` is written as
//! `Listing` and `Map` as `Mapping`, since both decode to the same variant.

use rmpv::Value as Raw;

use crate::code;
use crate::value::{Properties, Value};

/// Encode a value into a MessagePack byte payload.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writes into a Vec are infallible.
    let _ = rmpv::encode::write_value(&mut buf, &to_msgpack(value));
    buf
}

/// Convert a value into its raw MessagePack form.
pub fn to_msgpack(value: &Value) -> Raw {
    match value {
        Value::Null => Raw::Nil,
        Value::Bool(b) => Raw::Boolean(*b),
        Value::Int(n) => Raw::from(*n),
        Value::Float(f) => Raw::F64(*f),
        Value::String(s) => Raw::from(s.as_str()),
        Value::Bytes(b) => Raw::Binary(b.clone()),
        Value::List(items) => tagged(code::LISTING, vec![seq(items)]),
        Value::Set(items) => tagged(code::SET, vec![seq(items)]),
        Value::Map(map) => tagged(
            code::MAPPING,
            vec![Raw::Map(
                map.iter()
                    .map(|(k, v)| (to_msgpack(k), to_msgpack(v)))
                    .collect(),
            )],
        ),
        Value::Dynamic(dynamic) => {
            let mut members = properties(&dynamic.properties);
            members.extend(
                dynamic
                    .entries
                    .iter()
                    .map(|(k, v)| tagged(code::MEMBER_ENTRY, vec![to_msgpack(k), to_msgpack(v)])),
            );
            members.extend(dynamic.elements.iter().enumerate().map(|(i, v)| {
                tagged(code::MEMBER_ELEMENT, vec![Raw::from(i as u64), to_msgpack(v)])
            }));
            object(code::DYNAMIC_CLASS, code::BASE_MODULE, members)
        }
        Value::Object(obj) => object(
            &obj.class_name,
            &obj.module_uri,
            properties(&obj.properties),
        ),
        Value::Duration(d) => tagged(
            code::DURATION,
            vec![Raw::F64(d.value), Raw::from(d.unit.as_str())],
        ),
        Value::DataSize(d) => tagged(
            code::DATA_SIZE,
            vec![Raw::F64(d.value), Raw::from(d.unit.as_str())],
        ),
        Value::IntSeq(s) => tagged(
            code::INT_SEQ,
            vec![Raw::from(s.start), Raw::from(s.end), Raw::from(s.step)],
        ),
        Value::Regex(r) => tagged(code::REGEX, vec![Raw::from(r.pattern.as_str())]),
        Value::Pair(p) => tagged(code::PAIR, vec![to_msgpack(&p.first), to_msgpack(&p.second)]),
        Value::Placeholder => tagged(code::CLASS, vec![]),
    }
}

fn tagged(tag: u8, rest: Vec<Raw>) -> Raw {
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(Raw::from(tag));
    items.extend(rest);
    Raw::Array(items)
}

fn seq(items: &[Value]) -> Raw {
    Raw::Array(items.iter().map(to_msgpack).collect())
}

fn properties(props: &Properties) -> Vec<Raw> {
    props
        .iter()
        .map(|(name, v)| tagged(code::MEMBER_PROPERTY, vec![Raw::from(name), to_msgpack(v)]))
        .collect()
}

fn object(class_name: &str, module_uri: &str, members: Vec<Raw>) -> Raw {
    tagged(
        code::OBJECT,
        vec![
            Raw::from(class_name),
            Raw::from(module_uri),
            Raw::Array(members),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::value::{
        DataSize, DataSizeUnit, Duration, DurationUnit, Dynamic, IntSeq, Pair, Regex, TypedObject,
    };

    #[test]
    fn test_dynamic_survives_encode_decode() {
        let dynamic = Value::Dynamic(Dynamic {
            properties: [("name", Value::from("bird"))].into_iter().collect(),
            entries: [(Value::Int(1), Value::from("one"))].into_iter().collect(),
            elements: vec![Value::Bool(true), Value::Null],
        });
        assert_eq!(decode(&encode(&dynamic)).unwrap(), dynamic);
    }

    #[test]
    fn test_nested_object() {
        let inner = Value::Pair(Box::new(Pair {
            first: Value::Duration(Duration {
                value: 3.0,
                unit: DurationUnit::Seconds,
            }),
            second: Value::IntSeq(IntSeq {
                start: 1,
                end: 5,
                step: 1,
            }),
        }));
        let outer = Value::Object(TypedObject {
            class_name: "Config".to_string(),
            module_uri: "repl:text".to_string(),
            properties: [("timing", inner), ("tags", Value::Set(vec!["x".into()]))]
                .into_iter()
                .collect(),
        });
        assert_eq!(decode(&encode(&outer)).unwrap(), outer);
    }

    #[test]
    fn test_data_size_and_regex_survive_encode_decode() {
        let values = Value::List(vec![
            Value::DataSize(DataSize {
                value: 30.5,
                unit: DataSizeUnit::Megabytes,
            }),
            Value::DataSize(DataSize {
                value: 2.0,
                unit: DataSizeUnit::Pebibytes,
            }),
            Value::Regex(Regex {
                pattern: r"^\d+(\.\d+)?$".to_string(),
            }),
        ]);
        assert_eq!(decode(&encode(&values)).unwrap(), values);
    }

    #[test]
    fn test_list_is_written_as_listing() {
        let raw = to_msgpack(&Value::List(vec![]));
        let Raw::Array(items) = raw else {
            panic!("expected array");
        };
        assert_eq!(items[0], Raw::from(code::LISTING));
    }
}
