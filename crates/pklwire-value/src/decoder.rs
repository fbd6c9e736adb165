//! Decoding of evaluator result payloads into [`Value`].
//!
//! Primitives map directly from MessagePack. Everything else is an array
//! `[tag, ...]` where `tag` is one of the constants in [`crate::code`].

use rmpv::Value as Raw;

use crate::code;
use crate::error::{DecodeError, Result};
use crate::value::{
    DataSize, DataSizeUnit, Duration, DurationUnit, Dynamic, IntSeq, Pair, Properties, Regex,
    TypedObject, Value, ValueMap,
};

/// Decode a single value from a complete MessagePack payload.
///
/// The payload must contain exactly one value; leftover bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut cursor = bytes;
    let raw = rmpv::decode::read_value(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(DecodeError::TrailingBytes(cursor.len()));
    }
    decode_value(raw)
}

/// Decode an already-parsed MessagePack value.
pub fn decode_value(raw: Raw) -> Result<Value> {
    match raw {
        Raw::Nil => Ok(Value::Null),
        Raw::Boolean(b) => Ok(Value::Bool(b)),
        Raw::Integer(n) => integer(n).map(Value::Int),
        Raw::F32(f) => Ok(Value::Float(f64::from(f))),
        Raw::F64(f) => Ok(Value::Float(f)),
        Raw::String(s) => s
            .into_str()
            .map(Value::String)
            .ok_or_else(|| DecodeError::malformed("string", "invalid UTF-8")),
        Raw::Binary(bytes) => Ok(Value::Bytes(bytes)),
        Raw::Array(items) => decode_tagged(items),
        Raw::Map(_) => Err(DecodeError::malformed(
            "value",
            "bare map outside a Map or Mapping tag",
        )),
        Raw::Ext(ty, _) => Err(DecodeError::malformed(
            "value",
            format!("unsupported extension type {ty}"),
        )),
    }
}

fn integer(n: rmpv::Integer) -> Result<i64> {
    match n.as_i64() {
        Some(v) => Ok(v),
        None => Err(DecodeError::IntegerOutOfRange(n.as_u64().unwrap_or(u64::MAX))),
    }
}

fn decode_tagged(items: Vec<Raw>) -> Result<Value> {
    let mut items = items.into_iter();
    let tag = match items.next() {
        Some(Raw::Integer(n)) => n
            .as_u64()
            .ok_or_else(|| DecodeError::malformed("value", "negative type tag"))?,
        Some(other) => {
            return Err(DecodeError::malformed(
                "value",
                format!("array does not start with a type tag: {other}"),
            ))
        }
        None => return Err(DecodeError::malformed("value", "empty array")),
    };
    let mut fields = Fields {
        what: code::code_name(tag),
        items,
    };

    let value = match u8::try_from(tag).unwrap_or(u8::MAX) {
        code::OBJECT => decode_object(&mut fields)?,
        code::MAP | code::MAPPING => Value::Map(decode_map(fields.next()?)?),
        code::LIST | code::LISTING => Value::List(decode_seq(fields.next()?)?),
        code::SET => Value::Set(decode_seq(fields.next()?)?),
        code::DURATION => {
            let value = fields.number()?;
            let unit = fields.string()?;
            let unit = DurationUnit::parse(&unit).ok_or(DecodeError::UnknownUnit {
                kind: "duration",
                unit,
            })?;
            Value::Duration(Duration { value, unit })
        }
        code::DATA_SIZE => {
            let value = fields.number()?;
            let unit = fields.string()?;
            let unit = DataSizeUnit::parse(&unit).ok_or(DecodeError::UnknownUnit {
                kind: "data size",
                unit,
            })?;
            Value::DataSize(DataSize { value, unit })
        }
        code::PAIR => {
            let first = decode_value(fields.next()?)?;
            let second = decode_value(fields.next()?)?;
            Value::Pair(Box::new(Pair { first, second }))
        }
        code::INT_SEQ => Value::IntSeq(IntSeq {
            start: fields.int()?,
            end: fields.int()?,
            step: fields.int()?,
        }),
        code::REGEX => Value::Regex(Regex {
            pattern: fields.string()?,
        }),
        code::CLASS | code::TYPE_ALIAS => return Ok(Value::Placeholder),
        _ if code::is_member(tag) => {
            return Err(DecodeError::malformed(
                "value",
                format!("object member {tag:#x} outside an object"),
            ))
        }
        _ => return Err(DecodeError::UnknownCode(tag)),
    };
    Ok(value)
}

fn decode_object(fields: &mut Fields) -> Result<Value> {
    let class_name = fields.string()?;
    let module_uri = fields.string()?;
    let members = match fields.next()? {
        Raw::Array(members) => members,
        other => {
            return Err(DecodeError::malformed(
                "Object",
                format!("members must be an array, got {other}"),
            ))
        }
    };

    let dynamic = class_name == code::DYNAMIC_CLASS && module_uri == code::BASE_MODULE;
    let mut properties = Properties::new();
    let mut entries = ValueMap::new();
    let mut elements = Vec::new();

    for member in members {
        let member = match member {
            Raw::Array(parts) => parts,
            other => {
                return Err(DecodeError::malformed(
                    "object member",
                    format!("expected array, got {other}"),
                ))
            }
        };
        let mut parts = member.into_iter();
        let member_code = match parts.next() {
            Some(Raw::Integer(n)) => n.as_u64().unwrap_or(u64::MAX),
            _ => return Err(DecodeError::malformed("object member", "missing member tag")),
        };
        let mut member_fields = Fields {
            what: code::code_name(member_code),
            items: parts,
        };

        match u8::try_from(member_code).unwrap_or(u8::MAX) {
            code::MEMBER_PROPERTY => {
                let name = member_fields.string()?;
                let value = decode_value(member_fields.next()?)?;
                properties.insert(name, value);
            }
            code::MEMBER_ENTRY | code::MEMBER_ELEMENT if !dynamic => {
                return Err(DecodeError::UnexpectedMember {
                    code: member_code,
                    class: class_name,
                });
            }
            code::MEMBER_ENTRY => {
                let key = decode_value(member_fields.next()?)?;
                let value = decode_value(member_fields.next()?)?;
                entries.insert(key, value);
            }
            code::MEMBER_ELEMENT => {
                let index = match member_fields.next()? {
                    Raw::Integer(n) => n.as_u64().ok_or_else(|| {
                        DecodeError::malformed("ObjectMemberElement", "negative index")
                    })?,
                    other => {
                        return Err(DecodeError::malformed(
                            "ObjectMemberElement",
                            format!("index must be an integer, got {other}"),
                        ))
                    }
                };
                if index != elements.len() as u64 {
                    return Err(DecodeError::ElementIndex {
                        index,
                        expected: elements.len(),
                    });
                }
                elements.push(decode_value(member_fields.next()?)?);
            }
            _ => return Err(DecodeError::UnknownMemberCode(member_code)),
        }
    }

    if dynamic {
        Ok(Value::Dynamic(Dynamic {
            properties,
            entries,
            elements,
        }))
    } else {
        Ok(Value::Object(TypedObject {
            class_name,
            module_uri,
            properties,
        }))
    }
}

fn decode_map(raw: Raw) -> Result<ValueMap> {
    match raw {
        Raw::Map(pairs) => pairs
            .into_iter()
            .map(|(k, v)| Ok((decode_value(k)?, decode_value(v)?)))
            .collect(),
        other => Err(DecodeError::malformed(
            "Map",
            format!("expected map, got {other}"),
        )),
    }
}

fn decode_seq(raw: Raw) -> Result<Vec<Value>> {
    match raw {
        Raw::Array(items) => items.into_iter().map(decode_value).collect(),
        other => Err(DecodeError::malformed(
            "List",
            format!("expected array, got {other}"),
        )),
    }
}

/// Positional fields following a tag.
struct Fields {
    what: &'static str,
    items: std::vec::IntoIter<Raw>,
}

impl Fields {
    fn next(&mut self) -> Result<Raw> {
        self.items
            .next()
            .ok_or_else(|| DecodeError::malformed(self.what, "too few fields"))
    }

    fn string(&mut self) -> Result<String> {
        match self.next()? {
            Raw::String(s) => s
                .into_str()
                .ok_or_else(|| DecodeError::malformed(self.what, "invalid UTF-8")),
            other => Err(DecodeError::malformed(
                self.what,
                format!("expected string, got {other}"),
            )),
        }
    }

    fn int(&mut self) -> Result<i64> {
        match self.next()? {
            Raw::Integer(n) => integer(n),
            other => Err(DecodeError::malformed(
                self.what,
                format!("expected integer, got {other}"),
            )),
        }
    }

    fn number(&mut self) -> Result<f64> {
        match self.next()? {
            Raw::F64(f) => Ok(f),
            Raw::F32(f) => Ok(f64::from(f)),
            Raw::Integer(n) => Ok(integer(n)? as f64),
            other => Err(DecodeError::malformed(
                self.what,
                format!("expected number, got {other}"),
            )),
        }
    }
}
