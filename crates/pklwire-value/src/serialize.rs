//! `serde::Serialize` for [`Value`], enabled by the `serde` feature.
//!
//! Objects serialize as maps of their properties. A dynamic object that only
//! has elements serializes as a sequence; otherwise its entries and elements
//! are appended to the property map, elements keyed by index.

use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::value::{DataSize, Duration, Dynamic, IntSeq, Properties, Value};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Placeholder => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(items) | Value::Set(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map.iter()),
            Value::Dynamic(dynamic) => serialize_dynamic(dynamic, serializer),
            Value::Object(object) => serialize_properties(&object.properties, serializer),
            Value::Duration(d) => d.serialize(serializer),
            Value::DataSize(d) => d.serialize(serializer),
            Value::IntSeq(s) => s.serialize(serializer),
            Value::Regex(r) => serializer.serialize_str(&r.pattern),
            Value::Pair(pair) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&pair.first)?;
                seq.serialize_element(&pair.second)?;
                seq.end()
            }
        }
    }
}

fn serialize_properties<S: Serializer>(
    props: &Properties,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(props.iter())
}

fn serialize_dynamic<S: Serializer>(dynamic: &Dynamic, serializer: S) -> Result<S::Ok, S::Error> {
    if dynamic.properties.is_empty() && dynamic.entries.is_empty() && !dynamic.elements.is_empty()
    {
        return serializer.collect_seq(&dynamic.elements);
    }
    let len = dynamic.properties.len() + dynamic.entries.len() + dynamic.elements.len();
    let mut map = serializer.serialize_map(Some(len))?;
    for (name, value) in dynamic.properties.iter() {
        map.serialize_entry(name, value)?;
    }
    for (key, value) in dynamic.entries.iter() {
        map.serialize_entry(key, value)?;
    }
    for (index, value) in dynamic.elements.iter().enumerate() {
        map.serialize_entry(&(index as u64), value)?;
    }
    map.end()
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Duration", 2)?;
        s.serialize_field("value", &self.value)?;
        s.serialize_field("unit", self.unit.as_str())?;
        s.end()
    }
}

impl Serialize for DataSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DataSize", 2)?;
        s.serialize_field("value", &self.value)?;
        s.serialize_field("unit", self.unit.as_str())?;
        s.end()
    }
}

impl Serialize for IntSeq {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("IntSeq", 3)?;
        s.serialize_field("start", &self.start)?;
        s.serialize_field("end", &self.end)?;
        s.serialize_field("step", &self.step)?;
        s.end()
    }
}
