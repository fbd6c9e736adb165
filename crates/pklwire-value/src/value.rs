use std::fmt;

/// A decoded Pkl value.
///
/// `List` covers both `List` and `Listing`; `Map` covers both `Map` and
/// `Mapping`. Objects of class `pkl.base#Dynamic` keep all three member axes
/// in [`Dynamic`]; instances of any other class become [`TypedObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Pkl `Int` (64-bit signed).
    Int(i64),
    Float(f64),
    String(String),
    /// Raw binary passed through unchanged.
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Set semantics; element order is whatever the evaluator emitted.
    Set(Vec<Value>),
    Map(ValueMap),
    Dynamic(Dynamic),
    Object(TypedObject),
    Duration(Duration),
    DataSize(DataSize),
    IntSeq(IntSeq),
    Regex(Regex),
    Pair(Box<Pair>),
    /// Class and type alias values. Only their identity was sent, and it is not kept.
    Placeholder,
}

impl Value {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Dynamic(_) => "dynamic",
            Value::Object(_) => "object",
            Value::Duration(_) => "duration",
            Value::DataSize(_) => "data size",
            Value::IntSeq(_) => "int seq",
            Value::Regex(_) => "regex",
            Value::Pair(_) => "pair",
            Value::Placeholder => "placeholder",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_dynamic(&self) -> Option<&Dynamic> {
        match self {
            Value::Dynamic(dynamic) => Some(dynamic),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&TypedObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Named property of a typed or dynamic object.
    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(object) => object.properties.get(name),
            Value::Dynamic(dynamic) => dynamic.properties.get(name),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Insertion-ordered map with arbitrary value keys.
///
/// Keys are compared with `PartialEq`; inserting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the previous value for the key.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup by string key, the common case for `Mapping<String, _>`.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(Value, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for ValueMap {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Insertion-ordered, string-keyed object properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
    entries: Vec<(String, Value)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the previous value for the name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<N: Into<String>> FromIterator<(N, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (n, v) in iter {
            props.insert(n, v);
        }
        props
    }
}

/// `pkl.base#Dynamic`: properties, entries and elements populated independently.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dynamic {
    pub properties: Properties,
    pub entries: ValueMap,
    pub elements: Vec<Value>,
}

impl Dynamic {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn entry(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn element(&self, index: usize) -> Option<&Value> {
        self.elements.get(index)
    }
}

/// Instance of a named class; only declared properties are exposed.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedObject {
    /// Fully qualified class name as sent by the evaluator.
    pub class_name: String,
    /// URI of the module declaring the class.
    pub module_uri: String,
    pub properties: Properties,
}

impl TypedObject {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Unit of a [`Duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        Some(match unit {
            "ns" => Self::Nanoseconds,
            "us" => Self::Microseconds,
            "ms" => Self::Milliseconds,
            "s" => Self::Seconds,
            "min" => Self::Minutes,
            "h" => Self::Hours,
            "d" => Self::Days,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }

    fn nanos(self) -> f64 {
        match self {
            Self::Nanoseconds => 1.0,
            Self::Microseconds => 1e3,
            Self::Milliseconds => 1e6,
            Self::Seconds => 1e9,
            Self::Minutes => 60e9,
            Self::Hours => 3_600e9,
            Self::Days => 86_400e9,
        }
    }
}

/// `pkl.base#Duration`, e.g. `30.5.s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duration {
    pub value: f64,
    pub unit: DurationUnit,
}

impl Duration {
    /// Converts to a std duration; `None` for negative or non-finite values.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        let secs = self.value * self.unit.nanos() / 1e9;
        std::time::Duration::try_from_secs_f64(secs).ok()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.value, self.unit.as_str())
    }
}

/// Unit of a [`DataSize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSizeUnit {
    Bytes,
    Kilobytes,
    Kibibytes,
    Megabytes,
    Mebibytes,
    Gigabytes,
    Gibibytes,
    Terabytes,
    Tebibytes,
    Petabytes,
    Pebibytes,
}

impl DataSizeUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        Some(match unit {
            "b" => Self::Bytes,
            "kb" => Self::Kilobytes,
            "kib" => Self::Kibibytes,
            "mb" => Self::Megabytes,
            "mib" => Self::Mebibytes,
            "gb" => Self::Gigabytes,
            "gib" => Self::Gibibytes,
            "tb" => Self::Terabytes,
            "tib" => Self::Tebibytes,
            "pb" => Self::Petabytes,
            "pib" => Self::Pebibytes,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "b",
            Self::Kilobytes => "kb",
            Self::Kibibytes => "kib",
            Self::Megabytes => "mb",
            Self::Mebibytes => "mib",
            Self::Gigabytes => "gb",
            Self::Gibibytes => "gib",
            Self::Terabytes => "tb",
            Self::Tebibytes => "tib",
            Self::Petabytes => "pb",
            Self::Pebibytes => "pib",
        }
    }

    fn multiplier(self) -> f64 {
        match self {
            Self::Bytes => 1.0,
            Self::Kilobytes => 1e3,
            Self::Kibibytes => 1024.0,
            Self::Megabytes => 1e6,
            Self::Mebibytes => 1024.0 * 1024.0,
            Self::Gigabytes => 1e9,
            Self::Gibibytes => 1024.0 * 1024.0 * 1024.0,
            Self::Terabytes => 1e12,
            Self::Tebibytes => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            Self::Petabytes => 1e15,
            Self::Pebibytes => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        }
    }
}

/// `pkl.base#DataSize`, e.g. `30.5.mb`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataSize {
    pub value: f64,
    pub unit: DataSizeUnit,
}

impl DataSize {
    /// Size in bytes.
    pub fn bytes(&self) -> f64 {
        self.value * self.unit.multiplier()
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.value, self.unit.as_str())
    }
}

/// `pkl.base#IntSeq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntSeq {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

/// `pkl.base#Regex`. The pattern is kept as source text and never compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
}

/// `pkl.base#Pair`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub first: Value,
    pub second: Value,
}
