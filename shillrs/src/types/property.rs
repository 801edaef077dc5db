//! Property values exchanged with shill.
//!
//! Shill publishes every object as a dictionary of variants. Handlers work on
//! [`PropertyMap`], a plain Rust view of that dictionary; conversion to and
//! from `zvariant` happens only at the D-Bus boundary.

use std::collections::HashMap;

use zvariant::Value;

/// A property dictionary keyed by shill property name.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// A single shill property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    StrList(Vec<String>),
    Dict(PropertyMap),
}

impl PropertyValue {
    /// Returns the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the list payload. Shill sends object-path arrays for the
    /// Manager lists, which arrive here as string lists too.
    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            Self::StrList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PropertyMap> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into a `zvariant::Value` suitable for `SetProperty`.
    pub(crate) fn to_variant(&self) -> Value<'static> {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => match i32::try_from(*i) {
                Ok(small) => Value::from(small),
                Err(_) => Value::from(*i),
            },
            Self::Double(d) => Value::from(*d),
            Self::Str(s) => Value::from(s.clone()),
            Self::StrList(list) => Value::from(list.clone()),
            Self::Dict(map) => {
                let dict: HashMap<String, Value<'static>> = map
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_variant()))
                    .collect();
                Value::from(dict)
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrList(value)
    }
}

impl From<&[&str]> for PropertyValue {
    fn from(value: &[&str]) -> Self {
        Self::StrList(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(value: PropertyMap) -> Self {
        Self::Dict(value)
    }
}

impl TryFrom<&Value<'_>> for PropertyValue {
    type Error = zvariant::Error;

    fn try_from(value: &Value<'_>) -> Result<Self, Self::Error> {
        let converted = match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::U8(v) => Self::Int(i64::from(*v)),
            Value::I16(v) => Self::Int(i64::from(*v)),
            Value::U16(v) => Self::Int(i64::from(*v)),
            Value::I32(v) => Self::Int(i64::from(*v)),
            Value::U32(v) => Self::Int(i64::from(*v)),
            Value::I64(v) => Self::Int(*v),
            Value::U64(v) => Self::Int(i64::try_from(*v).unwrap_or(i64::MAX)),
            Value::F64(v) => Self::Double(*v),
            Value::Str(s) => Self::Str(s.to_string()),
            Value::ObjectPath(p) => Self::Str(p.to_string()),
            Value::Value(inner) => Self::try_from(&**inner)?,
            Value::Array(array) => {
                let mut items = Vec::new();
                for item in array.iter() {
                    match item {
                        Value::Str(s) => items.push(s.to_string()),
                        Value::ObjectPath(p) => items.push(p.to_string()),
                        _ => return Err(zvariant::Error::IncorrectType),
                    }
                }
                Self::StrList(items)
            }
            Value::Dict(dict) => {
                let mut map = PropertyMap::new();
                for (key, entry) in dict.iter() {
                    let Value::Str(key) = key else {
                        return Err(zvariant::Error::IncorrectType);
                    };
                    map.insert(key.to_string(), Self::try_from(entry)?);
                }
                Self::Dict(map)
            }
            _ => return Err(zvariant::Error::IncorrectType),
        };
        Ok(converted)
    }
}

/// Typed lookups on a [`PropertyMap`].
///
/// A key holding a value of the wrong type reads the same as a missing key.
pub trait PropertyMapExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_str_list(&self, key: &str) -> Option<&[String]>;
    fn get_dict(&self, key: &str) -> Option<&PropertyMap>;

    /// Returns the string at `key`, or `""` when absent.
    fn str_or_empty(&self, key: &str) -> &str {
        self.get_str(key).unwrap_or_default()
    }
}

impl PropertyMapExt for PropertyMap {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropertyValue::as_bool)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_int)
    }

    fn get_str_list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(PropertyValue::as_str_list)
    }

    fn get_dict(&self, key: &str) -> Option<&PropertyMap> {
        self.get(key).and_then(PropertyValue::as_dict)
    }
}

/// Builds a [`PropertyMap`] from `(key, value)` pairs.
pub fn property_map<I, K, V>(entries: I) -> PropertyMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
