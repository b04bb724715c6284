use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

/// An untyped property value as produced by an external loader
///
/// Sequences and mappings are flattened into dotted / indexed keys when they are
/// stored in [crate::Properties], so only scalars (and `Null`) live in a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Property>),
    Map(Vec<(String, Property)>),
}

impl Property {
    /// Returns true for the scalar variants - including `Null`
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Property::List(_) | Property::Map(_))
    }

    /// Returns the textual form of a scalar
    ///
    /// `Null` renders as an empty string, compounds return `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Property::Null => Some(String::new()),
            Property::Bool(b) => Some(b.to_string()),
            Property::Int(i) => Some(i.to_string()),
            Property::Float(f) => Some(f.to_string()),
            Property::Str(s) => Some(s.clone()),
            Property::List(_) | Property::Map(_) => None,
        }
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Property::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Property::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
            scalar => f.write_str(&scalar.as_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::Str(value.to_string())
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Property::Str(value)
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Bool(value)
    }
}

macro_rules! property_from_int {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Property {
                fn from(value: $int) -> Self {
                    Property::Int(value as i64)
                }
            }
        )*
    };
}
property_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Property {
    fn from(value: f32) -> Self {
        Property::Float(value as f64)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Float(value)
    }
}

impl<T: Into<Property>> From<Option<T>> for Property {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Property::Null)
    }
}

impl<T: Into<Property>> From<Vec<T>> for Property {
    fn from(value: Vec<T>) -> Self {
        Property::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, T: Into<Property>> From<BTreeMap<K, T>> for Property {
    fn from(value: BTreeMap<K, T>) -> Self {
        Property::Map(value.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, T: Into<Property>> From<HashMap<K, T>> for Property {
    fn from(value: HashMap<K, T>) -> Self {
        Property::Map(value.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
