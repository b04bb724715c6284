//! Binding of property subtrees into typed destinations
//!
//! [Bind] is implemented for scalars, `Vec`, string keyed maps, `Option` and
//! `Duration`. Configuration structs implement it by binding each field through
//! [Binder::field]:
//!
//! ```rust
//! use gantry_config::{Bind, Binder, ConfigError, Properties, Converters};
//!
//! struct Pool {
//!     url: String,
//!     size: u16,
//! }
//!
//! impl Bind for Pool {
//!     fn bind(binder: &Binder<'_>, key: &str, _default: Option<&str>) -> Result<Self, ConfigError> {
//!         Ok(Pool {
//!             url: binder.field(key, "${url}")?,
//!             size: binder.field(key, "${size:=4}")?,
//!         })
//!     }
//! }
//!
//! let mut properties = Properties::new();
//! properties.set("db.url", "pg://localhost");
//! let converters = Converters::new();
//!
//! let pool: Pool = Binder::new(&properties, &converters).bind("db", None).unwrap();
//! assert_eq!(pool.size, 4);
//! ```

use std::{
    any::type_name,
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Duration,
};

use crate::{
    converter::Converters,
    errors::ConfigError,
    expr::{join_key, ValueTag},
    properties::Properties,
};

/// The shape of a binding destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    List,
    Map,
    Struct,
}

/// A type which can be filled from a property subtree
pub trait Bind: Sized + Send + Sync + 'static {
    fn shape() -> Shape {
        Shape::Struct
    }

    /// Binds the subtree rooted at `key`
    ///
    /// `default` is the unresolved default of the tag that led here, if any.
    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError>;

    /// Builds a value from a single piece of text, e.g. one element of `a,b,c`
    fn from_text(key: &str, text: &str) -> Result<Self, ConfigError> {
        let _ = text;
        Err(ConfigError::schema(
            key,
            format!("'{}' cannot be bound from a single value", type_name::<Self>()),
        ))
    }
}

/// Binds values out of a [Properties] snapshot
#[derive(Debug, Clone, Copy)]
pub struct Binder<'a> {
    properties: &'a Properties,
    converters: &'a Converters,
}

impl<'a> Binder<'a> {
    pub fn new(properties: &'a Properties, converters: &'a Converters) -> Self {
        Self {
            properties,
            converters,
        }
    }

    pub fn properties(&self) -> &'a Properties {
        self.properties
    }

    /// Binds the subtree at `key`, preferring a registered converter for `T`
    pub fn bind<T: Bind>(&self, key: &str, default: Option<&str>) -> Result<T, ConfigError> {
        let key = key.to_lowercase();
        if self.converters.contains::<T>() {
            let text = self.text(&key, default)?;
            return self.bind_text(&key, &text);
        }
        T::bind(self, &key, default)
    }

    /// Builds a `T` from text, preferring a registered converter for `T`
    pub fn bind_text<T: Bind>(&self, key: &str, text: &str) -> Result<T, ConfigError> {
        match self.converters.convert::<T>(key, text) {
            Some(converted) => converted,
            None => T::from_text(key, text),
        }
    }

    /// Binds a field through its `${subkey:=default}` tag, relative to `prefix`
    pub fn field<T: Bind>(&self, prefix: &str, tag: &str) -> Result<T, ConfigError> {
        let tag = ValueTag::parse(tag)?;
        let key = self.select_key(prefix, &tag);
        self.bind(&key, tag.default.as_deref())
    }

    /// Binds a standalone `${key:=default}` expression
    pub fn expression<T: Bind>(&self, tag: &str) -> Result<T, ConfigError> {
        self.field("", tag)
    }

    fn select_key(&self, prefix: &str, tag: &ValueTag) -> String {
        if tag.is_root() {
            return prefix.to_string();
        }
        tag.keys
            .iter()
            .map(|key| join_key(prefix, key))
            .find(|key| self.properties.has(key))
            .unwrap_or_else(|| join_key(prefix, tag.key()))
    }

    /// The resolved text stored at `key`, else the resolved default
    pub fn text(&self, key: &str, default: Option<&str>) -> Result<String, ConfigError> {
        if let Some(value) = self.properties.get(key) {
            let raw = value.as_text().unwrap_or_default();
            return self.properties.resolve(&raw);
        }
        if self.properties.has(key) {
            return Err(ConfigError::schema(key, "expected a single value, found a subtree"));
        }
        match default {
            Some(default) => self.properties.resolve(default),
            None => Err(ConfigError::missing(key)),
        }
    }

    /// Resolves a parsed tag against the snapshot
    pub fn lookup(&self, tag: &ValueTag) -> Result<String, ConfigError> {
        self.properties.lookup_tag(tag)
    }
}

macro_rules! bind_parsed {
    ($($ty:ty),*) => {
        $(
            impl Bind for $ty {
                fn shape() -> Shape {
                    Shape::Scalar
                }

                fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
                    let text = binder.text(key, default)?;
                    Self::from_text(key, &text)
                }

                fn from_text(key: &str, text: &str) -> Result<Self, ConfigError> {
                    text.trim()
                        .parse::<$ty>()
                        .map_err(|_| ConfigError::mismatch::<$ty>(key, text))
                }
            }
        )*
    };
}
bind_parsed!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char);

impl Bind for bool {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        let text = binder.text(key, default)?;
        Self::from_text(key, &text)
    }

    fn from_text(key: &str, text: &str) -> Result<Self, ConfigError> {
        match text.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(ConfigError::mismatch::<bool>(key, text)),
        }
    }
}

impl Bind for String {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        binder.text(key, default)
    }

    fn from_text(_key: &str, text: &str) -> Result<Self, ConfigError> {
        Ok(text.to_string())
    }
}

impl Bind for Duration {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        let text = binder.text(key, default)?;
        Self::from_text(key, &text)
    }

    fn from_text(key: &str, text: &str) -> Result<Self, ConfigError> {
        parse_duration(text).ok_or_else(|| ConfigError::mismatch::<Duration>(key, text))
    }
}

/// Parses durations such as `1h30m`, `250ms` or `1.5s`
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text == "0" {
        return Some(Duration::ZERO);
    }
    if text.is_empty() {
        return None;
    }

    let mut seconds = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        seconds += number * scale;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(seconds).ok()
}

impl<T: Bind> Bind for Vec<T> {
    fn shape() -> Shape {
        Shape::List
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        let properties = binder.properties();

        // `key=a,b,c`
        if properties.contains(key) {
            let text = binder.text(key, None)?;
            return split_text(binder, key, &text);
        }

        // `key[0]=a`, `key[1]=b`, ...
        if properties.has(&format!("{key}[0]")) {
            let mut items = Vec::new();
            loop {
                let element = format!("{key}[{}]", items.len());
                if !properties.has(&element) {
                    break;
                }
                items.push(binder.bind::<T>(&element, None)?);
            }
            return Ok(items);
        }

        if properties.has(key) {
            return Err(ConfigError::schema(key, "expected a list, found a mapping"));
        }

        match default {
            Some(default) => split_text(binder, key, &properties.resolve(default)?),
            None => Err(ConfigError::missing(key)),
        }
    }
}

fn split_text<T: Bind>(binder: &Binder<'_>, key: &str, text: &str) -> Result<Vec<T>, ConfigError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .enumerate()
        .map(|(index, piece)| binder.bind_text::<T>(&format!("{key}[{index}]"), piece.trim()))
        .collect()
}

/// Binds every entry below `key`, grouped by their next path segment
fn bind_entries<T: Bind>(
    binder: &Binder<'_>,
    key: &str,
    default: Option<&str>,
) -> Result<Vec<(String, T)>, ConfigError> {
    let properties = binder.properties();
    let entries = properties.sub_map(key);

    if entries.is_empty() {
        if properties.contains(key) {
            let text = binder.text(key, None)?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(ConfigError::schema(key, "expected a mapping, found a single value"));
        }
        return match default {
            Some(default) if properties.resolve(default)?.trim().is_empty() => Ok(Vec::new()),
            Some(_) => Err(ConfigError::schema(key, "the default of a mapping must be empty")),
            None => Err(ConfigError::missing(key)),
        };
    }

    let mut groups = BTreeSet::new();
    for sub in entries.keys() {
        if sub.starts_with('[') {
            return Err(ConfigError::schema(key, "mapping keys must be strings, found a list"));
        }
        let end = sub.find(|c: char| c == '.' || c == '[').unwrap_or(sub.len());
        if T::shape() == Shape::Scalar && end != sub.len() {
            continue;
        }
        groups.insert(sub[..end].to_string());
    }

    groups
        .into_iter()
        .map(|name| {
            let value = binder.bind::<T>(&join_key(key, &name), None)?;
            Ok((name, value))
        })
        .collect()
}

impl<T: Bind> Bind for HashMap<String, T> {
    fn shape() -> Shape {
        Shape::Map
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        Ok(bind_entries(binder, key, default)?.into_iter().collect())
    }
}

impl<T: Bind> Bind for BTreeMap<String, T> {
    fn shape() -> Shape {
        Shape::Map
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        Ok(bind_entries(binder, key, default)?.into_iter().collect())
    }
}

impl<T: Bind> Bind for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn bind(binder: &Binder<'_>, key: &str, default: Option<&str>) -> Result<Self, ConfigError> {
        if default.is_none() && !binder.properties().has(key) {
            return Ok(None);
        }
        binder.bind::<T>(key, default).map(Some)
    }

    fn from_text(key: &str, text: &str) -> Result<Self, ConfigError> {
        T::from_text(key, text).map(Some)
    }
}
