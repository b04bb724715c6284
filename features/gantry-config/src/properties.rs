use std::collections::{BTreeMap, BTreeSet};

use crate::{
    errors::ConfigError,
    expr::{find_expression, join_key, ValueTag},
    property::Property,
};

/// A flat store of lowercase dotted keys to scalar values
///
/// Sequences and mappings are flattened on insertion (`a.b=...`, `a[0]=...`).
/// Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: BTreeMap<String, Property>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from environment style variables
    ///
    /// `PREFIX_DB_URL=x` becomes `db.url=x`. With an empty prefix every
    /// variable is taken.
    pub fn from_env(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut properties = Self::new();
        let marker = format!("{prefix}_");
        for (name, value) in vars {
            let rest = if prefix.is_empty() {
                name.as_str()
            } else {
                match name.strip_prefix(&marker) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            if rest.is_empty() {
                continue;
            }
            properties.set(&rest.replace('_', "."), value);
        }
        properties
    }

    /// Stores a value under the lowercased key
    ///
    /// Compound values are flattened into subkeys; whatever was stored below the
    /// key before is replaced, so setting the same value twice is idempotent.
    pub fn set(&mut self, key: &str, value: impl Into<Property>) {
        let key = key.trim().to_lowercase();
        let value = value.into();
        if key.is_empty() && value.is_scalar() {
            tracing::warn!("Ignoring scalar property with an empty key: {value}");
            return;
        }

        self.remove_subtree(&key);
        self.insert_flattened(key, value);
    }

    fn insert_flattened(&mut self, key: String, value: Property) {
        match value {
            Property::List(items) if !items.is_empty() => {
                for (index, item) in items.into_iter().enumerate() {
                    self.insert_flattened(format!("{key}[{index}]"), item);
                }
            }
            Property::Map(entries) if !entries.is_empty() => {
                for (sub, item) in entries {
                    let sub = sub.trim().to_lowercase();
                    self.insert_flattened(join_key(&key, &sub), item);
                }
            }
            Property::List(_) | Property::Map(_) => {
                self.entries.insert(key, Property::Str(String::new()));
            }
            scalar => {
                self.entries.insert(key, scalar);
            }
        }
    }

    /// Removes the key and everything stored below it
    pub fn remove(&mut self, key: &str) {
        self.remove_subtree(&key.to_lowercase());
    }

    fn remove_subtree(&mut self, key: &str) {
        self.entries.retain(|k, _| !in_subtree(k, key));
    }

    /// Exact lookup
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.entries.get(&key.to_lowercase())
    }

    /// Returns the first present value of the given keys
    pub fn get_first(&self, keys: &[&str]) -> Option<&Property> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Exact lookup falling back to `default`, returns whether the key was present
    pub fn get_default<'a>(&'a self, key: &str, default: &'a Property) -> (&'a Property, bool) {
        match self.get(key) {
            Some(value) => (value, true),
            None => (default, false),
        }
    }

    /// True if the exact key is stored
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// True if the key is stored or has entries below it
    pub fn has(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.entries.keys().any(|k| in_subtree(k, &key))
    }

    /// All entries equal to `prefix` or below it, with their original keys
    pub fn prefix_map(&self, prefix: &str) -> BTreeMap<String, Property> {
        let prefix = prefix.to_lowercase();
        self.entries
            .iter()
            .filter(|(k, _)| in_subtree(k, &prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// All entries below `prefix` with the prefix stripped
    pub fn sub_map(&self, prefix: &str) -> BTreeMap<String, Property> {
        let prefix = prefix.to_lowercase();
        self.entries
            .iter()
            .filter_map(|(k, v)| {
                let rest = if prefix.is_empty() {
                    k.as_str()
                } else {
                    let rest = k.strip_prefix(&prefix)?;
                    rest.strip_prefix('.').or_else(|| rest.starts_with('[').then_some(rest))?
                };
                Some((rest.to_string(), v.clone()))
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lays `higher` over this store
    ///
    /// A key set in `higher` replaces the subtree stored here under that key, and
    /// a list in `higher` replaces the whole list here.
    pub fn overlay(&mut self, higher: &Properties) {
        let mut replaced = BTreeSet::new();
        for key in higher.entries.keys() {
            replaced.insert(key.clone());
            for (index, _) in key.match_indices('[') {
                replaced.insert(key[..index].to_string());
            }
        }
        self.entries
            .retain(|k, _| !replaced.iter().any(|r| in_subtree(k, r)));

        for (key, value) in &higher.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Expands every `${key:=default}` expression in `text`
    ///
    /// Referenced values are resolved recursively; a reference chain that leads
    /// back to a key already being expanded fails with [ConfigError::ReferenceCycle].
    pub fn resolve(&self, text: &str) -> Result<String, ConfigError> {
        self.resolve_with(text, &mut Vec::new())
    }

    fn resolve_with(&self, text: &str, visiting: &mut Vec<String>) -> Result<String, ConfigError> {
        let mut resolved = String::with_capacity(text.len());
        let mut rest = text;
        while let Some((start, end)) = find_expression(rest)? {
            resolved.push_str(&rest[..start]);
            let tag = ValueTag::parse_inner(&rest[start..=end], &rest[start + 2..end])?;
            resolved.push_str(&self.lookup(&tag, visiting)?);
            rest = &rest[end + 1..];
        }
        resolved.push_str(rest);
        Ok(resolved)
    }

    /// Resolves a parsed tag to text: first present key, else the default
    pub(crate) fn lookup_tag(&self, tag: &ValueTag) -> Result<String, ConfigError> {
        self.lookup(tag, &mut Vec::new())
    }

    fn lookup(&self, tag: &ValueTag, visiting: &mut Vec<String>) -> Result<String, ConfigError> {
        if tag.is_root() {
            return match &tag.default {
                Some(default) => self.resolve_with(default, visiting),
                None => Err(ConfigError::tag("${}", "an empty key has no scalar value")),
            };
        }

        for key in &tag.keys {
            let Some(value) = self.entries.get(key) else {
                continue;
            };
            if visiting.contains(key) {
                return Err(ConfigError::ReferenceCycle {
                    key: key.clone(),
                    chain: visiting.clone(),
                });
            }
            let text = value.as_text().unwrap_or_default();
            visiting.push(key.clone());
            let resolved = self.resolve_with(&text, visiting);
            visiting.pop();
            return resolved;
        }

        match &tag.default {
            Some(default) => self.resolve_with(default, visiting),
            None => Err(ConfigError::missing(tag.key())),
        }
    }
}

/// True if `key` equals `root` or lies below it
fn in_subtree(key: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    match key.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}
