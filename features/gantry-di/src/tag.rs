//! Bean tags: `type_name:name?` for single beans, `[a, *, b]?` for collections

use std::fmt::Display;

use gantry_config::ConfigError;

use crate::types::short_type_name;

/// Selects a single bean by type name and name
///
/// Both parts may be empty, an empty part matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SingletonTag {
    pub type_name: String,
    pub name: String,
    pub nullable: bool,
}

impl SingletonTag {
    /// Parses `name`, `:name`, `type_name:name` or `type_name:`, each with an optional trailing `?`
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        let trimmed = tag.trim();
        let (body, nullable) = match trimmed.strip_suffix('?') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        if body.contains(['[', ']', '?']) {
            return Err(invalid(tag, "unexpected character in a single bean tag"));
        }

        let (type_name, name) = match name_separator(body) {
            Some(index) => (&body[..index], &body[index + 1..]),
            None => ("", body),
        };
        Ok(SingletonTag {
            type_name: type_name.trim().to_string(),
            name: name.trim().to_string(),
            nullable,
        })
    }

    /// True if the tag places no constraint
    pub fn is_wildcard(&self) -> bool {
        self.type_name.is_empty() && self.name.is_empty()
    }

    /// Matches a bean with the given name and one of the given type names
    pub(crate) fn matches<'a>(
        &self,
        name: &str,
        mut type_names: impl Iterator<Item = &'a str>,
    ) -> bool {
        if !self.name.is_empty() && self.name != name {
            return false;
        }
        self.type_name.is_empty() || type_names.any(|full| type_name_matches(full, &self.type_name))
    }
}

impl Display for SingletonTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.type_name.is_empty() {
            write!(f, "{}:", self.type_name)?;
        }
        f.write_str(&self.name)?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// One entry of a collection tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagItem {
    /// `*` - all candidates not picked by another entry
    Wildcard,
    Bean(SingletonTag),
}

/// Selects an ordered list of beans
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeanTag {
    pub items: Vec<TagItem>,
    pub nullable: bool,
}

impl BeanTag {
    /// Parses `[a, *, b]?`; an empty tag means `[]`
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Ok(BeanTag::default());
        }
        let (body, nullable) = match trimmed.strip_suffix('?') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        let Some(inner) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) else {
            return Err(invalid(tag, "a collection tag must be enclosed in []"));
        };

        let mut items = Vec::new();
        if !inner.trim().is_empty() {
            for item in split_items(inner) {
                let item = item.trim();
                match item {
                    "" => return Err(invalid(tag, "empty entry")),
                    "*" if items.contains(&TagItem::Wildcard) => {
                        return Err(invalid(tag, "more than one wildcard"))
                    }
                    "*" => items.push(TagItem::Wildcard),
                    item => items.push(TagItem::Bean(SingletonTag::parse(item)?)),
                }
            }
        }
        Ok(BeanTag { items, nullable })
    }

    /// True if the tag has no entries (`[]` / `[]?`)
    pub fn is_unordered(&self) -> bool {
        self.items.is_empty()
    }
}

impl Display for BeanTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items: Vec<String> = self
            .items
            .iter()
            .map(|item| match item {
                TagItem::Wildcard => "*".to_string(),
                TagItem::Bean(tag) => tag.to_string(),
            })
            .collect();
        write!(f, "[{}]", items.join(","))?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// True if the tag text denotes a collection
pub fn is_collection_tag(tag: &str) -> bool {
    tag.trim_start().starts_with('[')
}

/// True if `pattern` names the type `full`: the full name, a `::` suffix of it
/// or the name without module paths
pub(crate) fn type_name_matches(full: &str, pattern: &str) -> bool {
    if full == pattern {
        return true;
    }
    if let Some(head) = full.strip_suffix(pattern) {
        if head.ends_with("::") {
            return true;
        }
    }
    short_type_name(full) == pattern
}

/// The last `:` which is not part of a `::` path separator
fn name_separator(tag: &str) -> Option<usize> {
    let bytes = tag.as_bytes();
    (0..bytes.len()).rev().find(|&i| {
        bytes[i] == b':'
            && (i == 0 || bytes[i - 1] != b':')
            && bytes.get(i + 1).map_or(true, |next| *next != b':')
    })
}

/// Splits on commas outside of generic brackets
fn split_items(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&inner[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    items
}

fn invalid(tag: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.to_string(),
    }
}
