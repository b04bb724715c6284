//! Parsing of `${key:=default}` property expressions

use crate::errors::ConfigError;

/// A parsed `${key:=default}` expression
///
/// The key part may list alternatives (`${a|b}`) - the first present key wins.
/// An empty key binds the entire current subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTag {
    pub keys: Vec<String>,
    pub default: Option<String>,
}

impl ValueTag {
    /// Parses a complete `${...}` tag
    ///
    /// Fails with [ConfigError::InvalidTag] if the braces are missing or the tag
    /// consists of more than one expression.
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        let tag = tag.trim();
        match find_expression(tag)? {
            Some((0, end)) if end == tag.len() - 1 => Self::parse_inner(tag, &tag[2..end]),
            _ => Err(ConfigError::tag(tag, "expected the form ${key:=default}")),
        }
    }

    pub(crate) fn parse_inner(tag: &str, inner: &str) -> Result<Self, ConfigError> {
        let (key_part, default) = match split_default(inner) {
            Some((key, default)) => (key, Some(default.to_string())),
            None => (inner, None),
        };

        let keys: Vec<String> = key_part.split('|').map(|k| k.trim().to_lowercase()).collect();
        if keys.len() > 1 && keys.iter().any(String::is_empty) {
            return Err(ConfigError::tag(tag, "empty key among alternatives"));
        }

        Ok(ValueTag { keys, default })
    }

    /// The first key of the tag
    pub fn key(&self) -> &str {
        self.keys.first().map(String::as_str).unwrap_or("")
    }

    /// True if the tag binds the current subtree (`${}` / `${:=...}`)
    pub fn is_root(&self) -> bool {
        self.keys.len() == 1 && self.keys[0].is_empty()
    }
}

/// Finds the first `${` in `text` and the index of its matching `}`
///
/// Nested expressions are skipped over, so the default of
/// `${a:=${b}}` is captured as a whole.
pub(crate) fn find_expression(text: &str) -> Result<Option<(usize, usize)>, ConfigError> {
    let Some(start) = text.find("${") else {
        return Ok(None);
    };

    let bytes = text.as_bytes();
    let mut depth = 1;
    let mut i = start + 2;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Ok(Some((start, i)));
            }
        }
        i += 1;
    }

    Err(ConfigError::tag(text, "unclosed ${"))
}

/// Splits `key:=default` on the first `:=` outside of nested expressions
fn split_default(inner: &str) -> Option<(&str, &str)> {
    let bytes = inner.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' => depth -= 1,
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                return Some((&inner[..i], &inner[i + 2..]));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Joins a binding prefix and a sub key with a `.`
pub fn join_key(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}.{key}"),
    }
}
