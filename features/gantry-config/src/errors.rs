/// Errors when reading, resolving or binding properties
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required property is absent and no default was given
    #[error("Property '{key}' is missing and has no default")]
    PropertyMissing { key: String },

    /// The property exists but cannot be coerced into the destination type
    #[error("Property '{key}' cannot be bound as '{expected}' - value: {actual:?}")]
    PropertyTypeMismatch {
        key: String,
        expected: &'static str,
        actual: String,
    },

    /// The property tree does not fit the shape of the destination
    #[error("Property '{key}' does not fit the destination: {reason}")]
    BindSchema { key: String, reason: String },

    /// A `${...}` expression or bean tag is malformed
    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// A chain of `${...}` references leads back to itself
    #[error("Property '{key}' references itself through {chain:?}")]
    ReferenceCycle { key: String, chain: Vec<String> },
}

impl ConfigError {
    pub(crate) fn missing(key: impl Into<String>) -> Self {
        Self::PropertyMissing { key: key.into() }
    }

    pub(crate) fn mismatch<T: ?Sized>(key: &str, actual: impl Into<String>) -> Self {
        Self::PropertyTypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
            actual: actual.into(),
        }
    }

    pub(crate) fn schema(key: &str, reason: impl Into<String>) -> Self {
        Self::BindSchema {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn tag(tag: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}
