use std::fmt::Display;

use crate::{definition::BeanId, types::TypeInfo};

/// Picks zero or more beans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A bean tag, `type_name:name?` or `[a, *]?`
    Tag(String),
    /// Every bean of, or exporting, the type
    Type(TypeInfo),
    /// One specific registered bean
    Bean(BeanId),
}

impl Selector {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Selector::Type(TypeInfo::of::<T>())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Selector::Tag(name.into())
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Tag(tag) => f.write_str(tag),
            Selector::Type(info) => write!(f, "{info}"),
            Selector::Bean(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(tag: &str) -> Self {
        Selector::Tag(tag.to_string())
    }
}

impl From<String> for Selector {
    fn from(tag: String) -> Self {
        Selector::Tag(tag)
    }
}

impl From<TypeInfo> for Selector {
    fn from(info: TypeInfo) -> Self {
        Selector::Type(info)
    }
}

impl From<BeanId> for Selector {
    fn from(id: BeanId) -> Self {
        Selector::Bean(id)
    }
}
