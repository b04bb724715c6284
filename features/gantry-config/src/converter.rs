use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use crate::{errors::ConfigError, DynError};

type ConvertFn = Arc<dyn Fn(&str) -> Result<Box<dyn Any + Send + Sync>, DynError> + Send + Sync>;

/// Registry of string to value converters, keyed by the produced type
///
/// The binder consults the registry before it looks at the shape of the
/// destination, so a converter overrides the built-in binding of its type.
#[derive(Clone, Default)]
pub struct Converters {
    converters: HashMap<TypeId, (&'static str, ConvertFn)>,
}

impl Debug for Converters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.converters.values().map(|(name, _)| name))
            .finish()
    }
}

impl Converters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter, replacing any earlier one for the same type
    pub fn add<T, E, F>(&mut self, convert: F)
    where
        T: Send + Sync + 'static,
        E: Into<DynError>,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    {
        let erased: ConvertFn = Arc::new(move |text| {
            convert(text)
                .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
                .map_err(Into::into)
        });
        if self
            .converters
            .insert(TypeId::of::<T>(), (type_name::<T>(), erased))
            .is_some()
        {
            tracing::debug!("Replaced converter for {}", type_name::<T>());
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    /// Converts `text` if a converter for `T` is registered
    pub(crate) fn convert<T: 'static>(&self, key: &str, text: &str) -> Option<Result<T, ConfigError>> {
        let (_, convert) = self.converters.get(&TypeId::of::<T>())?;
        let converted = match convert(text) {
            Ok(value) => value
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| ConfigError::mismatch::<T>(key, text)),
            Err(error) => {
                tracing::debug!("Converter for {} rejected '{text}': {error}", type_name::<T>());
                Err(ConfigError::mismatch::<T>(key, text))
            }
        };
        Some(converted)
    }
}
