use crate::{properties::Properties, property::Property};

/// Properties set from code
pub const CODE_LAYER: &str = "code";
/// Properties passed on the command line
pub const COMMAND_LINE_LAYER: &str = "command-line";
/// Properties read from the environment
pub const ENVIRONMENT_LAYER: &str = "environment";
/// Properties of the active profile's file
pub const PROFILE_LAYER: &str = "profile";
/// Properties of the default file
pub const DEFAULT_LAYER: &str = "default";
/// Properties built into the application
pub const BUILTIN_LAYER: &str = "builtin";

/// A named [Properties] store inside [LayeredProperties]
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub properties: Properties,
}

/// A stack of property stores, queried head-first
///
/// The head has the highest priority. Writes through [LayeredProperties::set]
/// only touch the head.
#[derive(Debug, Clone, Default)]
pub struct LayeredProperties {
    layers: Vec<Layer>,
}

impl LayeredProperties {
    /// Creates an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard stack, highest priority first:
    /// code, command-line, environment, profile, default, builtin
    pub fn standard() -> Self {
        let mut layered = Self::new();
        for name in [
            CODE_LAYER,
            COMMAND_LINE_LAYER,
            ENVIRONMENT_LAYER,
            PROFILE_LAYER,
            DEFAULT_LAYER,
            BUILTIN_LAYER,
        ] {
            layered.push_back(name, Properties::new());
        }
        layered
    }

    /// Adds a layer with the highest priority
    pub fn push_front(&mut self, name: impl Into<String>, properties: Properties) {
        self.layers.insert(
            0,
            Layer {
                name: name.into(),
                properties,
            },
        );
    }

    /// Adds a layer with the lowest priority
    pub fn push_back(&mut self, name: impl Into<String>, properties: Properties) {
        self.layers.push(Layer {
            name: name.into(),
            properties,
        });
    }

    /// Splices a new layer in front of the layer named `anchor`
    ///
    /// Does nothing if there is no such layer.
    pub fn insert_before(&mut self, name: impl Into<String>, properties: Properties, anchor: &str) {
        let name = name.into();
        match self.layers.iter().position(|layer| layer.name == anchor) {
            Some(index) => self.layers.insert(index, Layer { name, properties }),
            None => tracing::debug!("No layer '{anchor}' to insert '{name}' before - ignored"),
        }
    }

    /// Number of layers
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// The first hit walking from the head
    ///
    /// Every key is looked up on its own, so a scalar in a higher layer does not
    /// hide a subtree below it. [LayeredProperties::merged] replaces the subtree
    /// and can answer differently for such keys.
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.layers.iter().find_map(|layer| layer.properties.get(key))
    }

    /// Like [LayeredProperties::get], falling back to `default`
    pub fn get_default<'a>(&'a self, key: &str, default: &'a Property) -> (&'a Property, bool) {
        match self.get(key) {
            Some(value) => (value, true),
            None => (default, false),
        }
    }

    /// Writes to the head layer, creating a `code` layer if the stack is empty
    pub fn set(&mut self, key: &str, value: impl Into<Property>) {
        if self.layers.is_empty() {
            self.push_front(CODE_LAYER, Properties::new());
        }
        self.layers[0].properties.set(key, value);
    }

    pub fn layer(&self, name: &str) -> Option<&Properties> {
        self.layers
            .iter()
            .find(|layer| layer.name == name)
            .map(|layer| &layer.properties)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Properties> {
        self.layers
            .iter_mut()
            .find(|layer| layer.name == name)
            .map(|layer| &mut layer.properties)
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Flattens the stack into a single store, higher layers win
    pub fn merged(&self) -> Properties {
        let mut merged = Properties::new();
        for layer in self.layers.iter().rev() {
            merged.overlay(&layer.properties);
        }
        merged
    }
}
