//! Gantry Config holds the properties of an application and binds them into typed values.
//!
//! Gantry Config is split into three major parts:
//! 1. Properties: a flat, case-insensitive store of dotted keys
//! 2. LayeredProperties: a stack of named stores where the head wins
//! 3. Binder: resolves `${key:=default}` tags and fills typed destinations
//!
//! # Examples
//!
//! ```rust
//! use gantry_config::{Binder, Converters, LayeredProperties, Properties, ENVIRONMENT_LAYER};
//!
//! let mut layers = LayeredProperties::standard();
//! layers.set("server.port", 9090);
//!
//! let mut env = Properties::new();
//! env.set("server.port", 8080);
//! env.set("server.name", "edge");
//! layers.layer_mut(ENVIRONMENT_LAYER).unwrap().overlay(&env);
//!
//! let properties = layers.merged();
//! let converters = Converters::new();
//! let binder = Binder::new(&properties, &converters);
//!
//! let port: u16 = binder.expression("${server.port}").unwrap();
//! let name: String = binder.expression("${server.name:=default}").unwrap();
//! let dir: String = binder.expression("${log.dir:=${app.dir:=./log}}").unwrap();
//!
//! assert_eq!(port, 9090);
//! assert_eq!(name, "edge");
//! assert_eq!(dir, "./log");
//! ```
//!
//! Gantry Config consists of the following components:
//!
//! 1. Property - scalar and compound property values
//! 2. Properties / LayeredProperties - storage, overlay and `${...}` resolution
//! 3. Bind / Binder / Converters - typed binding with user supplied converters
//! 4. Errors - for config errors

pub mod bind;
pub mod converter;
pub mod errors;
pub mod expr;
pub mod layered;
pub mod properties;
pub mod property;

/// A boxed error raised by user supplied code
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

pub use bind::{parse_duration, Bind, Binder, Shape};
pub use converter::Converters;
pub use errors::ConfigError;
pub use expr::{join_key, ValueTag};
pub use layered::{
    Layer, LayeredProperties, BUILTIN_LAYER, CODE_LAYER, COMMAND_LINE_LAYER, DEFAULT_LAYER,
    ENVIRONMENT_LAYER, PROFILE_LAYER,
};
pub use properties::Properties;
pub use property::Property;
