//! Gantry DI is an application container: register beans, refresh once, then use them.
//!
//! A container goes through three phases:
//! 1. Building: beans, factories, configurers and properties are registered
//! 2. Refresh: conditions are evaluated, configurers run and every bean is wired
//! 3. Running: beans are looked up, tasks scheduled and finally the container closed
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use gantry_di::{on_property, Autowired, Bean, DiContainer, Fields, Value};
//!
//! trait Store: Send + Sync {
//!     fn url(&self) -> String;
//! }
//!
//! struct Postgres {
//!     url: Value<String>,
//! }
//!
//! impl Store for Postgres {
//!     fn url(&self) -> String {
//!         self.url.to_string()
//!     }
//! }
//!
//! impl Bean for Postgres {
//!     fn describe(&self, fields: &mut Fields<'_>) {
//!         fields.value("url", "${db.url:=postgres://localhost}", &self.url);
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Service {
//!     store: Autowired<dyn Store>,
//! }
//!
//! impl Bean for Service {
//!     fn describe(&self, fields: &mut Fields<'_>) {
//!         fields.autowire("store", "", &self.store);
//!     }
//! }
//!
//! let mut container = DiContainer::new();
//! container.property("db.url", "postgres://db:5432").unwrap();
//! container
//!     .factory(|| Postgres { url: Value::unset() })
//!     .unwrap()
//!     .export(|postgres| postgres as Arc<dyn Store>);
//! container
//!     .object(Service::default())
//!     .unwrap()
//!     .condition(on_property("service.enabled").match_if_missing());
//! container.refresh().unwrap();
//!
//! let service = container.get::<Service>().unwrap().unwrap();
//! assert_eq!(service.store.url(), "postgres://db:5432");
//! container.close();
//! ```
//!
//! Gantry DI consists of the following components:
//!
//! 1. Container - registration, refresh and the runtime surface
//! 2. Definitions / Conditions - what is registered and when it takes part
//! 3. Registry / Initiator - selection of candidates and the wiring of beans
//! 4. Fields / Resolvers / Factories - how fields and parameters are injected
//! 5. Lifecycle - configurer order, scheduled tasks and destroy order
//! 6. Errors - for container errors

pub mod condition;
pub mod configurer;
pub mod container;
pub mod definition;
mod dependency_graph;
pub mod errors;
pub mod factories;
pub mod fields;
mod initiator;
pub mod lifecycle;
mod registry;
pub mod resolver;
pub mod selector;
pub mod tag;
pub mod types;

pub use condition::{
    and, none_of, not, on_bean, on_matches, on_missing_bean, on_missing_property, on_profile,
    on_property, on_single_bean, or, Condition, ConditionContext, ConditionExt, ACTIVE_PROFILES,
};
pub use configurer::ConfigurerRef;
pub use container::DiContainer;
pub use definition::{BeanId, BeanInfo, BeanRef};
pub use errors::ContainerError;
pub use factories::{HookOutput, Injector, IntoBean, Method};
pub use fields::{Autowired, Bean, BeanList, Beans, Exports, Fields, Value};
pub use lifecycle::ProcessContext;
pub use resolver::{value::Variadic, Arg, ArgContext, ArgQueue, OptionArg, Resolver};
pub use selector::Selector;
pub use tag::{BeanTag, SingletonTag};
pub use types::{DynError, Injectable, Shared, TypeInfo};

/// A deferred, conditional contribution to a [Variadic] parameter
///
/// The function runs while the outer factory's arguments are resolved, its
/// return value becomes one element of the variadic parameter.
///
/// ```rust
/// use std::sync::Arc;
/// use gantry_di::{on_property, option, Arg, Bean, DiContainer, Variadic};
///
/// struct Server {
///     middleware: Vec<Arc<str>>,
/// }
/// impl Bean for Server {}
///
/// let mut container = DiContainer::new();
/// container.property("tracing.enabled", true).unwrap();
/// container
///     .factory(|middleware: Variadic<Arc<str>>| Server {
///         middleware: middleware.into_inner(),
///     })
///     .unwrap()
///     .args([
///         Arg::literal(Arc::<str>::from("auth")),
///         option(|| Arc::<str>::from("tracing"))
///             .on(on_property("tracing.enabled"))
///             .into(),
///         option(|| Arc::<str>::from("metrics"))
///             .on(on_property("metrics.enabled"))
///             .into(),
///     ]);
/// container.refresh().unwrap();
///
/// let server = container.get::<Server>().unwrap().unwrap();
/// let names: Vec<&str> = server.middleware.iter().map(|name| &**name).collect();
/// assert_eq!(names, ["auth", "tracing"]);
/// ```
pub fn option<Args, F>(function: F) -> OptionArg
where
    Args: 'static,
    F: Injector<Args>,
    F::Output: Injectable,
{
    OptionArg {
        condition: None,
        call: factories::option_fn::<Args, F>(function),
        args: Vec::new(),
        parameters: F::parameters(),
        output: std::any::type_name::<F::Output>(),
    }
}
