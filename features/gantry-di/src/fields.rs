//! The [Bean] capability protocol and the field cells filled during wiring
//!
//! A bean declares its injectable fields in [Bean::describe]. The container
//! walks that description once, right after the bean has been constructed:
//!
//! ```rust
//! use std::sync::Arc;
//! use gantry_di::{Autowired, Bean, Beans, Fields, Value};
//!
//! trait Store: Send + Sync {}
//!
//! #[derive(Default)]
//! struct Service {
//!     port: Value<u16>,
//!     store: Autowired<dyn Store>,
//!     plugins: Beans<dyn Store>,
//! }
//!
//! impl Bean for Service {
//!     fn describe(&self, fields: &mut Fields<'_>) {
//!         fields
//!             .value("port", "${server.port:=8080}", &self.port)
//!             .autowire("store", "primary?", &self.store)
//!             .collect("plugins", "[]?", &self.plugins);
//!     }
//! }
//! ```

use std::{
    any::type_name,
    fmt::Debug,
    marker::PhantomData,
    ops::Deref,
    sync::{Arc, OnceLock},
};

use gantry_config::{join_key, Bind, Binder, ConfigError};

use crate::{
    errors::ContainerError,
    types::{downcast, Injectable, Shared, TypeInfo},
};

/// A component managed by the container
pub trait Bean: Injectable {
    /// Declares the fields the container fills after construction
    fn describe(&self, fields: &mut Fields<'_>) {
        let _ = fields;
    }

    /// Declares the interfaces the bean is additionally indexed under
    fn exports(exports: &mut Exports<Self>)
    where
        Self: Sized,
    {
        let _ = exports;
    }
}

/// Receiver of the field declarations of a bean
pub(crate) trait FieldSink {
    fn bind(
        &mut self,
        field: &str,
        bind: &mut dyn FnMut(&Binder<'_>) -> Result<(), ConfigError>,
    ) -> Result<(), ContainerError>;

    fn singleton(
        &mut self,
        field: &str,
        tag: &str,
        ty: TypeInfo,
    ) -> Result<Option<Shared>, ContainerError>;

    fn collection(&mut self, field: &str, tag: &str, ty: TypeInfo)
        -> Result<Vec<Shared>, ContainerError>;
}

/// Visitor passed to [Bean::describe]
///
/// The first failing field stops the walk; later declarations are ignored.
pub struct Fields<'a> {
    sink: &'a mut dyn FieldSink,
    path: Vec<String>,
    error: Option<ContainerError>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(sink: &'a mut dyn FieldSink) -> Self {
        Fields {
            sink,
            path: Vec::new(),
            error: None,
        }
    }

    /// Binds a property expression (`${key:=default}`) into the cell
    pub fn value<T: Bind>(&mut self, name: &str, tag: &str, cell: &Value<T>) -> &mut Self {
        if self.error.is_some() || cell.is_set() {
            return self;
        }
        let field = self.field_path(name);
        let result = self.sink.bind(&field, &mut |binder: &Binder<'_>| {
            let value = binder.expression::<T>(tag)?;
            cell.set(value);
            Ok(())
        });
        self.record(result)
    }

    /// Injects the single bean matching `tag`, `name?` leaves the cell empty if there is none
    pub fn autowire<T: ?Sized + Injectable>(
        &mut self,
        name: &str,
        tag: &str,
        cell: &Autowired<T>,
    ) -> &mut Self {
        if self.error.is_some() || cell.is_set() {
            return self;
        }
        let field = self.field_path(name);
        let result = self
            .sink
            .singleton(&field, tag, TypeInfo::of::<T>())
            .and_then(|found| match found {
                Some(shared) => {
                    let bean = downcast::<T>(&shared)?;
                    cell.set(bean);
                    Ok(())
                }
                None => Ok(()),
            });
        self.record(result)
    }

    /// Same as [Fields::autowire]
    pub fn inject<T: ?Sized + Injectable>(
        &mut self,
        name: &str,
        tag: &str,
        cell: &Autowired<T>,
    ) -> &mut Self {
        self.autowire(name, tag, cell)
    }

    /// Injects the beans selected by a collection tag, `""` / `[]` takes all of them
    pub fn collect<T: ?Sized + Injectable>(
        &mut self,
        name: &str,
        tag: &str,
        cell: &Beans<T>,
    ) -> &mut Self {
        if self.error.is_some() || cell.is_set() {
            return self;
        }
        let field = self.field_path(name);
        let result = self
            .sink
            .collection(&field, tag, TypeInfo::of::<T>())
            .and_then(|found| {
                let beans = found
                    .iter()
                    .map(downcast::<T>)
                    .collect::<Result<Vec<_>, _>>()?;
                cell.set(beans);
                Ok(())
            });
        self.record(result)
    }

    /// Walks an embedded struct with the same property prefix
    pub fn nested<B: Bean>(&mut self, name: &str, bean: &B) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        self.path.push(name.to_string());
        bean.describe(self);
        self.path.pop();
        self
    }

    pub(crate) fn finish(self) -> Result<(), ContainerError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn field_path(&self, name: &str) -> String {
        self.path
            .iter()
            .rev()
            .fold(name.to_string(), |field, outer| join_key(outer, &field))
    }

    fn record(&mut self, result: Result<(), ContainerError>) -> &mut Self {
        if let Err(error) = result {
            self.error = Some(error);
        }
        self
    }
}


/// Turns the concrete bean into one of its interfaces
pub(crate) type CastFn = Arc<dyn Fn(&Shared) -> Option<Shared> + Send + Sync>;

/// An interface a bean is indexed under
#[derive(Clone)]
pub(crate) struct ExportSpec {
    pub interface: TypeInfo,
    /// Field the export was declared on, if any
    pub field: Option<String>,
    /// None for interfaces required by an embedded struct
    pub cast: Option<CastFn>,
}

pub(crate) fn cast_fn<T: Injectable, I: ?Sized + Injectable>(cast: fn(Arc<T>) -> Arc<I>) -> CastFn {
    Arc::new(move |shared: &Shared| shared.downcast::<T>().map(|bean| Shared::new(cast(bean))))
}

/// Collects the interfaces a bean exports
pub struct Exports<T> {
    specs: Vec<ExportSpec>,
    prefix: String,
    _bean: PhantomData<fn() -> T>,
}

impl<T: Bean> Exports<T> {
    pub(crate) fn new() -> Self {
        Self::with_prefix(String::new())
    }

    fn with_prefix(prefix: String) -> Self {
        Exports {
            specs: Vec::new(),
            prefix,
            _bean: PhantomData,
        }
    }

    /// Exports the interface `I`, declared on `field`
    ///
    /// `field` may be empty. A named field can not be injected at the same time.
    pub fn export<I: ?Sized + Injectable>(&mut self, field: &str, cast: fn(Arc<T>) -> Arc<I>) -> &mut Self {
        let field = (!field.is_empty()).then(|| join_key(&self.prefix, field));
        self.specs.push(ExportSpec {
            interface: TypeInfo::of::<I>(),
            field,
            cast: Some(cast_fn(cast)),
        });
        self
    }

    /// Requires every interface exported by the embedded `U`
    ///
    /// The outer bean must export each of them itself.
    pub fn embed<U: Bean>(&mut self, field: &str) -> &mut Self {
        let mut inner = Exports::<U>::with_prefix(join_key(&self.prefix, field));
        U::exports(&mut inner);
        self.specs.extend(inner.specs.into_iter().map(|export| ExportSpec { cast: None, ..export }));
        self
    }

    pub(crate) fn into_specs(self) -> Vec<ExportSpec> {
        self.specs
    }
}

/// A property bound field
///
/// # Panics
///
/// Dereferencing panics if the container has not bound the value yet.
pub struct Value<T> {
    cell: OnceLock<T>,
}

impl<T> Value<T> {
    /// A value the container will bind
    pub const fn unset() -> Self {
        Value {
            cell: OnceLock::new(),
        }
    }

    /// A value that is already bound, the container leaves it alone
    pub fn new(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Value { cell }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }

    pub(crate) fn set(&self, value: T) -> bool {
        self.cell.set(value).is_ok()
    }
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T: Debug> Debug for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Value").field(&self.cell.get()).finish()
    }
}

impl<T> Deref for Value<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.cell.get().expect("Value accessed before the container bound it")
    }
}

/// A field holding a single injected bean
///
/// # Panics
///
/// Dereferencing panics if nothing was injected, see [Autowired::get].
pub struct Autowired<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Autowired<T> {
    pub const fn unset() -> Self {
        Autowired {
            cell: OnceLock::new(),
        }
    }

    /// The injected bean, None for an optional field without candidate
    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn set(&self, bean: Arc<T>) -> bool {
        self.cell.set(bean).is_ok()
    }
}

impl<T: ?Sized> Default for Autowired<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T: ?Sized> Debug for Autowired<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_set() { "wired" } else { "unset" };
        f.debug_tuple("Autowired")
            .field(&type_name::<T>())
            .field(&state)
            .finish()
    }
}

impl<T: ?Sized> Deref for Autowired<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.cell.get().expect("Autowired field accessed before injection")
    }
}

/// A field holding a list of injected beans
pub struct Beans<T: ?Sized> {
    cell: OnceLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Beans<T> {
    pub const fn unset() -> Self {
        Beans {
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&[Arc<T>]> {
        self.cell.get().map(Vec::as_slice)
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn set(&self, beans: Vec<Arc<T>>) -> bool {
        self.cell.set(beans).is_ok()
    }
}

impl<T: ?Sized> Default for Beans<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T: ?Sized> Debug for Beans<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Beans")
            .field(&type_name::<T>())
            .field(&self.cell.get().map(Vec::len))
            .finish()
    }
}

impl<T: ?Sized> Deref for Beans<T> {
    type Target = [Arc<T>];

    fn deref(&self) -> &Self::Target {
        self.cell.get().expect("Beans accessed before injection")
    }
}

/// A list of beans registered as one, see [DiContainer::objects](crate::DiContainer::objects)
///
/// Collections of `E` receive every element.
pub struct BeanList<E: ?Sized> {
    items: Vec<Arc<E>>,
}

impl<E: ?Sized> BeanList<E> {
    pub(crate) fn new(items: Vec<Arc<E>>) -> Self {
        BeanList { items }
    }
}

impl<E: ?Sized> Deref for BeanList<E> {
    type Target = [Arc<E>];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<E: ?Sized + Injectable> Bean for BeanList<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records declarations instead of injecting
    #[derive(Default)]
    struct Recorder {
        bound: Vec<String>,
        wired: Vec<(String, String)>,
    }

    impl FieldSink for Recorder {
        fn bind(
            &mut self,
            field: &str,
            _bind: &mut dyn FnMut(&Binder<'_>) -> Result<(), ConfigError>,
        ) -> Result<(), ContainerError> {
            self.bound.push(field.to_string());
            Ok(())
        }

        fn singleton(
            &mut self,
            field: &str,
            tag: &str,
            _ty: TypeInfo,
        ) -> Result<Option<Shared>, ContainerError> {
            if tag == "fail" {
                return Err(ContainerError::NotRefreshed);
            }
            self.wired.push((field.to_string(), tag.to_string()));
            Ok(None)
        }

        fn collection(
            &mut self,
            field: &str,
            tag: &str,
            _ty: TypeInfo,
        ) -> Result<Vec<Shared>, ContainerError> {
            self.wired.push((field.to_string(), tag.to_string()));
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Limits {
        max: Value<u32>,
    }
    impl Bean for Limits {
        fn describe(&self, fields: &mut Fields<'_>) {
            fields.value("max", "${limits.max}", &self.max);
        }
    }

    #[derive(Default)]
    struct Server {
        name: Value<String>,
        limits: Limits,
        peer: Autowired<Server>,
        all: Beans<Server>,
    }
    impl Bean for Server {
        fn describe(&self, fields: &mut Fields<'_>) {
            fields
                .value("name", "${name}", &self.name)
                .nested("limits", &self.limits)
                .autowire("peer", "peer?", &self.peer)
                .collect("all", "[]?", &self.all);
        }
    }

    #[test]
    fn nested_fields_carry_their_path() {
        let mut recorder = Recorder::default();
        let server = Server {
            name: Value::new("fixed".into()),
            ..Default::default()
        };
        let mut fields = Fields::new(&mut recorder);
        server.describe(&mut fields);
        fields.finish().unwrap();

        assert_eq!(recorder.bound, vec!["limits.max"]);
        assert_eq!(
            recorder.wired,
            vec![
                ("peer".to_string(), "peer?".to_string()),
                ("all".to_string(), "[]?".to_string())
            ]
        );
        assert!(server.all.is_set());
        assert!(!server.peer.is_set());
    }

    #[test]
    fn first_error_stops_the_walk() {
        struct Failing {
            a: Autowired<Failing>,
            b: Autowired<Failing>,
        }
        impl Bean for Failing {
            fn describe(&self, fields: &mut Fields<'_>) {
                fields.autowire("a", "fail", &self.a).autowire("b", "b", &self.b);
            }
        }

        let mut recorder = Recorder::default();
        let bean = Failing {
            a: Autowired::unset(),
            b: Autowired::unset(),
        };
        let mut fields = Fields::new(&mut recorder);
        bean.describe(&mut fields);
        assert!(matches!(fields.finish(), Err(ContainerError::NotRefreshed)));
        assert!(recorder.wired.is_empty());
    }

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Inner;
    impl Named for Inner {
        fn name(&self) -> &str {
            "inner"
        }
    }
    impl Bean for Inner {
        fn exports(exports: &mut Exports<Self>) {
            exports.export("named", |inner: Arc<Inner>| -> Arc<dyn Named> { inner });
        }
    }

    struct Outer;
    impl Bean for Outer {
        fn exports(exports: &mut Exports<Self>) {
            exports.embed::<Inner>("inner");
        }
    }

    #[test]
    fn embedded_exports_become_requirements() {
        let mut exports = Exports::<Outer>::new();
        Outer::exports(&mut exports);
        let specs = exports.into_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].interface, TypeInfo::of::<dyn Named>());
        assert_eq!(specs[0].field.as_deref(), Some("inner.named"));
        assert!(specs[0].cast.is_none());
    }

    #[test]
    fn casts_produce_the_interface() {
        let mut exports = Exports::<Inner>::new();
        Inner::exports(&mut exports);
        let specs = exports.into_specs();
        let cast = specs[0].cast.as_ref().unwrap();
        let named = cast(&Shared::new(Arc::new(Inner))).unwrap();
        assert_eq!(named.downcast::<dyn Named>().unwrap().name(), "inner");
    }

    #[test]
    fn cells_deref_once_set() {
        let value = Value::new(3u8);
        assert_eq!(*value, 3);
        assert!(!value.set(4));

        let beans: Beans<str> = Beans::unset();
        assert!(beans.get().is_none());
        beans.set(vec![Arc::from("a")]);
        assert_eq!(&*beans[0], "a");
    }
}
