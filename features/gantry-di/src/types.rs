use std::{
    any::{type_name, Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

pub use gantry_config::DynError;

use crate::errors::ContainerError;

/// Beans are shared between threads once the container is running
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// Type erased `Arc<T>`, where `T` may be a `dyn Trait`
#[derive(Clone)]
pub struct Shared {
    pub info: TypeInfo,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Shared {
    pub(crate) fn new<T: ?Sized + Injectable>(value: Arc<T>) -> Self {
        Shared {
            info: TypeInfo::of::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Returns the held `Arc<T>` if `T` is the held type
    pub fn downcast<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    /// Like [Shared::downcast], without touching the reference count
    pub fn downcast_ref<T: ?Sized + Injectable>(&self) -> Option<&T> {
        self.inner.downcast_ref::<Arc<T>>().map(|arc| &**arc)
    }
}

/// [Shared::downcast] for beans the container already checked the type of
pub(crate) fn downcast<T: ?Sized + Injectable>(shared: &Shared) -> Result<Arc<T>, ContainerError> {
    shared.downcast::<T>().ok_or_else(|| {
        ContainerError::InvalidBeanShape(format!(
            "expected '{}', found '{}'",
            type_name::<T>(),
            shared.info
        ))
    })
}

impl Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Shared").field(&self.info.type_name).finish()
    }
}

/// Information about a parameter of a factory, hook or configurer
#[derive(Debug, Clone)]
pub struct DependencyInfo {
    /// The required Type
    pub type_info: TypeInfo,
    /// If it is optional or required
    pub optional: bool,
    /// If the parameter takes a list of beans
    pub collection: bool,
    /// If the parameter absorbs all remaining arguments
    pub variadic: bool,
}

impl DependencyInfo {
    pub fn of<T: ?Sized + 'static>() -> Self {
        DependencyInfo {
            type_info: TypeInfo::of::<T>(),
            optional: false,
            collection: false,
            variadic: false,
        }
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
    /// True for trait objects such as `dyn Trait`
    ///
    /// Detected from the pointer width, `str` and slices are excluded by name.
    pub interface: bool,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        let type_name = type_name::<T>();
        let fat = std::mem::size_of::<*const T>() > std::mem::size_of::<*const ()>();
        TypeInfo {
            type_name,
            type_id: TypeId::of::<T>(),
            interface: fat && type_name != "str" && !type_name.starts_with('['),
        }
    }

    /// The type name without module paths, e.g. `Vec<Server>`
    pub fn short_name(&self) -> String {
        short_type_name(self.type_name)
    }
}

/// Strips the module path from every segment of a type name
pub fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            segment.push(c);
            continue;
        }
        short.push_str(last_segment(&segment));
        segment.clear();
        short.push(c);
    }
    short.push_str(last_segment(&segment));
    short
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
