use std::{
    fmt::{Debug, Display},
    marker::PhantomData,
    panic::Location,
    sync::Arc,
};

use crate::{
    condition::{All, Condition},
    factories::{hook_fn, CallFn, HookOutput, Method, MethodFn},
    fields::{cast_fn, Bean, BeanList, ExportSpec, Exports, Fields},
    resolver::Arg,
    selector::Selector,
    types::{short_type_name, DependencyInfo, Injectable, Shared, TypeInfo},
};

/// Position of a bean in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(pub(crate) usize);

impl Display for BeanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the instance of a bean comes from
#[derive(Clone)]
pub(crate) enum Source {
    /// Constructed before registration
    Object(Shared),
    Factory {
        call: CallFn<Option<Shared>>,
        parameters: Vec<DependencyInfo>,
    },
    /// A factory called on another bean
    Method {
        receiver: Selector,
        receiver_type: TypeInfo,
        call: MethodFn<Option<Shared>>,
        parameters: Vec<DependencyInfo>,
    },
}

/// An init or destroy hook with its argument descriptors
pub(crate) struct Hook {
    pub call: MethodFn<()>,
    pub args: Vec<Arg>,
    pub parameters: Vec<DependencyInfo>,
}

/// Elements of a [BeanList], flattened into collections of the element type
pub(crate) struct ListElements {
    pub element: TypeInfo,
    pub flatten: fn(&Shared) -> Vec<Shared>,
}

/// Everything known about a registered bean
pub(crate) struct BeanDefinition {
    pub id: BeanId,
    pub type_info: TypeInfo,
    pub name: String,
    pub origin: &'static Location<'static>,
    pub source: Source,
    pub exports: Vec<ExportSpec>,
    pub condition: Option<Arc<dyn Condition>>,
    pub primary: bool,
    pub depends_on: Vec<Selector>,
    pub init: Option<Hook>,
    pub destroy: Option<Hook>,
    /// Argument descriptors of a factory source
    pub args: Vec<Arg>,
    pub describe: fn(&Shared, &mut Fields<'_>),
    pub elements: Option<ListElements>,
}

impl BeanDefinition {
    pub(crate) fn new<T: Bean>(id: BeanId, source: Source, origin: &'static Location<'static>) -> Self {
        let type_info = TypeInfo::of::<T>();
        let mut exports = Exports::<T>::new();
        T::exports(&mut exports);
        BeanDefinition {
            id,
            type_info,
            name: short_type_name(type_info.type_name),
            origin,
            source,
            exports: exports.into_specs(),
            condition: None,
            primary: false,
            depends_on: Vec::new(),
            init: None,
            destroy: None,
            args: Vec::new(),
            describe: describe_bean::<T>,
            elements: None,
        }
    }

    pub(crate) fn list<E: ?Sized + Injectable>(mut self) -> Self {
        self.elements = Some(ListElements {
            element: TypeInfo::of::<E>(),
            flatten: flatten_list::<E>,
        });
        self
    }

    /// The concrete type name followed by every exported interface
    pub(crate) fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.type_info.type_name).chain(
            self.exports
                .iter()
                .filter(|export| export.cast.is_some())
                .map(|export| export.interface.type_name),
        )
    }

    /// True if a lookup for `ty` can return this bean
    pub(crate) fn provides(&self, ty: TypeInfo) -> bool {
        self.type_info == ty
            || self
                .exports
                .iter()
                .any(|export| export.interface == ty && export.cast.is_some())
    }

    pub(crate) fn info(&self) -> BeanInfo {
        let mut exports: Vec<&'static str> = Vec::new();
        for name in self.type_names().skip(1) {
            if !exports.contains(&name) {
                exports.push(name);
            }
        }
        BeanInfo {
            id: self.id,
            name: self.name.clone(),
            type_name: self.type_info.type_name,
            origin: self.origin.to_string(),
            primary: self.primary,
            exports,
        }
    }
}

fn describe_bean<T: Bean>(shared: &Shared, fields: &mut Fields<'_>) {
    if let Some(bean) = shared.downcast_ref::<T>() {
        bean.describe(fields);
    }
}

fn flatten_list<E: ?Sized + Injectable>(shared: &Shared) -> Vec<Shared> {
    shared
        .downcast_ref::<BeanList<E>>()
        .map(|list| list.iter().cloned().map(Shared::new).collect())
        .unwrap_or_default()
}

/// Read only view of a registered bean
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanInfo {
    pub id: BeanId,
    pub name: String,
    pub type_name: &'static str,
    /// `file:line:column` of the registration
    pub origin: String,
    pub primary: bool,
    /// Interfaces the bean is additionally indexed under
    pub exports: Vec<&'static str>,
}

#[cfg(test)]
impl BeanInfo {
    pub(crate) fn named(name: &str) -> Self {
        BeanInfo {
            id: BeanId(0),
            name: name.to_string(),
            type_name: "test",
            origin: String::new(),
            primary: false,
            exports: Vec::new(),
        }
    }
}

/// Handle to a registered bean, used to configure it further
///
/// ```rust
/// use gantry_di::{on_property, Bean, DiContainer};
///
/// struct Cache;
/// impl Bean for Cache {}
///
/// let mut container = DiContainer::new();
/// container
///     .factory(|| Cache)
///     .unwrap()
///     .name("cache")
///     .primary()
///     .condition(on_property("cache.enabled").match_if_missing())
///     .destroy(|_cache: &Cache| tracing::debug!("cache dropped"));
/// ```
pub struct BeanRef<'a, T> {
    def: &'a mut BeanDefinition,
    _bean: PhantomData<fn() -> T>,
}

impl<T> Debug for BeanRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRef")
            .field("id", &self.def.id)
            .field("name", &self.def.name)
            .finish()
    }
}

impl<'a, T: Bean> BeanRef<'a, T> {
    pub(crate) fn new(def: &'a mut BeanDefinition) -> Self {
        BeanRef {
            def,
            _bean: PhantomData,
        }
    }

    pub fn id(&self) -> BeanId {
        self.def.id
    }

    /// Selects exactly this bean
    pub fn selector(&self) -> Selector {
        Selector::Bean(self.def.id)
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    /// Wins ties among several candidates of a single bean lookup
    pub fn primary(self) -> Self {
        self.def.primary = true;
        self
    }

    /// The bean only exists if the condition matches, repeated calls must all match
    pub fn condition(self, condition: impl Condition) -> Self {
        let condition: Arc<dyn Condition> = Arc::new(condition);
        self.def.condition = Some(match self.def.condition.take() {
            Some(existing) => Arc::new(All(vec![existing, condition])),
            None => condition,
        });
        self
    }

    /// Wires the selected bean completely before this one
    pub fn depends_on(self, selector: impl Into<Selector>) -> Self {
        self.def.depends_on.push(selector.into());
        self
    }

    /// Called with the bean once its fields are populated
    pub fn init<Args: 'static, F>(self, hook: F) -> Self
    where
        F: Method<T, Args>,
        F::Output: HookOutput,
    {
        self.init_with(hook, Vec::<Arg>::new())
    }

    pub fn init_with<Args: 'static, F, A>(self, hook: F, args: impl IntoIterator<Item = A>) -> Self
    where
        F: Method<T, Args>,
        F::Output: HookOutput,
        A: Into<Arg>,
    {
        self.def.init = Some(make_hook::<T, Args, F, A>(hook, args));
        self
    }

    /// Called with the bean when the container closes
    pub fn destroy<Args: 'static, F>(self, hook: F) -> Self
    where
        F: Method<T, Args>,
        F::Output: HookOutput,
    {
        self.destroy_with(hook, Vec::<Arg>::new())
    }

    pub fn destroy_with<Args: 'static, F, A>(self, hook: F, args: impl IntoIterator<Item = A>) -> Self
    where
        F: Method<T, Args>,
        F::Output: HookOutput,
        A: Into<Arg>,
    {
        self.def.destroy = Some(make_hook::<T, Args, F, A>(hook, args));
        self
    }

    /// Indexes the bean under the interface `I` as well
    pub fn export<I: ?Sized + Injectable>(self, cast: fn(Arc<T>) -> Arc<I>) -> Self {
        self.def.exports.push(ExportSpec {
            interface: TypeInfo::of::<I>(),
            field: None,
            cast: Some(cast_fn(cast)),
        });
        self
    }

    /// Argument descriptors for the factory, consumed front to back
    pub fn args<A: Into<Arg>>(self, args: impl IntoIterator<Item = A>) -> Self {
        self.def.args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn make_hook<T, Args, F, A>(hook: F, args: impl IntoIterator<Item = A>) -> Hook
where
    T: Bean,
    Args: 'static,
    F: Method<T, Args>,
    F::Output: HookOutput,
    A: Into<Arg>,
{
    Hook {
        call: hook_fn::<T, Args, F>(hook),
        args: args.into_iter().map(Into::into).collect(),
        parameters: F::parameters(),
    }
}
