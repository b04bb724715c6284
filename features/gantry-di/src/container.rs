use std::{
    any::type_name,
    fmt::Debug,
    future::Future,
    mem,
    panic::{self, AssertUnwindSafe, Location},
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use gantry_config::{
    Bind, Converters, DynError, LayeredProperties, Properties, Property, CODE_LAYER,
};

use crate::{
    configurer::{ConfigurerDefinition, ConfigurerRef},
    definition::{BeanDefinition, BeanId, BeanInfo, BeanRef, Source},
    errors::ContainerError,
    factories::{call_fn, factory_fn, method_factory_fn, HookOutput, Injector, IntoBean, Method},
    fields::{Bean, BeanList},
    initiator::{Destroyer, Initiator},
    lifecycle::ProcessContext,
    registry::{Lookup, Registry},
    resolver::{check_arity, Arg, ArgContext, ArgQueue},
    selector::Selector,
    types::{downcast, Injectable, Shared, TypeInfo},
};

/// Application container: register beans, refresh once, then look them up
///
/// Registration happens in the building phase. [DiContainer::refresh] evaluates
/// conditions, runs configurers and wires every bean; afterwards the container
/// is read only and may be shared between threads.
pub struct DiContainer {
    state: State,
}

enum State {
    Building(Box<Blueprint>),
    Running(Box<Runtime>),
    /// A refresh failed, the partial state was discarded
    Failed,
}

/// Everything registered before the refresh
struct Blueprint {
    beans: Vec<BeanDefinition>,
    configurers: Vec<ConfigurerDefinition>,
    layers: LayeredProperties,
    converters: Converters,
}

impl Blueprint {
    fn next_id(&self) -> BeanId {
        BeanId(self.beans.len())
    }

    fn push<T: Bean>(&mut self, def: BeanDefinition) -> BeanRef<'_, T> {
        tracing::debug!("Registered bean '{}' at {}", def.name, def.origin);
        let index = self.beans.len();
        self.beans.push(def);
        BeanRef::new(&mut self.beans[index])
    }
}

/// The refreshed container
struct Runtime {
    registry: Registry,
    process: ProcessContext,
    /// Taken by the first close
    destroyers: Mutex<Option<Vec<Destroyer>>>,
}

impl Default for DiContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("DiContainer");
        match &self.state {
            State::Building(blueprint) => {
                map.field("state", &"building");
                map.field("beans", &blueprint.beans.len());
            }
            State::Running(runtime) => {
                map.field("state", &"running");
                let beans: Vec<&str> = runtime
                    .registry
                    .alive()
                    .map(|id| runtime.registry.name(id))
                    .collect();
                map.field("beans", &beans);
            }
            State::Failed => {
                map.field("state", &"failed");
            }
        }
        map.finish()
    }
}

// Registration
impl DiContainer {
    pub fn new() -> Self {
        DiContainer {
            state: State::Building(Box::new(Blueprint {
                beans: Vec::new(),
                configurers: Vec::new(),
                layers: LayeredProperties::standard(),
                converters: Converters::new(),
            })),
        }
    }

    fn blueprint(&mut self) -> Result<&mut Blueprint, ContainerError> {
        match &mut self.state {
            State::Building(blueprint) => Ok(&mut **blueprint),
            _ => Err(ContainerError::RegistrationFrozen),
        }
    }

    /// Registers a constructed bean
    #[track_caller]
    pub fn object<T: Bean>(&mut self, bean: T) -> Result<BeanRef<'_, T>, ContainerError> {
        self.object_arc(Arc::new(bean))
    }

    /// Registers a constructed bean which is shared already
    #[track_caller]
    pub fn object_arc<T: Bean>(&mut self, bean: Arc<T>) -> Result<BeanRef<'_, T>, ContainerError> {
        let origin = Location::caller();
        let blueprint = self.blueprint()?;
        let def = BeanDefinition::new::<T>(
            blueprint.next_id(),
            Source::Object(Shared::new(bean)),
            origin,
        );
        Ok(blueprint.push(def))
    }

    /// Registers a list of beans as one [BeanList] bean
    ///
    /// Collections of `E` receive the elements one by one.
    #[track_caller]
    pub fn objects<E: ?Sized + Injectable>(
        &mut self,
        items: Vec<Arc<E>>,
    ) -> Result<BeanRef<'_, BeanList<E>>, ContainerError> {
        let origin = Location::caller();
        let blueprint = self.blueprint()?;
        let list = Shared::new(Arc::new(BeanList::new(items)));
        let def = BeanDefinition::new::<BeanList<E>>(blueprint.next_id(), Source::Object(list), origin)
            .list::<E>();
        Ok(blueprint.push(def))
    }

    /// Registers a factory, its parameters are resolved when the bean is wired
    ///
    /// The factory may return `T`, `Arc<T>`, `Option<T>`, `Result<T, E>` or
    /// `Result<Arc<T>, E>`.
    #[track_caller]
    #[allow(clippy::type_complexity)]
    pub fn factory<Args, Marker, F>(
        &mut self,
        factory: F,
    ) -> Result<BeanRef<'_, <F::Output as IntoBean<Marker>>::Bean>, ContainerError>
    where
        Args: 'static,
        Marker: 'static,
        F: Injector<Args>,
        F::Output: IntoBean<Marker>,
    {
        let origin = Location::caller();
        let blueprint = self.blueprint()?;
        let def = BeanDefinition::new::<<F::Output as IntoBean<Marker>>::Bean>(
            blueprint.next_id(),
            Source::Factory {
                call: factory_fn::<Args, Marker, F>(factory),
                parameters: F::parameters(),
            },
            origin,
        );
        Ok(blueprint.push(def))
    }

    /// Registers a factory called on the single bean of type `P` the selector picks
    #[track_caller]
    #[allow(clippy::type_complexity)]
    pub fn method_factory<P, Args, Marker, F>(
        &mut self,
        receiver: impl Into<Selector>,
        factory: F,
    ) -> Result<BeanRef<'_, <F::Output as IntoBean<Marker>>::Bean>, ContainerError>
    where
        P: ?Sized + Injectable,
        Args: 'static,
        Marker: 'static,
        F: Method<P, Args>,
        F::Output: IntoBean<Marker>,
    {
        let origin = Location::caller();
        let blueprint = self.blueprint()?;
        let def = BeanDefinition::new::<<F::Output as IntoBean<Marker>>::Bean>(
            blueprint.next_id(),
            Source::Method {
                receiver: receiver.into(),
                receiver_type: TypeInfo::of::<P>(),
                call: method_factory_fn::<P, Args, Marker, F>(factory),
                parameters: F::parameters(),
            },
            origin,
        );
        Ok(blueprint.push(def))
    }

    /// Registers a function run during refresh, before any bean is wired
    #[track_caller]
    pub fn configure<Args, F>(&mut self, configurer: F) -> Result<ConfigurerRef<'_>, ContainerError>
    where
        Args: 'static,
        F: Injector<Args>,
        F::Output: HookOutput,
    {
        let origin = Location::caller();
        let blueprint = self.blueprint()?;
        let index = blueprint.configurers.len();
        blueprint.configurers.push(ConfigurerDefinition {
            name: format!("configurer#{index}"),
            before: Vec::new(),
            after: Vec::new(),
            condition: None,
            call: call_fn::<Args, F>(configurer),
            args: Vec::new(),
            parameters: F::parameters(),
            origin,
        });
        tracing::debug!("Registered configurer #{index} at {origin}");
        Ok(ConfigurerRef::new(&mut blueprint.configurers[index]))
    }

    /// Sets a property in the code layer, the highest priority
    pub fn property(&mut self, key: &str, value: impl Into<Property>) -> Result<(), ContainerError> {
        let layers = &mut self.blueprint()?.layers;
        match layers.layer_mut(CODE_LAYER) {
            Some(code) => code.set(key, value),
            None => layers.set(key, value),
        }
        Ok(())
    }

    /// Merges parsed properties into the named layer
    ///
    /// An unknown layer is added with the lowest priority.
    pub fn load_properties(&mut self, layer: &str, properties: Properties) -> Result<(), ContainerError> {
        let layers = &mut self.blueprint()?.layers;
        match layers.layer_mut(layer) {
            Some(existing) => existing.overlay(&properties),
            None => {
                tracing::debug!("Adding property layer '{layer}'");
                layers.push_back(layer, properties);
            }
        }
        Ok(())
    }

    /// The property layers, e.g. to splice in a custom layer
    pub fn layers_mut(&mut self) -> Result<&mut LayeredProperties, ContainerError> {
        Ok(&mut self.blueprint()?.layers)
    }

    /// Registers a converter used when binding values of type `T`
    pub fn add_converter<T, E, F>(&mut self, convert: F) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        E: Into<DynError>,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    {
        self.blueprint()?.converters.add(convert);
        Ok(())
    }
}

// Activation
impl DiContainer {
    /// Resolves conditions, runs the configurers and wires every bean
    ///
    /// Only the first call does anything, later calls fail with
    /// [ContainerError::RegistrationFrozen]. If the refresh fails the
    /// container is unusable.
    pub fn refresh(&mut self) -> Result<(), ContainerError> {
        let started = Instant::now();
        let blueprint = match mem::replace(&mut self.state, State::Failed) {
            State::Building(blueprint) => blueprint,
            state => {
                self.state = state;
                return Err(ContainerError::RegistrationFrozen);
            }
        };
        let Blueprint {
            beans,
            configurers,
            layers,
            converters,
        } = *blueprint;

        tracing::debug!(
            "Refreshing container with {} beans and {} configurers over {} property layers",
            beans.len(),
            configurers.len(),
            layers.depth()
        );

        let mut registry = Registry::new(beans, layers.merged(), converters);
        registry.resolve_all()?;

        let process = ProcessContext::new();
        let destroyers = Initiator::new(&mut registry, &process).initiate(configurers)?;

        tracing::info!(
            "Container refreshed with {} beans in {:?}",
            registry.alive().count(),
            started.elapsed()
        );
        self.state = State::Running(Box::new(Runtime {
            registry,
            process,
            destroyers: Mutex::new(Some(destroyers)),
        }));
        Ok(())
    }

    pub fn is_refreshed(&self) -> bool {
        matches!(self.state, State::Running(_))
    }
}

// Runtime
impl DiContainer {
    fn runtime(&self) -> Result<&Runtime, ContainerError> {
        match &self.state {
            State::Running(runtime) => Ok(&**runtime),
            _ => Err(ContainerError::NotRefreshed),
        }
    }

    fn lookup(&self) -> Result<Lookup<'_>, ContainerError> {
        let runtime = self.runtime()?;
        Ok(Lookup {
            registry: &runtime.registry,
            process: &runtime.process,
        })
    }

    /// The single bean of type `T`, None if there is none
    pub fn get<T: ?Sized + Injectable>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        self.get_by::<T>(Selector::of::<T>())
    }

    /// The single bean of type `T` the selector picks, None if there is none
    pub fn get_by<T: ?Sized + Injectable>(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        let registry = &self.runtime()?.registry;
        let ty = TypeInfo::of::<T>();
        match registry.select_singleton(ty, &selector.into(), None) {
            Ok(Some(id)) => downcast::<T>(&registry.instance_as(id, ty)?).map(Some),
            Ok(None) | Err(ContainerError::BeanNotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Every live bean the selector matches
    pub fn find(&self, selector: impl Into<Selector>) -> Result<Vec<BeanInfo>, ContainerError> {
        self.runtime()?.registry.find(&selector.into())
    }

    /// The beans of type `T` a collection tag selects, `"[]?"` for all of them
    pub fn collect<T: ?Sized + Injectable>(&self, tag: &str) -> Result<Vec<Arc<T>>, ContainerError> {
        self.lookup()?
            .collection(TypeInfo::of::<T>(), tag)?
            .iter()
            .map(downcast::<T>)
            .collect()
    }

    /// The merged properties the beans were bound from
    pub fn properties(&self) -> Result<&Properties, ContainerError> {
        Ok(self.runtime()?.registry.properties())
    }

    /// Binds a property expression such as `${server:=}` into a `T`
    pub fn bind<T: Bind>(&self, tag: &str) -> Result<T, ContainerError> {
        Ok(self.runtime()?.registry.binder().expression::<T>(tag)?)
    }

    /// Runs a task until it completes, see [ProcessContext::schedule]
    pub fn schedule<F, Fut>(&self, task: F) -> Result<(), ContainerError>
    where
        F: FnOnce(ProcessContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        self.runtime()?.process.schedule(task)
    }

    /// The process context shared with scheduled tasks
    pub fn process(&self) -> Result<ProcessContext, ContainerError> {
        Ok(self.runtime()?.process.clone())
    }

    /// Calls the function now, resolving its parameters from the container
    pub fn invoke<Args, F>(&self, function: F) -> Result<(), ContainerError>
    where
        Args: 'static,
        F: Injector<Args>,
        F::Output: HookOutput,
    {
        self.invoke_with(function, Vec::<Arg>::new())
    }

    /// Like [DiContainer::invoke], with argument descriptors
    pub fn invoke_with<Args, F, A>(
        &self,
        function: F,
        args: impl IntoIterator<Item = A>,
    ) -> Result<(), ContainerError>
    where
        Args: 'static,
        F: Injector<Args>,
        F::Output: HookOutput,
        A: Into<Arg>,
    {
        let mut lookup = self.lookup()?;
        let args: Vec<Arg> = args.into_iter().map(Into::into).collect();
        check_arity(&F::parameters(), &args).map_err(|reason| {
            ContainerError::InvalidBeanShape(format!("invoked '{}': {reason}", type_name::<F>()))
        })?;

        let call = call_fn::<Args, F>(function);
        match call(&mut lookup, &mut ArgQueue::new(args))? {
            Ok(()) => Ok(()),
            Err(error) => Err(ContainerError::callback(
                format!("invoked '{}'", type_name::<F>()),
                error,
            )),
        }
    }

    /// Cancels the scheduled tasks, waits for them and runs the destroy hooks
    pub fn close(&self) {
        self.close_with(Vec::new())
    }

    /// Like [DiContainer::close], running `hooks` first
    ///
    /// Only the first call has an effect. Failing destroy hooks are logged and
    /// the remaining ones still run.
    pub fn close_with(&self, hooks: Vec<Box<dyn FnOnce() + Send>>) {
        let Ok(runtime) = self.runtime() else {
            tracing::debug!("Closing a container which is not running");
            return;
        };
        let Some(destroyers) = runtime
            .destroyers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        for hook in hooks {
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
                tracing::error!("A pre-destroy hook panicked");
            }
        }

        runtime.process.cancel();
        runtime.process.join();

        let mut lookup = Lookup {
            registry: &runtime.registry,
            process: &runtime.process,
        };
        for destroyer in destroyers {
            let Destroyer {
                name,
                instance,
                hook,
            } = destroyer;
            let mut args = ArgQueue::new(hook.args);
            match (hook.call)(&instance, &mut lookup, &mut args) {
                Ok(Ok(())) => tracing::debug!("Destroyed bean '{name}'"),
                Ok(Err(error)) => tracing::error!("Destroying bean '{name}' failed: {error}"),
                Err(error) => tracing::error!("Destroying bean '{name}' failed: {error}"),
            }
        }
        tracing::debug!("Container closed");
    }
}

