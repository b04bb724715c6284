use std::mem;

use gantry_config::{Binder, ConfigError};

use crate::{
    condition::Condition,
    configurer::{self, ConfigurerDefinition},
    definition::{BeanId, Hook, Source},
    dependency_graph::DependencyGraph,
    errors::ContainerError,
    factories::guard,
    fields::{FieldSink, Fields},
    lifecycle::ProcessContext,
    registry::{Registry, Snapshot, Status},
    resolver::{ArgContext, ArgQueue},
    selector::Selector,
    tag::{is_collection_tag, BeanTag},
    types::{Shared, TypeInfo},
};

/// How a bean was reached while wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Via {
    Root,
    /// Through a field of an already constructed bean
    Field,
    /// Through an argument of a factory, hook or configurer
    Arg,
    DependsOn,
}

/// A destroy hook of a wired bean
pub(crate) struct Destroyer {
    pub name: String,
    pub instance: Shared,
    pub hook: Hook,
}

/// Wires the resolved beans of a [Registry]
///
/// Beans are wired depth first: every bean a factory argument or field needs is
/// wired before it is handed out.
pub(crate) struct Initiator<'a> {
    registry: &'a mut Registry,
    process: &'a ProcessContext,
    /// Beans being wired, outermost first
    stack: Vec<BeanId>,
    /// Destroyers in the order their beans finished wiring
    destroyers: Vec<Destroyer>,
}

impl<'a> Initiator<'a> {
    pub fn new(registry: &'a mut Registry, process: &'a ProcessContext) -> Self {
        Initiator {
            registry,
            process,
            stack: Vec::new(),
            destroyers: Vec::new(),
        }
    }

    /// Runs the configurers, wires every bean and returns the destroyers in run order
    pub fn initiate(
        mut self,
        configurers: Vec<ConfigurerDefinition>,
    ) -> Result<Vec<Destroyer>, ContainerError> {
        configurer::run_all(configurers, &mut self)?;

        tracing::debug!("Wiring {} beans", self.registry.len());
        for index in 0..self.registry.len() {
            let id = BeanId(index);
            if self.registry.status(id) == Status::Resolved {
                self.wire(id, Via::Root)?;
            }
        }

        self.finish()
    }

    /// Orders the destroyers: a bean finished later is destroyed earlier
    fn finish(self) -> Result<Vec<Destroyer>, ContainerError> {
        let mut graph = DependencyGraph::new();
        for (index, destroyer) in self.destroyers.iter().enumerate() {
            let node = graph.add(destroyer.name.clone());
            if index > 0 {
                graph.add_edge(node, node - 1);
            }
        }
        let order = graph
            .sort()
            .map_err(|chain| ContainerError::SortingCycle { chain })?;

        let mut destroyers: Vec<Option<Destroyer>> = self.destroyers.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| destroyers[index].take())
            .collect())
    }

    fn wire(&mut self, id: BeanId, via: Via) -> Result<(), ContainerError> {
        match self.registry.status(id) {
            Status::Wired => return Ok(()),
            // Constructed beans may be handed out before their fields are filled
            Status::Wiring if self.registry.instance(id).is_some() => {
                tracing::trace!(
                    "'{}' is still wiring, injecting it early ({via:?})",
                    self.registry.name(id)
                );
                return Ok(());
            }
            Status::Wiring => return Err(self.circular(id)),
            Status::Resolved if self.stack.contains(&id) => return Err(self.circular(id)),
            Status::Resolved => {}
            status => {
                return Err(ContainerError::InvalidBeanShape(format!(
                    "bean '{}' can not be wired in status {status:?}",
                    self.registry.name(id)
                )))
            }
        }

        self.stack.push(id);
        let result = self.wire_pushed(id).map_err(|error| self.in_context(error));
        self.stack.pop();
        result
    }

    fn wire_pushed(&mut self, id: BeanId) -> Result<(), ContainerError> {
        let name = self.registry.name(id).to_string();

        for selector in self.registry.def(id).depends_on.clone() {
            let target = self.depends_on(id, &selector)?;
            self.wire(target, Via::DependsOn)?;
        }

        self.registry.set_status(id, Status::Wiring);
        self.construct(id, &name)?;
        self.populate(id, &name)?;

        let instance = self.constructed(id)?;
        if let Some(hook) = self.registry.def_mut(id).init.take() {
            let mut args = ArgQueue::new(hook.args);
            if let Err(error) = (hook.call)(&instance, self, &mut args)? {
                return Err(ContainerError::callback(format!("init of bean '{name}'"), error));
            }
        }

        self.registry.set_status(id, Status::Wired);
        if let Some(hook) = self.registry.def_mut(id).destroy.take() {
            self.destroyers.push(Destroyer {
                name: name.clone(),
                instance,
                hook,
            });
        }
        tracing::debug!("Wired bean '{name}'");
        Ok(())
    }

    fn depends_on(&self, id: BeanId, selector: &Selector) -> Result<BeanId, ContainerError> {
        let (mut candidates, _) = self.registry.matching(None, selector)?;
        candidates.retain(|candidate| *candidate != id);
        match candidates.as_slice() {
            [single] => Ok(*single),
            [] => Err(ContainerError::BeanNotFound {
                type_name: "any",
                selector: selector.to_string(),
            }),
            _ => Err(ContainerError::BeanAmbiguous {
                type_name: "any",
                selector: selector.to_string(),
                candidates: candidates
                    .iter()
                    .map(|candidate| self.registry.name(*candidate).to_string())
                    .collect(),
            }),
        }
    }

    fn construct(&mut self, id: BeanId, name: &str) -> Result<(), ContainerError> {
        if self.registry.instance(id).is_some() {
            return Ok(());
        }

        let mut args = ArgQueue::new(mem::take(&mut self.registry.def_mut(id).args));
        let produced = match self.registry.def(id).source.clone() {
            Source::Object(shared) => Ok(Some(shared)),
            Source::Factory { call, .. } => call(self, &mut args)?,
            Source::Method {
                receiver,
                receiver_type,
                call,
                ..
            } => {
                let receiver = self
                    .registry
                    .select_singleton(receiver_type, &receiver, Some(id))?
                    .ok_or_else(|| ContainerError::BeanNotFound {
                        type_name: receiver_type.type_name,
                        selector: receiver.to_string(),
                    })?;
                self.wire(receiver, Via::Arg)?;
                let receiver = self.registry.instance_as(receiver, receiver_type)?;
                call(&receiver, self, &mut args)?
            }
        };

        match produced {
            Ok(Some(instance)) => {
                tracing::debug!("Constructed bean '{name}'");
                self.registry.set_instance(id, instance);
                Ok(())
            }
            Ok(None) => Err(ContainerError::FactoryReturnedNil {
                bean: name.to_string(),
            }),
            Err(error) => Err(ContainerError::callback(
                format!("factory of bean '{name}'"),
                error,
            )),
        }
    }

    fn populate(&mut self, id: BeanId, name: &str) -> Result<(), ContainerError> {
        let instance = self.constructed(id)?;
        let describe = self.registry.def(id).describe;

        let mut sink = PopulateSink {
            initiator: self,
            owner: id,
        };
        let mut fields = Fields::new(&mut sink);
        let walked = guard(|| {
            describe(&instance, &mut fields);
            Ok(Ok(()))
        });
        if let Err(error) = walked? {
            return Err(ContainerError::callback(format!("fields of bean '{name}'"), error));
        }
        fields.finish()
    }

    fn constructed(&self, id: BeanId) -> Result<Shared, ContainerError> {
        self.registry.instance(id).cloned().ok_or_else(|| {
            ContainerError::InvalidBeanShape(format!(
                "bean '{}' has not been constructed",
                self.registry.name(id)
            ))
        })
    }

    fn collect(
        &mut self,
        ty: TypeInfo,
        tag: &BeanTag,
        via: Via,
    ) -> Result<Vec<Shared>, ContainerError> {
        let members = self
            .registry
            .select_collection(ty, tag, self.stack.last().copied())?;
        let mut collected = Vec::new();
        for member in members {
            self.wire(member.bean(), via)?;
            collected.extend(self.registry.materialize(member, ty)?);
        }
        Ok(collected)
    }

    fn inject(
        &mut self,
        ty: TypeInfo,
        selector: &Selector,
        via: Via,
    ) -> Result<Option<Shared>, ContainerError> {
        let Some(target) = self
            .registry
            .select_singleton(ty, selector, self.stack.last().copied())?
        else {
            return Ok(None);
        };
        self.wire(target, via)?;
        self.registry.instance_as(target, ty).map(Some)
    }

    fn circular(&self, id: BeanId) -> ContainerError {
        let mut path: Vec<String> = self.path();
        path.push(self.registry.name(id).to_string());
        ContainerError::CircularWiring { path }
    }

    fn path(&self) -> Vec<String> {
        self.stack
            .iter()
            .map(|id| self.registry.name(*id).to_string())
            .collect()
    }

    /// Attaches the wiring path, once, at the innermost bean
    fn in_context(&self, error: ContainerError) -> ContainerError {
        match error {
            ContainerError::Wiring { .. } => error,
            error => ContainerError::Wiring {
                path: self.path(),
                source: Box::new(error),
            },
        }
    }
}

impl ArgContext for Initiator<'_> {
    fn singleton(
        &mut self,
        ty: TypeInfo,
        selector: &Selector,
    ) -> Result<Option<Shared>, ContainerError> {
        self.inject(ty, selector, Via::Arg)
    }

    fn collection(&mut self, ty: TypeInfo, tag: &str) -> Result<Vec<Shared>, ContainerError> {
        let tag = BeanTag::parse(tag)?;
        self.collect(ty, &tag, Via::Arg)
    }

    fn binder(&self) -> Binder<'_> {
        self.registry.binder()
    }

    fn condition(&mut self, condition: &dyn Condition) -> Result<bool, ContainerError> {
        condition.matches(&mut Snapshot {
            registry: self.registry,
        })
    }

    fn process(&self) -> Result<ProcessContext, ContainerError> {
        Ok(self.process.clone())
    }
}

/// Fills the fields of one bean
struct PopulateSink<'i, 'a> {
    initiator: &'i mut Initiator<'a>,
    owner: BeanId,
}

impl PopulateSink<'_, '_> {
    fn check_conflict(&self, field: &str) -> Result<(), ContainerError> {
        let def = self.initiator.registry.def(self.owner);
        if def.exports.iter().any(|export| export.field.as_deref() == Some(field)) {
            return Err(ContainerError::InjectConflict {
                bean: def.name.clone(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves a tag given as a property expression
    fn expand(&self, tag: &str) -> Result<String, ContainerError> {
        if tag.trim_start().starts_with("${") {
            return Ok(self.initiator.registry.properties().resolve(tag)?);
        }
        Ok(tag.to_string())
    }
}

impl FieldSink for PopulateSink<'_, '_> {
    fn bind(
        &mut self,
        field: &str,
        bind: &mut dyn FnMut(&Binder<'_>) -> Result<(), ConfigError>,
    ) -> Result<(), ContainerError> {
        tracing::trace!("Binding field '{field}'");
        bind(&self.initiator.registry.binder())?;
        Ok(())
    }

    fn singleton(
        &mut self,
        field: &str,
        tag: &str,
        ty: TypeInfo,
    ) -> Result<Option<Shared>, ContainerError> {
        self.check_conflict(field)?;
        let tag = self.expand(tag)?;
        if is_collection_tag(&tag) {
            return Err(ConfigError::InvalidTag {
                tag,
                reason: format!("field '{field}' takes a single bean"),
            }
            .into());
        }
        self.initiator.inject(ty, &Selector::Tag(tag), Via::Field)
    }

    fn collection(
        &mut self,
        field: &str,
        tag: &str,
        ty: TypeInfo,
    ) -> Result<Vec<Shared>, ContainerError> {
        self.check_conflict(field)?;
        let tag = BeanTag::parse(&self.expand(tag)?)?;
        self.initiator.collect(ty, &tag, Via::Field)
    }
}
