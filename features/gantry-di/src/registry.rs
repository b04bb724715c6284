use std::{
    any::TypeId,
    collections::{hash_map::Entry, HashMap},
};

use gantry_config::{Binder, Converters, Properties};

use crate::{
    condition::{Condition, ConditionContext},
    definition::{BeanDefinition, BeanId, BeanInfo, Source},
    errors::ContainerError,
    lifecycle::ProcessContext,
    resolver::{check_arity, ArgContext},
    selector::Selector,
    tag::{BeanTag, SingletonTag, TagItem},
    types::{Shared, TypeInfo},
};

/// Lifecycle state of a bean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Default,
    Resolving,
    Resolved,
    Wiring,
    Wired,
    /// Removed by its condition
    Deleted,
}

pub(crate) struct Slot {
    pub def: BeanDefinition,
    pub status: Status,
    pub instance: Option<Shared>,
}

/// A selected member of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Member {
    Bean(BeanId),
    /// Every element of a bean list
    List(BeanId),
}

impl Member {
    pub fn bean(self) -> BeanId {
        match self {
            Member::Bean(id) | Member::List(id) => id,
        }
    }
}

/// All registered beans and the indices over the live ones
pub(crate) struct Registry {
    beans: Vec<Slot>,
    by_type: HashMap<TypeId, Vec<BeanId>>,
    by_name: HashMap<String, Vec<BeanId>>,
    /// Bean lists by element type
    elements: HashMap<TypeId, Vec<BeanId>>,
    properties: Properties,
    converters: Converters,
}

impl Registry {
    pub fn new(
        definitions: Vec<BeanDefinition>,
        properties: Properties,
        converters: Converters,
    ) -> Self {
        let beans = definitions
            .into_iter()
            .map(|def| {
                let instance = match &def.source {
                    Source::Object(shared) => Some(shared.clone()),
                    _ => None,
                };
                Slot {
                    def,
                    status: Status::Default,
                    instance,
                }
            })
            .collect();

        Registry {
            beans,
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            elements: HashMap::new(),
            properties,
            converters,
        }
    }

    pub fn binder(&self) -> Binder<'_> {
        Binder::new(&self.properties, &self.converters)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn def(&self, id: BeanId) -> &BeanDefinition {
        &self.beans[id.0].def
    }

    pub fn def_mut(&mut self, id: BeanId) -> &mut BeanDefinition {
        &mut self.beans[id.0].def
    }

    pub fn status(&self, id: BeanId) -> Status {
        self.beans[id.0].status
    }

    pub fn set_status(&mut self, id: BeanId, status: Status) {
        self.beans[id.0].status = status;
    }

    pub fn instance(&self, id: BeanId) -> Option<&Shared> {
        self.beans[id.0].instance.as_ref()
    }

    pub fn set_instance(&mut self, id: BeanId, instance: Shared) {
        self.beans[id.0].instance = Some(instance);
    }

    pub fn name(&self, id: BeanId) -> &str {
        &self.beans[id.0].def.name
    }

    /// Ids of all beans not removed by their condition
    pub fn alive(&self) -> impl Iterator<Item = BeanId> + '_ {
        self.beans
            .iter()
            .filter(|slot| !matches!(slot.status, Status::Deleted | Status::Default | Status::Resolving))
            .map(|slot| slot.def.id)
    }
}

// Resolution
impl Registry {
    /// Evaluates every condition, then indexes and validates the surviving beans
    pub fn resolve_all(&mut self) -> Result<(), ContainerError> {
        for index in 0..self.beans.len() {
            self.resolve(BeanId(index))?;
        }

        self.index();
        self.check_duplicates()?;
        self.check_exports()?;
        self.check_arguments()?;
        Ok(())
    }

    /// Returns true if the bean survives its condition
    ///
    /// A bean being resolved is invisible to the conditions it triggers.
    fn resolve(&mut self, id: BeanId) -> Result<bool, ContainerError> {
        match self.status(id) {
            Status::Default => {}
            Status::Resolving | Status::Deleted => return Ok(false),
            _ => return Ok(true),
        }

        self.set_status(id, Status::Resolving);
        let matched = match self.def(id).condition.clone() {
            Some(condition) => condition.matches(&mut Resolution { registry: self }),
            None => Ok(true),
        };
        let keep = matched.map_err(|error| ContainerError::Condition {
            bean: self.name(id).to_string(),
            source: Box::new(error),
        })?;

        if keep {
            tracing::debug!("Keeping bean '{}'", self.name(id));
            self.set_status(id, Status::Resolved);
        } else {
            tracing::debug!("Bean '{}' was removed by its condition", self.name(id));
            self.set_status(id, Status::Deleted);
        }
        Ok(keep)
    }

    fn index(&mut self) {
        let alive: Vec<BeanId> = self.alive().collect();
        for id in alive {
            let def = &self.beans[id.0].def;
            let mut types = vec![def.type_info.type_id];
            for export in &def.exports {
                if export.cast.is_some() && !types.contains(&export.interface.type_id) {
                    types.push(export.interface.type_id);
                }
            }
            for type_id in types {
                self.by_type.entry(type_id).or_default().push(id);
            }
            self.by_name.entry(def.name.clone()).or_default().push(id);
            if let Some(elements) = &def.elements {
                self.elements
                    .entry(elements.element.type_id)
                    .or_default()
                    .push(id);
            }
        }
    }

    fn check_duplicates(&self) -> Result<(), ContainerError> {
        let mut seen: HashMap<(&'static str, &str), BeanId> = HashMap::new();
        for id in self.alive() {
            let def = self.def(id);
            match seen.entry((def.type_info.type_name, def.name.as_str())) {
                Entry::Vacant(entry) => {
                    entry.insert(id);
                }
                Entry::Occupied(entry) => {
                    return Err(ContainerError::DuplicateRegistration {
                        type_name: def.type_info.type_name,
                        name: def.name.clone(),
                        first: self.def(*entry.get()).origin.to_string(),
                        second: def.origin.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn check_exports(&self) -> Result<(), ContainerError> {
        for id in self.alive() {
            let def = self.def(id);
            for export in &def.exports {
                if !export.interface.interface {
                    return Err(ContainerError::ExportNotInterface {
                        bean: def.name.clone(),
                        interface: export.interface.type_name,
                    });
                }
                if export.cast.is_none() && !def.provides(export.interface) {
                    return Err(ContainerError::ExportNotImplemented {
                        bean: def.name.clone(),
                        interface: export.interface.type_name,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_arguments(&self) -> Result<(), ContainerError> {
        for id in self.alive() {
            let def = self.def(id);
            let shape_error =
                |reason: String| ContainerError::InvalidBeanShape(format!("bean '{}': {reason}", def.name));

            match &def.source {
                Source::Object(_) if !def.args.is_empty() => {
                    return Err(shape_error("arguments given for an object".to_string()));
                }
                Source::Factory { parameters, .. } | Source::Method { parameters, .. } => {
                    check_arity(parameters, &def.args).map_err(shape_error)?;
                }
                Source::Object(_) => {}
            }
            for hook in def.init.iter().chain(def.destroy.iter()) {
                check_arity(&hook.parameters, &hook.args).map_err(shape_error)?;
            }
        }
        Ok(())
    }
}

// Selection
impl Registry {
    /// Candidates for the selector, with the nullable flag of a tag
    ///
    /// With a type, only beans providing it are considered.
    pub fn matching(
        &self,
        ty: Option<TypeInfo>,
        selector: &Selector,
    ) -> Result<(Vec<BeanId>, bool), ContainerError> {
        let base = |registry: &Registry| -> Vec<BeanId> {
            match ty {
                Some(ty) => registry.by_type.get(&ty.type_id).cloned().unwrap_or_default(),
                None => registry.alive().collect(),
            }
        };

        match selector {
            Selector::Type(wanted) => {
                let mut found = self.by_type.get(&wanted.type_id).cloned().unwrap_or_default();
                if let Some(ty) = ty {
                    found.retain(|id| self.def(*id).provides(ty));
                }
                Ok((found, false))
            }
            Selector::Bean(id) => {
                let found = self.is_alive(*id)
                    && ty.map_or(true, |ty| self.def(*id).provides(ty));
                Ok((found.then_some(*id).into_iter().collect(), false))
            }
            Selector::Tag(text) => {
                let tag = SingletonTag::parse(text)?;
                let mut found = base(self);
                found.retain(|id| {
                    let def = self.def(*id);
                    tag.matches(&def.name, def.type_names())
                });
                Ok((found, tag.nullable))
            }
        }
    }

    fn is_alive(&self, id: BeanId) -> bool {
        self.beans.get(id.0).is_some_and(|slot| {
            !matches!(slot.status, Status::Deleted | Status::Default | Status::Resolving)
        })
    }

    /// Live beans matching the selector
    pub fn find(&self, selector: &Selector) -> Result<Vec<BeanInfo>, ContainerError> {
        let (found, _) = self.matching(None, selector)?;
        Ok(found.into_iter().map(|id| self.def(id).info()).collect())
    }

    /// The one bean of type `ty` the selector picks, never `exclude`
    pub fn select_singleton(
        &self,
        ty: TypeInfo,
        selector: &Selector,
        exclude: Option<BeanId>,
    ) -> Result<Option<BeanId>, ContainerError> {
        let (mut candidates, nullable) = self.matching(Some(ty), selector)?;
        candidates.retain(|id| Some(*id) != exclude);
        tracing::trace!(
            "Candidates for '{selector}' of type '{ty}': {:?}",
            candidates.iter().map(|id| self.name(*id)).collect::<Vec<_>>()
        );

        if candidates.is_empty() {
            self.name_diagnostic(ty, selector);
        }
        self.pick(ty, &candidates, nullable, selector)
    }

    /// Chooses among candidates: the only one, else the only primary one
    fn pick(
        &self,
        ty: TypeInfo,
        candidates: &[BeanId],
        nullable: bool,
        selector: &dyn std::fmt::Display,
    ) -> Result<Option<BeanId>, ContainerError> {
        match candidates {
            [] if nullable => Ok(None),
            [] => Err(ContainerError::BeanNotFound {
                type_name: ty.type_name,
                selector: selector.to_string(),
            }),
            [single] => Ok(Some(*single)),
            _ => {
                let primary: Vec<BeanId> = candidates
                    .iter()
                    .copied()
                    .filter(|id| self.def(*id).primary)
                    .collect();
                match primary.as_slice() {
                    [single] => Ok(Some(*single)),
                    _ => Err(ContainerError::BeanAmbiguous {
                        type_name: ty.type_name,
                        selector: selector.to_string(),
                        candidates: candidates.iter().map(|id| self.name(*id).to_string()).collect(),
                    }),
                }
            }
        }
    }

    /// Warns about a bean that matches by name but is not indexed under the interface
    fn name_diagnostic(&self, ty: TypeInfo, selector: &Selector) {
        if !ty.interface {
            return;
        }
        let Selector::Tag(text) = selector else {
            return;
        };
        let Ok(tag) = SingletonTag::parse(text) else {
            return;
        };
        let named = self.by_name.get(&tag.name).into_iter().flatten();
        for id in named.filter(|id| !self.def(**id).provides(ty)) {
            tracing::warn!(
                "Bean '{}' of type '{}' matches '{text}' by name but does not export '{ty}' - consider adding an export",
                self.name(*id),
                self.def(*id).type_info
            );
        }
    }

    /// The members a collection tag selects, in tag order
    pub fn select_collection(
        &self,
        ty: TypeInfo,
        tag: &BeanTag,
        exclude: Option<BeanId>,
    ) -> Result<Vec<Member>, ContainerError> {
        let mut members: Vec<Member> = self
            .by_type
            .get(&ty.type_id)
            .into_iter()
            .flatten()
            .map(|id| Member::Bean(*id))
            .chain(
                self.elements
                    .get(&ty.type_id)
                    .into_iter()
                    .flatten()
                    .map(|id| Member::List(*id)),
            )
            .filter(|member| Some(member.bean()) != exclude)
            .collect();
        members.sort_by_key(|member| member.bean());

        let selected = if tag.is_unordered() {
            members
        } else {
            self.order_members(ty, tag, members)?
        };

        if selected.is_empty() && !tag.nullable {
            return Err(ContainerError::BeanNotFound {
                type_name: ty.type_name,
                selector: tag.to_string(),
            });
        }
        Ok(selected)
    }

    fn order_members(
        &self,
        ty: TypeInfo,
        tag: &BeanTag,
        members: Vec<Member>,
    ) -> Result<Vec<Member>, ContainerError> {
        let mut picked = Vec::new();
        let mut wildcard = None;
        for item in &tag.items {
            let single = match item {
                TagItem::Wildcard => {
                    wildcard = Some(picked.len());
                    continue;
                }
                TagItem::Bean(single) => single,
            };
            let candidates: Vec<BeanId> = members
                .iter()
                .filter_map(|member| match member {
                    Member::Bean(id) => Some(*id),
                    Member::List(_) => None,
                })
                .filter(|id| {
                    let def = self.def(*id);
                    single.matches(&def.name, def.type_names())
                })
                .collect();
            if let Some(id) = self.pick(ty, &candidates, single.nullable, single)? {
                picked.push(Member::Bean(id));
            }
        }

        if let Some(position) = wildcard {
            let rest: Vec<Member> = members
                .into_iter()
                .filter(|member| !picked.contains(member))
                .collect();
            picked.splice(position..position, rest);
        }
        Ok(picked)
    }

    /// The instance of the bean as `ty`, through an export cast if needed
    pub fn instance_as(&self, id: BeanId, ty: TypeInfo) -> Result<Shared, ContainerError> {
        let slot = &self.beans[id.0];
        let Some(instance) = &slot.instance else {
            return Err(ContainerError::InvalidBeanShape(format!(
                "bean '{}' has not been constructed",
                slot.def.name
            )));
        };
        if instance.info.type_id == ty.type_id {
            return Ok(instance.clone());
        }
        slot.def
            .exports
            .iter()
            .filter(|export| export.interface == ty)
            .find_map(|export| export.cast.as_ref().and_then(|cast| cast(instance)))
            .ok_or_else(|| {
                ContainerError::InvalidBeanShape(format!(
                    "bean '{}' can not be used as '{ty}'",
                    slot.def.name
                ))
            })
    }

    /// The instances a member contributes to a collection of `ty`
    pub fn materialize(&self, member: Member, ty: TypeInfo) -> Result<Vec<Shared>, ContainerError> {
        match member {
            Member::Bean(id) => Ok(vec![self.instance_as(id, ty)?]),
            Member::List(id) => {
                let slot = &self.beans[id.0];
                match (&slot.instance, &slot.def.elements) {
                    (Some(instance), Some(elements)) => Ok((elements.flatten)(instance)),
                    _ => Err(ContainerError::InvalidBeanShape(format!(
                        "bean '{}' is not a constructed list",
                        slot.def.name
                    ))),
                }
            }
        }
    }
}

/// Condition view while beans are resolved, resolves candidates on demand
struct Resolution<'a> {
    registry: &'a mut Registry,
}

impl ConditionContext for Resolution<'_> {
    fn properties(&self) -> &Properties {
        &self.registry.properties
    }

    fn find(&mut self, selector: &Selector) -> Result<Vec<BeanInfo>, ContainerError> {
        let tag = match selector {
            Selector::Tag(text) => Some(SingletonTag::parse(text)?),
            _ => None,
        };
        let mut found = Vec::new();
        for index in 0..self.registry.beans.len() {
            let id = BeanId(index);
            let def = self.registry.def(id);
            let candidate = match (selector, &tag) {
                (Selector::Type(ty), _) => def.provides(*ty),
                (Selector::Bean(wanted), _) => *wanted == id,
                (Selector::Tag(_), Some(tag)) => tag.matches(&def.name, def.type_names()),
                (Selector::Tag(_), None) => false,
            };
            if candidate && self.registry.resolve(id)? {
                found.push(self.registry.def(id).info());
            }
        }
        Ok(found)
    }
}

/// Condition view over the resolved registry
pub(crate) struct Snapshot<'a> {
    pub registry: &'a Registry,
}

impl ConditionContext for Snapshot<'_> {
    fn properties(&self) -> &Properties {
        &self.registry.properties
    }

    fn find(&mut self, selector: &Selector) -> Result<Vec<BeanInfo>, ContainerError> {
        self.registry.find(selector)
    }
}

/// Argument resolution against the running container, every bean is wired
pub(crate) struct Lookup<'a> {
    pub registry: &'a Registry,
    pub process: &'a ProcessContext,
}

impl ArgContext for Lookup<'_> {
    fn singleton(
        &mut self,
        ty: TypeInfo,
        selector: &Selector,
    ) -> Result<Option<Shared>, ContainerError> {
        match self.registry.select_singleton(ty, selector, None)? {
            Some(id) => self.registry.instance_as(id, ty).map(Some),
            None => Ok(None),
        }
    }

    fn collection(&mut self, ty: TypeInfo, tag: &str) -> Result<Vec<Shared>, ContainerError> {
        let tag = BeanTag::parse(tag)?;
        let mut collected = Vec::new();
        for member in self.registry.select_collection(ty, &tag, None)? {
            collected.extend(self.registry.materialize(member, ty)?);
        }
        Ok(collected)
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
