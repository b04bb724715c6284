use std::{collections::HashMap, panic::Location, sync::Arc};

use crate::{
    condition::{All, Condition},
    dependency_graph::DependencyGraph,
    errors::ContainerError,
    factories::CallFn,
    initiator::Initiator,
    resolver::{check_arity, Arg, ArgContext, ArgQueue},
    types::DependencyInfo,
};

/// A function run once after resolution, before any bean is wired
pub(crate) struct ConfigurerDefinition {
    pub name: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub condition: Option<Arc<dyn Condition>>,
    pub call: CallFn<()>,
    pub args: Vec<Arg>,
    pub parameters: Vec<DependencyInfo>,
    pub origin: &'static Location<'static>,
}

/// Handle to a registered configurer
///
/// ```rust
/// use gantry_di::DiContainer;
///
/// let mut container = DiContainer::new();
/// container.configure(|| {}).unwrap().name("logging").before(["database"]);
/// container.configure(|| {}).unwrap().name("database");
/// container.refresh().unwrap();
/// ```
pub struct ConfigurerRef<'a> {
    def: &'a mut ConfigurerDefinition,
}

impl<'a> ConfigurerRef<'a> {
    pub(crate) fn new(def: &'a mut ConfigurerDefinition) -> Self {
        ConfigurerRef { def }
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    /// Runs before the named configurers
    pub fn before<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.def.before.extend(names.into_iter().map(Into::into));
        self
    }

    /// Runs after the named configurers
    pub fn after<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.def.after.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn condition(self, condition: impl Condition) -> Self {
        let condition: Arc<dyn Condition> = Arc::new(condition);
        self.def.condition = Some(match self.def.condition.take() {
            Some(existing) => Arc::new(All(vec![existing, condition])),
            None => condition,
        });
        self
    }

    pub fn args<A: Into<Arg>>(self, args: impl IntoIterator<Item = A>) -> Self {
        self.def.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Runs the configurers whose condition matches, ordered by their before/after hints
pub(crate) fn run_all(
    configurers: Vec<ConfigurerDefinition>,
    initiator: &mut Initiator<'_>,
) -> Result<(), ContainerError> {
    let mut active = Vec::new();
    for configurer in configurers {
        if let Some(condition) = &configurer.condition {
            if !initiator.condition(condition.as_ref())? {
                tracing::debug!("Configurer '{}' was removed by its condition", configurer.name);
                continue;
            }
        }
        check_arity(&configurer.parameters, &configurer.args).map_err(|reason| {
            ContainerError::InvalidBeanShape(format!(
                "configurer '{}' at {}: {reason}",
                configurer.name, configurer.origin
            ))
        })?;
        active.push(configurer);
    }

    let order = sort(&active)?;
    tracing::debug!(
        "Configurer order: {:?}",
        order.iter().map(|i| active[*i].name.as_str()).collect::<Vec<_>>()
    );

    let mut active: Vec<Option<ConfigurerDefinition>> = active.into_iter().map(Some).collect();
    for index in order {
        let Some(configurer) = active[index].take() else {
            continue;
        };
        let mut args = ArgQueue::new(configurer.args);
        if let Err(error) = (configurer.call)(initiator, &mut args)? {
            return Err(ContainerError::callback(
                format!("configurer '{}'", configurer.name),
                error,
            ));
        }
        tracing::debug!("Ran configurer '{}'", configurer.name);
    }
    Ok(())
}

/// Edge `a -> b` if `b` is in `a.before` or `a` is in `b.after`
fn sort(configurers: &[ConfigurerDefinition]) -> Result<Vec<usize>, ContainerError> {
    let mut graph = DependencyGraph::new();
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, configurer) in configurers.iter().enumerate() {
        graph.add(configurer.name.clone());
        by_name.entry(configurer.name.as_str()).or_default().push(index);
    }

    for (index, configurer) in configurers.iter().enumerate() {
        for name in &configurer.before {
            match by_name.get(name.as_str()) {
                Some(targets) => targets.iter().for_each(|&to| graph.add_edge(index, to)),
                None => tracing::warn!(
                    "Configurer '{}' runs before unknown configurer '{name}'",
                    configurer.name
                ),
            }
        }
        for name in &configurer.after {
            match by_name.get(name.as_str()) {
                Some(sources) => sources.iter().for_each(|&from| graph.add_edge(from, index)),
                None => tracing::warn!(
                    "Configurer '{}' runs after unknown configurer '{name}'",
                    configurer.name
                ),
            }
        }
    }

    graph
        .sort()
        .map_err(|chain| ContainerError::SortingCycle { chain })
}
