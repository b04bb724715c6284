use std::sync::Arc;

use gantry_config::ConfigError;
use thiserror::Error;

use crate::types::DynError;

/// Errors raised while registering, refreshing or using a [DiContainer](crate::DiContainer)
#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    /// Registration was attempted after `refresh`
    #[error("Registration is closed - the container was already refreshed")]
    RegistrationFrozen,
    /// A runtime lookup was attempted before `refresh`
    #[error("The container has not been refreshed")]
    NotRefreshed,
    /// A bean, factory or argument list has an unusable shape
    #[error("Invalid bean shape: {0}")]
    InvalidBeanShape(String),
    /// Two live beans share a type name and a name
    #[error("Bean '{name}' of type '{type_name}' is registered twice - at {first} and at {second}")]
    DuplicateRegistration {
        type_name: &'static str,
        name: String,
        first: String,
        second: String,
    },
    /// Reading or binding a property failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required selector matched no bean
    #[error("No bean of type '{type_name}' matches '{selector}'")]
    BeanNotFound {
        type_name: &'static str,
        selector: String,
    },
    /// A selector matched several beans and none of them is primary
    #[error("'{selector}' is ambiguous for type '{type_name}' - candidates: {candidates:?}")]
    BeanAmbiguous {
        type_name: &'static str,
        selector: String,
        candidates: Vec<String>,
    },
    /// Beans depend on each other through factory arguments
    #[error("Circular wiring: {}", .path.join(" -> "))]
    CircularWiring { path: Vec<String> },

    /// A sized type was exported
    #[error("Bean '{bean}' exports '{interface}', which is not an interface")]
    ExportNotInterface {
        bean: String,
        interface: &'static str,
    },
    /// An embedded export has no cast on the outer bean
    #[error("Bean '{bean}' must implement '{interface}' to export it")]
    ExportNotImplemented {
        bean: String,
        interface: &'static str,
    },
    /// A field is both exported and injected
    #[error("Field '{field}' of bean '{bean}' is exported and injected at the same time")]
    InjectConflict { bean: String, field: String },
    /// The ordering constraints of configurers form a cycle
    #[error("Configurers are ordered in a cycle: {}", .chain.join(" -> "))]
    SortingCycle { chain: Vec<String> },
    /// A factory produced no bean
    #[error("Factory of bean '{bean}' returned nothing")]
    FactoryReturnedNil { bean: String },
    /// User code returned an error or panicked
    #[error("{callback} failed - error: {error}")]
    UserCallbackFailed {
        callback: String,
        error: Arc<DynError>,
    },
    /// A scheduled task could not be started
    #[error("Failed to spawn a scheduled task: {0}")]
    TaskSpawn(Arc<std::io::Error>),

    /// Evaluating the condition of a bean failed
    #[error("Condition of bean '{bean}' failed: {source}")]
    Condition {
        bean: String,
        source: Box<ContainerError>,
    },
    /// A failure while wiring, with the path of beans being wired
    #[error("Wiring {} failed: {source}", .path.join(" -> "))]
    Wiring {
        path: Vec<String>,
        source: Box<ContainerError>,
    },
}

impl ContainerError {
    /// The error without the bean context it was wrapped in
    pub fn root(&self) -> &ContainerError {
        let mut error = self;
        while let ContainerError::Wiring { source, .. } | ContainerError::Condition { source, .. } =
            error
        {
            error = &**source;
        }
        error
    }

    /// The beans being wired when the error happened, outermost first
    pub fn wiring_path(&self) -> Option<&[String]> {
        match self {
            ContainerError::Wiring { path, .. } => Some(path.as_slice()),
            ContainerError::Condition { source, .. } => source.wiring_path(),
            _ => None,
        }
    }

    pub(crate) fn callback(callback: impl Into<String>, error: DynError) -> Self {
        ContainerError::UserCallbackFailed {
            callback: callback.into(),
            error: Arc::new(error),
        }
    }
}

/// Panic raised by user code, caught at the container boundary
#[derive(Error, Debug)]
#[error("panicked: {0}")]
pub(crate) struct Panicked(pub String);
