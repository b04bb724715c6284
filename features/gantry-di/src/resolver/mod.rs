use std::{
    any::{type_name, Any},
    collections::VecDeque,
    fmt::Debug,
    sync::Arc,
};

use gantry_config::Binder;

use crate::{
    condition::Condition,
    definition::BeanId,
    errors::ContainerError,
    factories::CallFn,
    lifecycle::ProcessContext,
    selector::Selector,
    types::{DependencyInfo, Injectable, Shared, TypeInfo},
};

pub mod arc;
pub mod value;

/// Allows custom behaviour on injection
///
/// Implemented by every parameter type of factories, hooks, configurers and
/// [DiContainer::invoke](crate::DiContainer::invoke) targets.
pub trait Resolver: Sized {
    /// Resolves the parameter, consuming its argument descriptor if one is left
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError>;

    fn dependency_info() -> DependencyInfo;
}

/// Access to the container while arguments are resolved
pub trait ArgContext {
    /// The single bean of type `ty` matching the selector, wired
    ///
    /// Returns None only for a nullable selector without candidate.
    fn singleton(
        &mut self,
        ty: TypeInfo,
        selector: &Selector,
    ) -> Result<Option<Shared>, ContainerError>;

    /// The beans of type `ty` selected by a collection tag, wired
    fn collection(&mut self, ty: TypeInfo, tag: &str) -> Result<Vec<Shared>, ContainerError>;

    fn binder(&self) -> Binder<'_>;

    fn condition(&mut self, condition: &dyn Condition) -> Result<bool, ContainerError>;

    fn process(&self) -> Result<ProcessContext, ContainerError>;
}

/// An argument descriptor
pub enum Arg {
    /// Resolve the parameter by its type
    Auto,
    /// A ready value, its type must match the parameter
    Literal(Literal),
    /// A `${key:=default}` expression, bound into the parameter
    Property(String),
    /// A bean selector
    Bean(Selector),
    /// A deferred, conditional contribution to a [Variadic](value::Variadic) parameter
    Option(OptionArg),
}

impl Arg {
    pub fn literal<T: Injectable>(value: T) -> Self {
        Arg::Literal(Literal {
            type_name: type_name::<T>(),
            value: Box::new(value),
        })
    }

    pub fn property(expression: impl Into<String>) -> Self {
        Arg::Property(expression.into())
    }

    pub fn bean(selector: impl Into<Selector>) -> Self {
        Arg::Bean(selector.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Arg::Auto => "auto",
            Arg::Literal(_) => "literal",
            Arg::Property(_) => "property",
            Arg::Bean(_) => "bean",
            Arg::Option(_) => "option",
        }
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Auto => f.write_str("Auto"),
            Arg::Literal(literal) => f.debug_tuple("Literal").field(&literal.type_name).finish(),
            Arg::Property(expression) => f.debug_tuple("Property").field(expression).finish(),
            Arg::Bean(selector) => f.debug_tuple("Bean").field(selector).finish(),
            Arg::Option(option) => f.debug_tuple("Option").field(&option.output).finish(),
        }
    }
}

/// Strings starting with `${` are property expressions, all others bean tags
impl From<&str> for Arg {
    fn from(text: &str) -> Self {
        Arg::from(text.to_string())
    }
}

impl From<String> for Arg {
    fn from(text: String) -> Self {
        if text.trim_start().starts_with("${") {
            Arg::Property(text)
        } else {
            Arg::Bean(Selector::Tag(text))
        }
    }
}

impl From<Selector> for Arg {
    fn from(selector: Selector) -> Self {
        Arg::Bean(selector)
    }
}

impl From<BeanId> for Arg {
    fn from(id: BeanId) -> Self {
        Arg::Bean(Selector::Bean(id))
    }
}

impl From<OptionArg> for Arg {
    fn from(option: OptionArg) -> Self {
        Arg::Option(option)
    }
}

/// A boxed literal argument
pub struct Literal {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Literal {
    /// Takes the value out if it has the type `T`
    pub fn take<T: 'static>(self) -> Result<T, ContainerError> {
        let type_name = self.type_name;
        self.value.downcast::<T>().map(|value| *value).map_err(|_| {
            ContainerError::InvalidBeanShape(format!(
                "literal of type '{type_name}' given for a parameter of type '{}'",
                std::any::type_name::<T>()
            ))
        })
    }
}

/// A deferred call contributing one value to a variadic parameter
pub struct OptionArg {
    pub(crate) condition: Option<Arc<dyn Condition>>,
    pub(crate) call: CallFn<Box<dyn Any + Send + Sync>>,
    pub(crate) args: Vec<Arg>,
    pub(crate) parameters: Vec<DependencyInfo>,
    pub(crate) output: &'static str,
}

impl OptionArg {
    /// Only contributes if the condition matches
    pub fn on(mut self, condition: impl Condition) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Argument descriptors of the option's own function
    pub fn args<A: Into<Arg>>(mut self, args: impl IntoIterator<Item = A>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Descriptors of a call, consumed front to back
#[derive(Debug, Default)]
pub struct ArgQueue {
    args: VecDeque<Arg>,
}

impl ArgQueue {
    pub(crate) fn new(args: Vec<Arg>) -> Self {
        ArgQueue { args: args.into() }
    }

    /// The next descriptor, None if exhausted or [Arg::Auto]
    pub fn next(&mut self) -> Option<Arg> {
        match self.args.pop_front() {
            Some(Arg::Auto) | None => None,
            arg => arg,
        }
    }

    /// All remaining descriptors
    pub fn drain(&mut self) -> Vec<Arg> {
        self.args.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub(crate) fn ensure_consumed(&self) -> Result<(), ContainerError> {
        if self.args.is_empty() {
            return Ok(());
        }
        Err(ContainerError::InvalidBeanShape(format!(
            "{} arguments left over after the call",
            self.args.len()
        )))
    }
}

/// Fails for a descriptor the parameter can not use
pub(crate) fn unexpected(arg: &Arg, parameter: &'static str) -> ContainerError {
    ContainerError::InvalidBeanShape(format!(
        "a {} argument can not be used for a parameter of type '{parameter}'",
        arg.kind()
    ))
}

/// Evaluates an option: None if its condition does not match
pub(crate) fn run_option(
    ctx: &mut dyn ArgContext,
    option: OptionArg,
) -> Result<Option<Box<dyn Any + Send + Sync>>, ContainerError> {
    if let Some(condition) = &option.condition {
        if !ctx.condition(condition.as_ref())? {
            tracing::trace!("Skipping option producing '{}'", option.output);
            return Ok(None);
        }
    }
    let mut queue = ArgQueue::new(option.args);
    match (option.call)(ctx, &mut queue)? {
        Ok(value) => Ok(Some(value)),
        Err(error) => Err(ContainerError::callback(
            format!("option producing '{}'", option.output),
            error,
        )),
    }
}

/// Checks descriptors against the parameters they are meant for
pub(crate) fn check_arity(parameters: &[DependencyInfo], args: &[Arg]) -> Result<(), String> {
    let variadic = parameters.last().is_some_and(|last| last.variadic);
    if !variadic && args.len() > parameters.len() {
        return Err(format!(
            "{} arguments given for {} parameters",
            args.len(),
            parameters.len()
        ));
    }
    for (index, arg) in args.iter().enumerate() {
        let Arg::Option(option) = arg else {
            continue;
        };
        if !variadic || index + 1 < parameters.len() {
            return Err(format!(
                "option argument {index} does not target a variadic parameter"
            ));
        }
        check_arity(&option.parameters, &option.args)?;
    }
    Ok(())
}
