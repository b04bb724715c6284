use std::{any::type_name, ops::Deref};

use gantry_config::Bind;

use crate::{
    errors::ContainerError,
    fields::Value,
    lifecycle::ProcessContext,
    resolver::{run_option, unexpected, Arg, ArgContext, ArgQueue, Resolver},
    types::{DependencyInfo, Injectable},
};

/// A property bound parameter, needs a property expression or a literal `T`
impl<T: Bind> Resolver for Value<T> {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        match args.next() {
            Some(Arg::Property(expression)) => {
                Ok(Value::new(ctx.binder().expression::<T>(&expression)?))
            }
            Some(Arg::Literal(literal)) => literal.take::<T>().map(Value::new),
            None => Err(ContainerError::InvalidBeanShape(format!(
                "parameter '{}' needs a property expression or a literal",
                type_name::<Self>()
            ))),
            Some(other) => Err(unexpected(&other, type_name::<Self>())),
        }
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }
}

impl Resolver for ProcessContext {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        match args.next() {
            None => ctx.process(),
            Some(Arg::Literal(literal)) => literal.take::<ProcessContext>(),
            Some(other) => Err(unexpected(&other, type_name::<Self>())),
        }
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<ProcessContext>()
    }
}

/// Absorbs every remaining argument, must be the last parameter
///
/// Each descriptor is resolved as one `T`. An [Arg::Option] contributes the value
/// its function returns, or nothing if its condition does not match.
pub struct Variadic<T>(pub Vec<T>);

impl<T> Variadic<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> Deref for Variadic<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Resolver + Injectable> Resolver for Variadic<T> {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        let mut items = Vec::new();
        for arg in args.drain() {
            match arg {
                Arg::Option(option) => {
                    let output = option.output;
                    let Some(value) = run_option(ctx, option)? else {
                        continue;
                    };
                    let item = value.downcast::<T>().map_err(|_| {
                        ContainerError::InvalidBeanShape(format!(
                            "option produced '{output}' for a parameter of type '{}'",
                            type_name::<T>()
                        ))
                    })?;
                    items.push(*item);
                }
                arg => items.push(T::resolve(ctx, &mut ArgQueue::new(vec![arg]))?),
            }
        }
        Ok(Variadic(items))
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo {
            variadic: true,
            ..T::dependency_info()
        }
    }
}
