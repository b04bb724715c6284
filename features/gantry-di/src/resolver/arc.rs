use std::{any::type_name, sync::Arc};

use gantry_config::ConfigError;

use crate::{
    errors::ContainerError,
    resolver::{unexpected, Arg, ArgContext, ArgQueue, Resolver},
    selector::Selector,
    types::{downcast, DependencyInfo, Injectable, TypeInfo},
};

/// A single bean: by type without a descriptor, by tag or selector otherwise
impl<T: ?Sized + Injectable> Resolver for Arc<T> {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        let ty = TypeInfo::of::<T>();
        let selector = match args.next() {
            None => Selector::Type(ty),
            Some(Arg::Literal(literal)) => return literal.take::<Arc<T>>(),
            Some(Arg::Property(expression)) => {
                Selector::Tag(ctx.binder().properties().resolve(&expression)?)
            }
            Some(Arg::Bean(selector)) => selector,
            Some(other) => return Err(unexpected(&other, type_name::<Self>())),
        };

        let shared = ctx
            .singleton(ty, &selector)?
            .ok_or_else(|| ContainerError::BeanNotFound {
                type_name: ty.type_name,
                selector: selector.to_string(),
            })?;
        downcast::<T>(&shared)
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }
}

/// All beans selected by a collection tag; without a descriptor all beans of the type
impl<T: ?Sized + Injectable> Resolver for Vec<Arc<T>> {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        let ty = TypeInfo::of::<T>();
        let tag = match args.next() {
            None => "[]?".to_string(),
            Some(Arg::Literal(literal)) => return literal.take::<Vec<Arc<T>>>(),
            Some(Arg::Property(expression)) => ctx.binder().properties().resolve(&expression)?,
            Some(Arg::Bean(Selector::Tag(tag))) => tag,
            Some(other) => return Err(unexpected(&other, type_name::<Self>())),
        };

        ctx.collection(ty, &tag)?
            .iter()
            .map(downcast::<T>)
            .collect()
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo {
            collection: true,
            ..DependencyInfo::of::<T>()
        }
    }
}

/// Missing beans and properties resolve to None
impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn resolve(ctx: &mut dyn ArgContext, args: &mut ArgQueue) -> Result<Self, ContainerError> {
        match Resolvable::resolve(ctx, args) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) => match e {
                // Only the parameter's own lookup may be missing, deeper failures are wrapped
                ContainerError::BeanNotFound { .. }
                | ContainerError::Config(ConfigError::PropertyMissing { .. }) => Ok(None),
                _ => Err(e),
            },
        }
    }

    fn dependency_info() -> DependencyInfo {
        let original = Resolvable::dependency_info();
        DependencyInfo {
            optional: true,
            ..original
        }
    }
}

