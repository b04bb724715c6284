use std::{
    any::{type_name, Any},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    errors::{ContainerError, Panicked},
    fields::Bean,
    resolver::{ArgContext, ArgQueue, Resolver},
    types::{DependencyInfo, DynError, Injectable, Shared},
};

/// A function whose parameters are resolved by the container
///
/// Implemented for closures and fn items taking up to eight [Resolver] parameters.
pub trait Injector<Args>: Injectable {
    type Output;

    /// Returns a list of the parameters the function requires
    fn parameters() -> Vec<DependencyInfo>;

    /// Resolves every parameter, then calls the function
    fn invoke(
        &self,
        ctx: &mut dyn ArgContext,
        args: &mut ArgQueue,
    ) -> Result<Self::Output, ContainerError>;
}

/// Like [Injector], for functions taking a `&Recv` receiver first
pub trait Method<Recv: ?Sized, Args>: Injectable {
    type Output;

    fn parameters() -> Vec<DependencyInfo>;

    fn invoke(
        &self,
        receiver: &Recv,
        ctx: &mut dyn ArgContext,
        args: &mut ArgQueue,
    ) -> Result<Self::Output, ContainerError>;
}

macro_rules! impl_injector {
    ($($param:ident),*) => {
        #[allow(non_snake_case, unused_variables)]
        impl<Func, Out, $($param,)*> Injector<($($param,)*)> for Func
        where
            Func: Fn($($param),*) -> Out + Send + Sync + 'static,
            $($param: Resolver,)*
        {
            type Output = Out;

            fn parameters() -> Vec<DependencyInfo> {
                vec![$(<$param as Resolver>::dependency_info()),*]
            }

            fn invoke(
                &self,
                ctx: &mut dyn ArgContext,
                args: &mut ArgQueue,
            ) -> Result<Out, ContainerError> {
                $(let $param = <$param as Resolver>::resolve(ctx, args)?;)*
                args.ensure_consumed()?;
                Ok(self($($param),*))
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<Func, Recv, Out, $($param,)*> Method<Recv, ($($param,)*)> for Func
        where
            Func: Fn(&Recv, $($param),*) -> Out + Send + Sync + 'static,
            Recv: ?Sized,
            $($param: Resolver,)*
        {
            type Output = Out;

            fn parameters() -> Vec<DependencyInfo> {
                vec![$(<$param as Resolver>::dependency_info()),*]
            }

            fn invoke(
                &self,
                receiver: &Recv,
                ctx: &mut dyn ArgContext,
                args: &mut ArgQueue,
            ) -> Result<Out, ContainerError> {
                $(let $param = <$param as Resolver>::resolve(ctx, args)?;)*
                args.ensure_consumed()?;
                Ok(self(receiver, $($param),*))
            }
        }
    };
}

impl_injector!();
impl_injector!(A1);
impl_injector!(A1, A2);
impl_injector!(A1, A2, A3);
impl_injector!(A1, A2, A3, A4);
impl_injector!(A1, A2, A3, A4, A5);
impl_injector!(A1, A2, A3, A4, A5, A6);
impl_injector!(A1, A2, A3, A4, A5, A6, A7);
impl_injector!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Markers selecting the [IntoBean] conversion of a factory result
pub mod markers {
    pub struct Plain;
    pub struct Shared;
    pub struct Optional;
    pub struct Fallible;
    pub struct FallibleShared;
}

/// The result of a factory: `T`, `Arc<T>`, `Option<T>`, `Result<T, E>` or `Result<Arc<T>, E>`
pub trait IntoBean<Marker> {
    type Bean: Bean;

    /// None means the factory produced nothing
    fn into_bean(self) -> Result<Option<Arc<Self::Bean>>, DynError>;
}

impl<T: Bean> IntoBean<markers::Plain> for T {
    type Bean = T;

    fn into_bean(self) -> Result<Option<Arc<T>>, DynError> {
        Ok(Some(Arc::new(self)))
    }
}

impl<T: Bean> IntoBean<markers::Shared> for Arc<T> {
    type Bean = T;

    fn into_bean(self) -> Result<Option<Arc<T>>, DynError> {
        Ok(Some(self))
    }
}

impl<T: Bean> IntoBean<markers::Optional> for Option<T> {
    type Bean = T;

    fn into_bean(self) -> Result<Option<Arc<T>>, DynError> {
        Ok(self.map(Arc::new))
    }
}

impl<T: Bean, E: Into<DynError>> IntoBean<markers::Fallible> for Result<T, E> {
    type Bean = T;

    fn into_bean(self) -> Result<Option<Arc<T>>, DynError> {
        self.map(|bean| Some(Arc::new(bean))).map_err(Into::into)
    }
}

impl<T: Bean, E: Into<DynError>> IntoBean<markers::FallibleShared> for Result<Arc<T>, E> {
    type Bean = T;

    fn into_bean(self) -> Result<Option<Arc<T>>, DynError> {
        self.map(Some).map_err(Into::into)
    }
}

/// The result of a hook, configurer or invoked function: `()` or `Result<(), E>`
pub trait HookOutput {
    fn into_result(self) -> Result<(), DynError>;
}

impl HookOutput for () {
    fn into_result(self) -> Result<(), DynError> {
        Ok(())
    }
}

impl<E: Into<DynError>> HookOutput for Result<(), E> {
    fn into_result(self) -> Result<(), DynError> {
        self.map_err(Into::into)
    }
}

/// Type erased [Injector], the inner error is the user's
pub(crate) type CallFn<R> = Arc<
    dyn Fn(&mut dyn ArgContext, &mut ArgQueue) -> Result<Result<R, DynError>, ContainerError>
        + Send
        + Sync,
>;

/// Type erased [Method], the receiver is the [Shared] bean
pub(crate) type MethodFn<R> = Arc<
    dyn Fn(&Shared, &mut dyn ArgContext, &mut ArgQueue) -> Result<Result<R, DynError>, ContainerError>
        + Send
        + Sync,
>;

/// Runs user code, turning a panic into a user error
pub(crate) fn guard<R>(
    call: impl FnOnce() -> Result<Result<R, DynError>, ContainerError>,
) -> Result<Result<R, DynError>, ContainerError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Ok(Err(Box::new(Panicked(panic_message(payload.as_ref()))))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

pub(crate) fn factory_fn<Args, Marker, F>(factory: F) -> CallFn<Option<Shared>>
where
    Args: 'static,
    Marker: 'static,
    F: Injector<Args>,
    F::Output: IntoBean<Marker>,
{
    Arc::new(move |ctx: &mut dyn ArgContext, args: &mut ArgQueue| {
        guard(|| {
            let product = factory.invoke(ctx, args)?;
            Ok(product.into_bean().map(|bean| bean.map(Shared::new)))
        })
    })
}

pub(crate) fn method_factory_fn<Recv, Args, Marker, F>(factory: F) -> MethodFn<Option<Shared>>
where
    Recv: ?Sized + Injectable,
    Args: 'static,
    Marker: 'static,
    F: Method<Recv, Args>,
    F::Output: IntoBean<Marker>,
{
    Arc::new(
        move |receiver: &Shared, ctx: &mut dyn ArgContext, args: &mut ArgQueue| {
            let receiver = receiver_of::<Recv>(receiver)?;
            guard(|| {
                let product = factory.invoke(&receiver, ctx, args)?;
                Ok(product.into_bean().map(|bean| bean.map(Shared::new)))
            })
        },
    )
}

pub(crate) fn hook_fn<Recv, Args, F>(hook: F) -> MethodFn<()>
where
    Recv: ?Sized + Injectable,
    Args: 'static,
    F: Method<Recv, Args>,
    F::Output: HookOutput,
{
    Arc::new(
        move |receiver: &Shared, ctx: &mut dyn ArgContext, args: &mut ArgQueue| {
            let receiver = receiver_of::<Recv>(receiver)?;
            guard(|| Ok(hook.invoke(&receiver, ctx, args)?.into_result()))
        },
    )
}

pub(crate) fn call_fn<Args, F>(call: F) -> CallFn<()>
where
    Args: 'static,
    F: Injector<Args>,
    F::Output: HookOutput,
{
    Arc::new(move |ctx: &mut dyn ArgContext, args: &mut ArgQueue| {
        guard(|| Ok(call.invoke(ctx, args)?.into_result()))
    })
}

pub(crate) fn option_fn<Args, F>(option: F) -> CallFn<Box<dyn Any + Send + Sync>>
where
    Args: 'static,
    F: Injector<Args>,
    F::Output: Injectable,
{
    Arc::new(move |ctx: &mut dyn ArgContext, args: &mut ArgQueue| {
        guard(|| {
            let value = option.invoke(ctx, args)?;
            Ok(Ok(Box::new(value) as Box<dyn Any + Send + Sync>))
        })
    })
}

fn receiver_of<Recv: ?Sized + Injectable>(shared: &Shared) -> Result<Arc<Recv>, ContainerError> {
    shared.downcast::<Recv>().ok_or_else(|| {
        ContainerError::InvalidBeanShape(format!(
            "receiver must be '{}', found '{}'",
            type_name::<Recv>(),
            shared.info
        ))
    })
}
