use std::future::Future;

use futures::{future::BoxFuture, FutureExt};

use crate::{
    component::Component,
    types::{DynError, Instance},
};

/// What a component input provides once available
pub enum Export {
    /// The component itself
    Bare(Instance),
    /// A module whose default export is the component
    Module { default: Instance },
}
impl Export {
    /// Unwraps one level of default-export packaging
    pub fn into_instance(self) -> Instance {
        match self {
            Export::Bare(instance) | Export::Module { default: instance } => instance,
        }
    }
}
impl From<Instance> for Export {
    fn from(instance: Instance) -> Self {
        Export::Bare(instance)
    }
}

/// A component input handed to [Loader::load](crate::loader::Loader::load)
pub enum Input {
    /// Available right away
    Available(Export),
    /// Arrives once the future settles
    Pending(BoxFuture<'static, Result<Export, DynError>>),
}
impl Input {
    pub fn component<C: Component>(component: C) -> Self {
        Input::Available(Export::Bare(Instance::new(component)))
    }

    /// A module providing `default` as its default export
    pub fn module(default: Instance) -> Self {
        Input::Available(Export::Module { default })
    }

    /// An input which arrives once `future` settles
    pub fn pending<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<E, DynError>> + Send + 'static,
        E: Into<Export>,
    {
        Input::Pending(future.map(|result| result.map(Into::into)).boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Input::Pending(_))
    }
}
impl From<Instance> for Input {
    fn from(instance: Instance) -> Self {
        Input::Available(instance.into())
    }
}
impl From<Export> for Input {
    fn from(export: Export) -> Self {
        Input::Available(export)
    }
}

/// Retrieval state of a registered name
pub(crate) enum Retrieval {
    Pending,
    Retrieved(Registration),
}

/// A retrieved component and its manifest
pub(crate) struct Registration {
    pub instance: Instance,
    /// Names the component declared as dependencies
    pub manifest: Vec<String>,
}
impl Registration {
    pub fn new(instance: Instance) -> Self {
        let manifest = instance.component.dependencies();
        Registration { instance, manifest }
    }
}
