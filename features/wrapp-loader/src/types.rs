use std::{
    any::{Any, type_name},
    fmt::Debug,
    sync::Arc,
};

use indexmap::IndexMap;

use crate::component::{Capabilities, Component, DynComponent};

/// All errors must be Send + Sync so they can cross await points
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Readiness map - every ready component by name, in the order they became ready
pub type Components = IndexMap<String, Instance>;

/// A registered component
///
/// Cheap to clone, all clones share the same component.
#[derive(Clone)]
pub struct Instance {
    pub type_name: &'static str,
    /// Hooks the component advertised when it was wrapped
    pub capabilities: Capabilities,
    pub(crate) component: Arc<dyn DynComponent>,
    instance: Arc<dyn Any + Send + Sync>,
}
impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.type_name).finish()
    }
}

impl Instance {
    pub fn new<C: Component>(component: C) -> Self {
        Self::from_arc(Arc::new(component))
    }

    /// Wraps a component the caller keeps a handle to
    pub fn from_arc<C: Component>(component: Arc<C>) -> Self {
        let dynamic: Arc<dyn DynComponent> = component.clone();
        Instance {
            type_name: type_name::<C>(),
            capabilities: C::capabilities(),
            component: dynamic,
            instance: component,
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.type_name),
        }
    }

    /// True if both instances wrap the same component
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// True if this instance wraps exactly `component`
    pub fn is<T: Injectable>(&self, component: &Arc<T>) -> bool {
        self.downcast::<T>()
            .is_ok_and(|own| Arc::ptr_eq(&own, component))
    }
}
