use std::{convert::Infallible, future::Future};

use crate::{
    errors::AttachError,
    types::{Components, DynError, Injectable, Instance},
};

/// A component which can be wired by the [Loader](crate::loader::Loader)
///
/// A component declares the names of the components it needs in its manifest
/// ([Component::dependencies]) and receives them through [Component::attach] once they are
/// retrieved. The lifecycle hooks are only called if they are advertised through
/// [Component::capabilities].
///
/// ```rust
/// use wrapp_loader::{AttachError, Component, Instance, Slot};
///
/// struct Service {
///     database: Slot<Database>,
/// }
/// struct Database;
/// impl Component for Database {}
///
/// impl Component for Service {
///     fn dependencies(&self) -> Vec<String> {
///         vec!["database".to_string()]
///     }
///
///     fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
///         match slot {
///             "database" => self.database.fill(dependency),
///             _ => Err(AttachError::UnknownSlot(slot.to_string())),
///         }
///     }
/// }
/// ```
pub trait Component: Injectable + Sized {
    /// Names of the components this component wants attached
    ///
    /// Read once when the component is retrieved.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fills the slot `slot` with `dependency`
    ///
    /// Called at most once per slot, while the loader holds its state lock.
    /// Must not call back into the loader.
    fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
        let _ = dependency;
        Err(AttachError::UnknownSlot(slot.to_string()))
    }

    /// Hooks this component wants to be called
    fn capabilities() -> Capabilities {
        Capabilities::NONE
    }

    /// Called once all slots are filled
    fn ready(
        &self,
        event: ReadyEvent,
    ) -> impl Future<Output = Result<(), impl Into<DynError>>> + Send + '_ {
        let _ = event;
        async { Ok::<_, Infallible>(()) }
    }

    /// Called once per dependant, after the dependant is ready
    fn used_by(
        &self,
        event: UsedByEvent,
    ) -> impl Future<Output = Result<(), impl Into<DynError>>> + Send + '_ {
        let _ = event;
        async { Ok::<_, Infallible>(()) }
    }

    /// Called once during reset, dependants before their dependencies
    fn teardown(&self) -> impl Future<Output = Result<(), impl Into<DynError>>> + Send + '_ {
        async { Ok::<_, Infallible>(()) }
    }
}

/// Wrapper Trait for components, allowing for dynamic dispatch
pub(crate) trait DynComponent: Send + Sync {
    fn dependencies(&self) -> Vec<String>;

    fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError>;

    fn ready(
        &self,
        event: ReadyEvent,
    ) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_>;

    fn used_by(
        &self,
        event: UsedByEvent,
    ) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_>;

    fn teardown(&self) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_>;
}
// Impl DynComponent for any Component
impl<C: Component> DynComponent for C {
    fn dependencies(&self) -> Vec<String> {
        Component::dependencies(self)
    }

    fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
        Component::attach(self, slot, dependency)
    }

    fn ready(
        &self,
        event: ReadyEvent,
    ) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_> {
        // Forward the call to the specific implementation
        Box::new(async move { Component::ready(self, event).await.map_err(Into::into) })
    }

    fn used_by(
        &self,
        event: UsedByEvent,
    ) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_> {
        Box::new(async move { Component::used_by(self, event).await.map_err(Into::into) })
    }

    fn teardown(&self) -> Box<dyn Future<Output = Result<(), DynError>> + Send + '_> {
        Box::new(async move { Component::teardown(self).await.map_err(Into::into) })
    }
}

/// Lifecycle hooks a component can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Ready,
    UsedBy,
    Teardown,
}
impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Hook::Ready => "ready",
            Hook::UsedBy => "used_by",
            Hook::Teardown => "teardown",
        })
    }
}

/// Set of advertised [Hook]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    ready: bool,
    used_by: bool,
    teardown: bool,
}
impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        ready: false,
        used_by: false,
        teardown: false,
    };
    pub const ALL: Capabilities = Capabilities {
        ready: true,
        used_by: true,
        teardown: true,
    };

    pub const fn with(mut self, hook: Hook) -> Self {
        match hook {
            Hook::Ready => self.ready = true,
            Hook::UsedBy => self.used_by = true,
            Hook::Teardown => self.teardown = true,
        }
        self
    }

    pub const fn has(&self, hook: Hook) -> bool {
        match hook {
            Hook::Ready => self.ready,
            Hook::UsedBy => self.used_by,
            Hook::Teardown => self.teardown,
        }
    }
}
impl FromIterator<Hook> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Hook>>(hooks: I) -> Self {
        hooks.into_iter().fold(Capabilities::NONE, Capabilities::with)
    }
}

/// Passed to [Component::ready]
#[derive(Debug, Clone)]
pub struct ReadyEvent {
    /// Name of the component becoming ready
    pub name: String,
    /// Components which were ready when the hook was called
    pub ready: Components,
}

/// Passed to [Component::used_by]
#[derive(Debug, Clone)]
pub struct UsedByEvent {
    /// Name of the component being used
    pub name: String,
    /// Components which were ready when the dependant became ready
    pub ready: Components,
    /// Name of the dependant
    pub by_name: String,
    /// The dependant itself
    pub by: Instance,
}
