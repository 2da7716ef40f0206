use std::sync::Arc;

use futures_channel::oneshot;
use thiserror::Error;

use crate::{component::Hook, dependency_graph::GraphError, types::DynError};

/// Errors of load, wait and reset operations
///
/// Clone, so one failure can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    /// A graph operation failed
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A pending input failed to settle
    #[error("Retrieving '{component}' failed - error: {error}")]
    RetrievalFailed {
        component: String,
        error: Arc<DynError>,
    },
    /// A slot could not be filled
    #[error("Attaching '{slot}' to '{component}' failed - error: {error}")]
    AttachFailed {
        component: String,
        slot: String,
        #[source]
        error: AttachError,
    },
    /// A lifecycle hook failed
    #[error("The {hook} hook of '{component}' failed - error: {error}")]
    HookFailed {
        component: String,
        hook: Hook,
        error: Arc<DynError>,
    },
    /// The loader was reset while the operation was suspended
    #[error("The loader was reset")]
    Reset,
    #[error(transparent)]
    Teardown(#[from] TeardownErrors),
}
impl LoadError {
    pub(crate) fn hook(component: &str, hook: Hook, error: DynError) -> Self {
        Self::HookFailed {
            component: component.to_string(),
            hook,
            error: Arc::new(error),
        }
    }
}
impl From<oneshot::Canceled> for LoadError {
    fn from(_: oneshot::Canceled) -> Self {
        Self::Reset
    }
}

/// Errors when filling a [Slot](crate::slot::Slot)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    /// The component has no slot with that name
    #[error("There is no slot named '{0}'")]
    UnknownSlot(String),
    /// Slots are filled exactly once
    #[error("The slot is already filled")]
    AlreadyFilled,
    #[error("The slot expects '{expected}' but got '{actual}'")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Every teardown hook failing during one reset
#[derive(Error, Debug, Clone)]
pub struct TeardownErrors {
    pub errors: Vec<LoadError>,
}
impl std::fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("One or more teardown hooks failed:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
