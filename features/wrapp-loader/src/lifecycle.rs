use std::collections::VecDeque;

use futures_channel::oneshot;

use crate::{
    component::{Hook, UsedByEvent},
    errors::LoadError,
    types::Instance,
};

/// Readiness of a component
///
/// `NotReady` until all slots are filled and the ready hook completed, `Ready` afterwards.
#[derive(Debug, Clone)]
pub enum Readiness {
    NotReady,
    Ready(Instance),
}
impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

/// A used_by notification waiting for its target to become ready
pub(crate) struct UsedByRequest {
    pub dependant: String,
    pub instance: Instance,
}

pub(crate) type Queue = VecDeque<UsedByRequest>;

/// Someone waiting for a component to be retrieved or to become ready
pub(crate) type Waiter = oneshot::Sender<Result<(), LoadError>>;

/// A used_by notification whose target is ready
pub(crate) struct Delivery {
    pub target: Instance,
    pub event: UsedByEvent,
}
impl Delivery {
    pub async fn deliver(self) -> Result<(), LoadError> {
        let Delivery { target, event } = self;
        if !target.capabilities.has(Hook::UsedBy) {
            return Ok(());
        }

        let name = event.name.clone();
        tracing::trace!(component = %name, by = %event.by_name, "Delivering used_by");

        Box::into_pin(target.component.used_by(event))
            .await
            .map_err(|error| {
                let failure = LoadError::hook(&name, Hook::UsedBy, error);
                tracing::error!("{failure}");
                failure
            })
    }
}

/// Work left once a component entered `Ready`
pub(crate) struct Transition {
    /// Notifications queued for the component, in arrival order
    pub drained: Vec<Delivery>,
    /// Waiters for the component's readiness
    pub waiters: Vec<Waiter>,
    /// Notifications for dependencies which are ready already
    pub immediate: Vec<Delivery>,
}
impl Transition {
    /// Delivers the queue first, then wakes waiters, then notifies dependencies
    ///
    /// A failing notification does not stop the others, the first failure is returned at the end.
    pub async fn complete(self) -> Result<(), LoadError> {
        let mut first_failure = deliver_all(self.drained).await.err();

        for waiter in self.waiters {
            // Error just means the waiter was dropped
            let _ = waiter.send(Ok(()));
        }

        if let Err(failure) = deliver_all(self.immediate).await {
            first_failure.get_or_insert(failure);
        }

        first_failure.map_or(Ok(()), Err)
    }
}

/// Delivers every notification, returning the first failure
pub(crate) async fn deliver_all(deliveries: Vec<Delivery>) -> Result<(), LoadError> {
    let mut first_failure = None;
    for delivery in deliveries {
        if let Err(failure) = delivery.deliver().await {
            first_failure.get_or_insert(failure);
        }
    }
    first_failure.map_or(Ok(()), Err)
}
