//! Shared fixtures for loader integration tests.
#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use wrapp_loader::{
    AttachError, Capabilities, Component, DynError, Input, Instance, ReadyEvent, Slot, UsedByEvent,
};

/// Records hook calls of every probe sharing it, in call order
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|logged| logged == entry)
            .unwrap_or_else(|| panic!("'{entry}' was never logged"))
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|logged| logged == entry)
    }
}

/// Component advertising every hook and logging each call
///
/// Has one slot per declared dependency, each taking another probe.
pub struct Probe {
    pub name: String,
    needs: Vec<String>,
    slots: Vec<(String, Slot<Probe>)>,
    log: EventLog,
    delay: Option<Duration>,
    fail_ready: bool,
    fail_used_by: bool,
    fail_teardown: bool,
}

impl Probe {
    pub fn new(name: &str, needs: &[&str], log: &EventLog) -> Self {
        Probe {
            name: name.to_string(),
            needs: needs.iter().map(|need| need.to_string()).collect(),
            slots: needs
                .iter()
                .map(|need| (need.to_string(), Slot::new()))
                .collect(),
            log: log.clone(),
            delay: None,
            fail_ready: false,
            fail_used_by: false,
            fail_teardown: false,
        }
    }

    /// Sleeps for `delay` inside the ready hook
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_ready(mut self) -> Self {
        self.fail_ready = true;
        self
    }

    pub fn failing_used_by(mut self) -> Self {
        self.fail_used_by = true;
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    pub fn input(self) -> Input {
        Input::component(self)
    }

    /// The probe attached to `slot`
    pub fn slot(&self, slot: &str) -> Option<Arc<Probe>> {
        self.slots
            .iter()
            .find(|(name, _)| name == slot)
            .and_then(|(_, own)| own.get())
    }
}

impl Component for Probe {
    fn dependencies(&self) -> Vec<String> {
        self.needs.clone()
    }

    fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
        match self.slots.iter().find(|(name, _)| name == slot) {
            Some((_, own)) => own.fill(dependency),
            None => Err(AttachError::UnknownSlot(slot.to_string())),
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities::ALL
    }

    async fn ready(&self, event: ReadyEvent) -> Result<(), DynError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ready {
            return Err(format!("{} refused to start", event.name).into());
        }

        self.log.push(format!("ready {}", self.name));
        Ok(())
    }

    async fn used_by(&self, event: UsedByEvent) -> Result<(), DynError> {
        self.log
            .push(format!("used_by {} by {}", event.name, event.by_name));
        if self.fail_used_by {
            return Err(format!("{} rejected {}", self.name, event.by_name).into());
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DynError> {
        self.log.push(format!("teardown {}", self.name));
        if self.fail_teardown {
            return Err(format!("{} refused to stop", self.name).into());
        }
        Ok(())
    }
}

/// The probe registered as `name`
pub fn probe(components: &wrapp_loader::Components, name: &str) -> Arc<Probe> {
    components[name].downcast::<Probe>().unwrap()
}
