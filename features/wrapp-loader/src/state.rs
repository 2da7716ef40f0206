use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use futures_channel::oneshot;

use crate::{
    component::{Hook, ReadyEvent, UsedByEvent},
    dependency_graph::{DependencyGraph, GraphOptions},
    errors::LoadError,
    lifecycle::{Delivery, Queue, Transition, UsedByRequest, Waiter},
    retrieval::{Export, Input, Registration, Retrieval},
    types::{Components, DynError, Instance},
};

pub(crate) type WaitReceiver = oneshot::Receiver<Result<(), LoadError>>;

/// Everything one loader knows, behind its lock
///
/// Each method runs to completion without suspending.
pub(crate) struct LoaderState {
    /// Bumped on every reset, stale work compares against it
    pub generation: u64,
    /// Always circular - mutual dependencies are allowed
    pub graph: DependencyGraph<Instance>,
    retrieval: HashMap<String, Retrieval>,
    /// Ready components in the order they became ready
    pub ready: Components,
    /// Components which will never become ready
    failures: HashMap<String, LoadError>,
    /// Filled (component, slot) pairs
    attached: HashSet<(String, String)>,
    /// Delivered or queued (dependency, dependant) pairs
    notified: HashSet<(String, String)>,
    queues: HashMap<String, Queue>,
    retrieval_waiters: HashMap<String, Vec<Waiter>>,
    ready_waiters: HashMap<String, Vec<Waiter>>,
}

/// Work resulting from registering one batch of inputs
pub(crate) struct Batch {
    pub generation: u64,
    /// Retrieved while registering
    pub available: Vec<String>,
    pub pending: Vec<(String, BoxFuture<'static, Result<Export, DynError>>)>,
    /// Earlier components which gained dependencies through this batch
    pub late: Vec<String>,
}

impl LoaderState {
    pub fn new(generation: u64) -> Self {
        LoaderState {
            generation,
            graph: DependencyGraph::with_options(GraphOptions { circular: true }),
            retrieval: HashMap::new(),
            ready: Components::new(),
            failures: HashMap::new(),
            attached: HashSet::new(),
            notified: HashSet::new(),
            queues: HashMap::new(),
            retrieval_waiters: HashMap::new(),
            ready_waiters: HashMap::new(),
        }
    }

    /// Fails if the loader was reset since `generation`
    pub fn check(&self, generation: u64) -> Result<(), LoadError> {
        if self.generation != generation {
            return Err(LoadError::Reset);
        }
        Ok(())
    }

    /// Registers a batch of inputs
    ///
    /// Available inputs are retrieved right away, then every retrieved component
    /// reflects its manifest against the grown set of names.
    pub fn register(&mut self, inputs: impl IntoIterator<Item = (String, Input)>) -> Batch {
        let earlier: Vec<String> = self
            .graph
            .nodes()
            .filter(|name| self.is_retrieved(name))
            .map(str::to_string)
            .collect();

        let mut available = Vec::new();
        let mut pending = Vec::new();
        for (name, input) in inputs {
            if self.graph.has_node(&name) {
                tracing::warn!(component = %name, "Component is already registered - ignoring");
                continue;
            }

            self.graph.add_node(name.clone());
            self.retrieval.insert(name.clone(), Retrieval::Pending);
            match input {
                Input::Available(export) => available.push((name, export.into_instance())),
                Input::Pending(future) => pending.push((name, future)),
            }
        }

        let mut retrieved = Vec::with_capacity(available.len());
        for (name, instance) in available {
            self.retrieve(&name, instance);
            retrieved.push(name);
        }
        for name in &retrieved {
            self.reflect(name);
        }
        let late: Vec<String> = earlier
            .into_iter()
            .filter(|name| self.reflect(name) > 0)
            .collect();

        tracing::debug!(
            "Registered {} available and {} pending components, {} earlier components gained dependencies",
            retrieved.len(),
            pending.len(),
            late.len()
        );

        Batch {
            generation: self.generation,
            available: retrieved,
            pending,
            late,
        }
    }

    /// Records a settled pending input
    pub fn settle(&mut self, name: &str, instance: Instance) {
        self.retrieve(name, instance);
        self.reflect(name);
    }

    fn retrieve(&mut self, name: &str, instance: Instance) {
        // Node exists - it was added on registration
        let _ = self.graph.set_node_data(name, instance.clone());
        self.retrieval
            .insert(name.to_string(), Retrieval::Retrieved(Registration::new(instance)));

        for waiter in self.retrieval_waiters.remove(name).into_iter().flatten() {
            let _ = waiter.send(Ok(()));
        }
        tracing::debug!(component = %name, "Retrieved");
    }

    /// Adds an edge for every manifest entry naming a known component
    ///
    /// Returns the number of new edges.
    fn reflect(&mut self, name: &str) -> usize {
        let Some(Retrieval::Retrieved(registration)) = self.retrieval.get(name) else {
            return 0;
        };

        let mut added = 0;
        for dependency in &registration.manifest {
            if dependency == name
                || !self.graph.has_node(dependency)
                || self.graph.has_dependency(name, dependency)
            {
                continue;
            }

            if self.graph.add_dependency(name, dependency).is_ok() {
                tracing::trace!(component = %name, dependency = %dependency, "Discovered dependency");
                added += 1;
            }
        }
        added
    }

    pub fn is_retrieved(&self, name: &str) -> bool {
        matches!(self.retrieval.get(name), Some(Retrieval::Retrieved(_)))
    }

    /// The retrieved instance of `name`
    pub fn instance(&self, name: &str) -> Option<Instance> {
        match self.retrieval.get(name) {
            Some(Retrieval::Retrieved(registration)) => Some(registration.instance.clone()),
            _ => None,
        }
    }

    /// Receivers for every dependency of `name` which is not retrieved yet
    ///
    /// Empty once the whole transitive closure is retrieved. Fails if one of them
    /// failed to be retrieved.
    pub fn unretrieved_closure(&mut self, name: &str) -> Result<Vec<WaitReceiver>, LoadError> {
        let mut waiting = Vec::new();
        for dependency in self.graph.dependencies_of(name, false)? {
            if self.is_retrieved(&dependency) {
                continue;
            }
            if let Some(failure) = self.failures.get(&dependency) {
                return Err(failure.clone());
            }

            let (tx, rx) = oneshot::channel();
            self.retrieval_waiters.entry(dependency).or_default().push(tx);
            waiting.push(rx);
        }
        Ok(waiting)
    }

    /// Fills every unfilled slot of `name` and of its transitive dependencies
    pub fn attach_closure(&mut self, name: &str) -> Result<(), LoadError> {
        let mut components = self.graph.dependencies_of(name, false)?;
        components.push(name.to_string());

        for component in components {
            let Some(Retrieval::Retrieved(registration)) = self.retrieval.get(&component) else {
                continue;
            };

            for slot in self.graph.direct_dependencies_of(&component)? {
                let key = (component.clone(), slot.to_string());
                if self.attached.contains(&key) {
                    continue;
                }
                let Some(Retrieval::Retrieved(dependency)) = self.retrieval.get(slot) else {
                    continue;
                };

                registration
                    .instance
                    .component
                    .attach(slot, &dependency.instance)
                    .map_err(|error| LoadError::AttachFailed {
                        component: component.clone(),
                        slot: slot.to_string(),
                        error,
                    })?;

                tracing::trace!(component = %component, slot = %slot, "Attached");
                self.attached.insert(key);
            }
        }

        Ok(())
    }

    /// Receivers for the direct dependencies `name` has to wait for before it can become ready
    ///
    /// Dependencies which also depend on `name` are skipped, they could never both be first.
    pub fn blocking_dependencies(&mut self, name: &str) -> Result<Vec<WaitReceiver>, LoadError> {
        let dependencies: Vec<String> = self
            .graph
            .direct_dependencies_of(name)?
            .map(str::to_string)
            .collect();

        let mut waiting = Vec::new();
        for dependency in dependencies {
            if self.ready.contains_key(&dependency) {
                continue;
            }
            if self
                .graph
                .dependencies_of(&dependency, false)?
                .iter()
                .any(|transitive| transitive == name)
            {
                continue;
            }

            waiting.push(self.add_ready_waiter(&dependency));
        }
        Ok(waiting)
    }

    /// Resolves once `name` is ready, or with the failure which keeps it from getting there
    pub fn add_ready_waiter(&mut self, name: &str) -> WaitReceiver {
        let (tx, rx) = oneshot::channel();

        if self.ready.contains_key(name) {
            let _ = tx.send(Ok(()));
            return rx;
        }
        if let Some(failure) = self.failures.get(name) {
            let _ = tx.send(Err(failure.clone()));
            return rx;
        }

        self.ready_waiters
            .entry(name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub fn ready_event(&self, name: &str) -> ReadyEvent {
        ReadyEvent {
            name: name.to_string(),
            ready: self.ready.clone(),
        }
    }

    /// Moves `name` to `Ready`
    ///
    /// Drains its queue and queues or prepares notifications for its dependencies in the same step,
    /// so no notification can slip in between.
    pub fn enter_ready(&mut self, name: &str, instance: Instance) -> Transition {
        self.ready.insert(name.to_string(), instance.clone());

        let drained: Vec<Delivery> = self
            .queues
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .map(|request| Delivery {
                target: instance.clone(),
                event: UsedByEvent {
                    name: name.to_string(),
                    ready: self.ready.clone(),
                    by_name: request.dependant,
                    by: request.instance,
                },
            })
            .collect();

        let immediate = self.notify_dependencies(name, &instance);
        let waiters = self.ready_waiters.remove(name).unwrap_or_default();

        tracing::debug!(component = %name, queued = drained.len(), "Ready");
        Transition {
            drained,
            waiters,
            immediate,
        }
    }

    /// Notifications for dependencies of `name` not informed yet
    ///
    /// Ready dependencies are returned for immediate delivery, the others get the
    /// notification queued.
    fn notify_dependencies(&mut self, name: &str, instance: &Instance) -> Vec<Delivery> {
        let Ok(dependencies) = self.graph.direct_dependencies_of(name) else {
            return Vec::new();
        };

        let mut immediate = Vec::new();
        for dependency in dependencies {
            if !self
                .notified
                .insert((dependency.to_string(), name.to_string()))
            {
                continue;
            }

            match self.ready.get(dependency) {
                Some(target) => immediate.push(Delivery {
                    target: target.clone(),
                    event: UsedByEvent {
                        name: dependency.to_string(),
                        ready: self.ready.clone(),
                        by_name: name.to_string(),
                        by: instance.clone(),
                    },
                }),
                None => {
                    tracing::trace!(component = %dependency, by = %name, "Queued used_by");
                    self.queues
                        .entry(dependency.to_string())
                        .or_default()
                        .push_back(UsedByRequest {
                            dependant: name.to_string(),
                            instance: instance.clone(),
                        });
                }
            }
        }
        immediate
    }

    /// Notifications for dependencies a ready component gained through a later batch
    pub fn late_deliveries(&mut self, name: &str) -> Vec<Delivery> {
        match self.ready.get(name).cloned() {
            Some(instance) => self.notify_dependencies(name, &instance),
            None => Vec::new(),
        }
    }

    /// Records that `name` will never become ready and hands `failure` to everyone waiting on it
    ///
    /// Ready components keep their state, a failed notification does not undo readiness.
    pub fn fail(&mut self, name: &str, failure: LoadError) {
        if self.ready.contains_key(name) || self.failures.contains_key(name) {
            return;
        }
        self.failures.insert(name.to_string(), failure.clone());

        let retrieval = self.retrieval_waiters.remove(name).into_iter().flatten();
        let ready = self.ready_waiters.remove(name).into_iter().flatten();
        for waiter in retrieval.chain(ready) {
            let _ = waiter.send(Err(failure.clone()));
        }
        tracing::debug!(component = %name, "Failed");
    }

    /// Components with a teardown hook, in teardown order
    ///
    /// Dependants come before their dependencies. With `strict` a cyclic graph is refused.
    pub fn teardown_plan(&self, strict: bool) -> Result<Vec<(String, Instance)>, LoadError> {
        let order = if strict {
            let mut graph = self.graph.clone();
            graph.set_circular(false);
            graph.overall_order(false)?
        } else {
            self.graph.overall_order(false)?
        };

        Ok(order
            .into_iter()
            .rev()
            .filter_map(|name| {
                let instance = self.instance(&name)?;
                instance
                    .capabilities
                    .has(Hook::Teardown)
                    .then_some((name, instance))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::Component, errors::AttachError, slot::Slot};

    #[derive(Default)]
    struct Node {
        needs: Vec<String>,
        slots: Vec<(String, Slot<Node>)>,
    }
    impl Node {
        fn needing(needs: &[&str]) -> Instance {
            Instance::new(Node {
                needs: needs.iter().map(|n| n.to_string()).collect(),
                slots: needs.iter().map(|n| (n.to_string(), Slot::new())).collect(),
            })
        }
    }
    impl Component for Node {
        fn dependencies(&self) -> Vec<String> {
            self.needs.clone()
        }

        fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
            match self.slots.iter().find(|(name, _)| name == slot) {
                Some((_, own)) => own.fill(dependency),
                None => Err(AttachError::UnknownSlot(slot.to_string())),
            }
        }
    }

    fn inputs(components: Vec<(&str, Instance)>) -> Vec<(String, Input)> {
        components
            .into_iter()
            .map(|(name, instance)| (name.to_string(), Input::from(instance)))
            .collect()
    }

    #[test]
    fn register_reflects_known_names_only() {
        let mut state = LoaderState::new(0);
        let batch = state.register(inputs(vec![
            ("a", Node::needing(&["b", "unknown"])),
            ("b", Node::needing(&[])),
        ]));

        assert_eq!(batch.available, ["a", "b"]);
        assert!(batch.late.is_empty());
        assert!(state.graph.has_dependency("a", "b"));
        assert!(!state.graph.has_node("unknown"));
    }

    #[test]
    fn later_batch_extends_earlier_components() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![("a", Node::needing(&["b"]))]));
        assert_eq!(state.graph.direct_dependencies_of("a").unwrap().count(), 0);

        let batch = state.register(inputs(vec![("b", Node::needing(&[]))]));
        assert_eq!(batch.late, ["a"]);
        assert!(state.graph.has_dependency("a", "b"));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut state = LoaderState::new(0);
        let first = Node::needing(&[]);
        state.register(inputs(vec![("a", first.clone())]));
        let batch = state.register(inputs(vec![("a", Node::needing(&[]))]));

        assert!(batch.available.is_empty());
        assert!(state.instance("a").unwrap().ptr_eq(&first));
    }

    #[test]
    fn attach_fills_each_slot_once() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![
            ("a", Node::needing(&["b"])),
            ("b", Node::needing(&["a"])),
        ]));

        state.attach_closure("a").unwrap();
        // Filling again would fail with AlreadyFilled
        state.attach_closure("b").unwrap();

        let a = state.instance("a").unwrap().downcast::<Node>().unwrap();
        let b = state.instance("b").unwrap();
        assert!(b.is(&a.slots[0].1.get().unwrap()));
    }

    #[test]
    fn queued_notifications_drain_on_ready() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![
            ("a", Node::needing(&["c"])),
            ("b", Node::needing(&["c"])),
            ("c", Node::needing(&[])),
        ]));

        for name in ["b", "a"] {
            let instance = state.instance(name).unwrap();
            let transition = state.enter_ready(name, instance);
            assert!(transition.immediate.is_empty());
        }

        let transition = state.enter_ready("c", state.instance("c").unwrap());
        let dependants: Vec<_> = transition
            .drained
            .iter()
            .map(|delivery| delivery.event.by_name.as_str())
            .collect();
        assert_eq!(dependants, ["b", "a"]);
    }

    #[test]
    fn failure_reaches_waiters_and_later_dependants() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![
            ("a", Node::needing(&["b"])),
            ("b", Node::needing(&[])),
        ]));
        let mut waiting = state.blocking_dependencies("a").unwrap();

        state.fail("b", LoadError::Reset);

        assert!(matches!(waiting[0].try_recv(), Ok(Some(Err(LoadError::Reset)))));
        let mut late = state.add_ready_waiter("b");
        assert!(matches!(late.try_recv(), Ok(Some(Err(LoadError::Reset)))));
    }

    #[test]
    fn ready_components_cannot_fail() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![("a", Node::needing(&[]))]));
        state.enter_ready("a", state.instance("a").unwrap());

        state.fail("a", LoadError::Reset);

        let mut waiting = state.add_ready_waiter("a");
        assert!(matches!(waiting.try_recv(), Ok(Some(Ok(())))));
    }

    #[test]
    fn mutual_dependencies_do_not_block_each_other() {
        let mut state = LoaderState::new(0);
        state.register(inputs(vec![
            ("a", Node::needing(&["b"])),
            ("b", Node::needing(&["a"])),
            ("c", Node::needing(&["a"])),
        ]));

        assert!(state.blocking_dependencies("a").unwrap().is_empty());
        assert!(state.blocking_dependencies("b").unwrap().is_empty());
        assert_eq!(state.blocking_dependencies("c").unwrap().len(), 1);
    }
}
