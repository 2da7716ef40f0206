use std::{
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use futures::{
    future::{try_join_all, BoxFuture},
    FutureExt,
};
use tracing::Instrument;

use crate::{
    builder::{LoaderBuilder, LoaderConfig, TeardownOrder},
    completion::Completion,
    component::Hook,
    dependency_graph::{DependencyGraph, GraphError},
    errors::{LoadError, TeardownErrors},
    lifecycle::{deliver_all, Readiness},
    retrieval::{Export, Input},
    state::{Batch, LoaderState},
    types::{Components, DynError, Instance},
};

/// Wires named components into each other and drives their lifecycle
///
/// The loader is a handle, clones share the same components. Every operation
/// returns a [Completion] - finished right away if nothing had to wait, otherwise a
/// future which must be awaited (or joined with other loader futures) to make progress.
///
/// 1. `load` registers components, some available, some still pending
/// 2. Each component's transitive dependencies are awaited, then its slots are filled
/// 3. `ready` hooks run dependencies first, `used_by` hooks follow each dependant's `ready`
/// 4. `reset` runs `teardown` hooks dependants first and forgets everything
#[derive(Clone)]
pub struct Loader(Arc<LoaderInner>);
struct LoaderInner {
    config: LoaderConfig,
    state: Mutex<LoaderState>,
}
impl Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        let mut map = f.debug_struct("Loader");
        for name in state.graph.nodes() {
            let val = if state.ready.contains_key(name) {
                "ready"
            } else if state.is_retrieved(name) {
                "retrieved"
            } else {
                "pending"
            };
            map.field(name, &val);
        }
        map.finish()
    }
}
impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    pub(crate) fn with_config(config: LoaderConfig) -> Self {
        Loader(Arc::new(LoaderInner {
            config,
            state: Mutex::new(LoaderState::new(0)),
        }))
    }

    /// Process wide loader, for applications which don't want to pass one around
    pub fn global() -> &'static Loader {
        static GLOBAL: OnceLock<Loader> = OnceLock::new();
        GLOBAL.get_or_init(|| Loader::builder().label("global").build())
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.0.config
    }

    /// Registers and wires a batch of components
    ///
    /// Resolves to the readiness map once every component of the batch is ready and
    /// all notifications the batch caused were delivered. Later batches may depend on
    /// components of earlier ones. Names which are registered already are ignored.
    pub fn load<N: Into<String>>(
        &self,
        inputs: impl IntoIterator<Item = (N, Input)>,
    ) -> Completion<Components> {
        let span = tracing::debug_span!("load", loader = %self.0.config.label);
        let batch = span.in_scope(|| {
            self.state()
                .register(inputs.into_iter().map(|(name, input)| (name.into(), input)))
        });

        Completion::new(self.clone().drive(batch).instrument(span))
    }

    /// Resolves to the readiness map once every component in `names` is ready
    ///
    /// Fails if one of them failed, or is blocked by a failed dependency.
    pub fn wait<N: AsRef<str>>(&self, names: impl IntoIterator<Item = N>) -> Completion<Components> {
        let span = tracing::debug_span!("wait", loader = %self.0.config.label);
        let (generation, waiting) = span.in_scope(|| {
            let mut state = self.state();
            let waiting: Vec<_> = names
                .into_iter()
                .map(|name| state.add_ready_waiter(name.as_ref()))
                .collect();
            (state.generation, waiting)
        });

        let loader = self.clone();
        Completion::new(
            async move {
                for result in try_join_all(waiting).await? {
                    result?;
                }
                loader.with_state(generation, |state| Ok(state.ready.clone()))
            }
            .instrument(span),
        )
    }

    /// Runs every teardown hook, dependants first, then forgets all components
    ///
    /// The loader is empty afterwards even if hooks failed - all failures are returned together.
    pub fn reset(&self) -> Completion<()> {
        let span = tracing::debug_span!("reset", loader = %self.0.config.label);
        let strict = self.0.config.teardown_order == TeardownOrder::Strict;
        let plan = span.in_scope(|| {
            let state = self.state();
            state
                .teardown_plan(strict)
                .map(|plan| (state.generation, plan))
        });

        let loader = self.clone();
        Completion::new(
            async move {
                let (generation, plan) = plan?;
                tracing::debug!("Tearing down {} components", plan.len());

                let mut errors = Vec::new();
                for (name, instance) in plan {
                    let result = Box::into_pin(instance.component.teardown()).await;
                    if let Err(error) = result {
                        let failure = LoadError::hook(&name, Hook::Teardown, error);
                        tracing::error!("{failure}");
                        errors.push(failure);
                    }
                }

                loader.clear(generation);
                if !errors.is_empty() {
                    return Err(TeardownErrors { errors }.into());
                }
                Ok(())
            }
            .instrument(span),
        )
    }

    /// Snapshot of the readiness map
    pub fn components(&self) -> Components {
        self.state().ready.clone()
    }

    pub fn readiness(&self, name: &str) -> Readiness {
        match self.state().ready.get(name) {
            Some(instance) => Readiness::Ready(instance.clone()),
            None => Readiness::NotReady,
        }
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.state().ready.contains_key(name)
    }

    /// Snapshot of the wiring graph
    pub fn graph(&self) -> DependencyGraph<Instance> {
        self.state().graph.clone()
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        // State is only mutated in non panicking sections
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the state, unless the loader was reset since `generation`
    fn with_state<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut LoaderState) -> Result<R, LoadError>,
    ) -> Result<R, LoadError> {
        let mut state = self.state();
        state.check(generation)?;
        f(&mut state)
    }

    fn clear(&self, generation: u64) {
        let mut state = self.state();
        // Someone else reset in the meantime
        if state.generation != generation {
            return;
        }

        // Dropping the old state cancels all outstanding waiters
        *state = LoaderState::new(generation + 1);
        tracing::debug!("Loader cleared");
    }
}

// Pipelines - one per component of a batch
impl Loader {
    /// Drives every pipeline of the batch to its end, then reports the first failure
    ///
    /// A failing component only stops itself and its dependants, the rest of the batch
    /// still becomes ready. A reset ends the batch right away.
    async fn drive(self, batch: Batch) -> Result<Components, LoadError> {
        let Batch {
            generation,
            available,
            pending,
            late,
        } = batch;

        let mut pipelines: Vec<BoxFuture<'static, Result<(), LoadError>>> = Vec::new();
        for name in available {
            pipelines.push(self.clone().activate(generation, name).boxed());
        }
        for (name, future) in pending {
            pipelines.push(self.clone().retrieve(generation, name, future).boxed());
        }
        for name in late {
            pipelines.push(self.clone().reattach(generation, name).boxed());
        }

        let count = pipelines.len();
        // Only a reset short circuits, every other outcome is collected
        let outcomes = try_join_all(pipelines.into_iter().map(|pipeline| {
            pipeline.map(|outcome| match outcome {
                Err(LoadError::Reset) => Err(LoadError::Reset),
                outcome => Ok(outcome),
            })
        }))
        .await?;

        if let Some(failure) = outcomes.into_iter().find_map(Result::err) {
            return Err(failure);
        }
        tracing::debug!("Loaded {count} components");

        self.with_state(generation, |state| Ok(state.ready.clone()))
    }

    /// Waits for a pending input, then continues like an available one
    async fn retrieve(
        self,
        generation: u64,
        name: String,
        pending: BoxFuture<'static, Result<Export, DynError>>,
    ) -> Result<(), LoadError> {
        let export = match pending.await {
            Ok(export) => export,
            Err(error) => {
                let failure = LoadError::RetrievalFailed {
                    component: name.clone(),
                    error: Arc::new(error),
                };
                tracing::error!("{failure}");
                self.record_failure(generation, &name, &failure);
                return Err(failure);
            }
        };

        self.with_state(generation, |state| {
            state.settle(&name, export.into_instance());
            Ok(())
        })?;

        self.activate(generation, name).await
    }

    async fn activate(self, generation: u64, name: String) -> Result<(), LoadError> {
        let outcome = self.make_ready(generation, &name).await;
        if let Err(failure) = &outcome {
            self.record_failure(generation, &name, failure);
        }
        outcome
    }

    async fn make_ready(&self, generation: u64, name: &str) -> Result<(), LoadError> {
        // Later batches can add dependencies while this one waits - repeat until nothing is missing
        let instance = loop {
            self.await_closure(generation, name).await?;

            let instance = self.with_state(generation, |state| {
                state.attach_closure(name)?;
                state
                    .instance(name)
                    .ok_or_else(|| LoadError::from(GraphError::NodeNotFound(name.to_string())))
            })?;

            if !self.await_dependencies(generation, name).await? {
                break instance;
            }
        };
        tracing::debug!(component = %name, "Attached");

        self.become_ready(generation, name, instance).await
    }

    /// Marks `name` as failed so its waiters and dependants stop waiting
    fn record_failure(&self, generation: u64, name: &str, failure: &LoadError) {
        if matches!(failure, LoadError::Reset) {
            return;
        }
        // A reset in the meantime left nothing to record
        let _ = self.with_state(generation, |state| {
            state.fail(name, failure.clone());
            Ok(())
        });
    }

    /// Attaches a component which gained dependencies through a later batch
    async fn reattach(self, generation: u64, name: String) -> Result<(), LoadError> {
        self.await_closure(generation, &name).await?;

        let deliveries = self.with_state(generation, |state| {
            state.attach_closure(&name)?;
            Ok(state.late_deliveries(&name))
        })?;
        tracing::debug!(component = %name, "Reattached");

        deliver_all(deliveries).await
    }

    /// Waits until the whole transitive closure of `name` is retrieved
    async fn await_closure(&self, generation: u64, name: &str) -> Result<(), LoadError> {
        // Settling components can reveal further dependencies - check until nothing is missing
        loop {
            let waiting = self.with_state(generation, |state| state.unretrieved_closure(name))?;
            if waiting.is_empty() {
                return Ok(());
            }

            tracing::debug!(
                component = %name,
                "Waiting for {} dependencies to be retrieved",
                waiting.len()
            );
            for result in try_join_all(waiting).await? {
                result?;
            }
        }
    }

    /// Waits for the direct dependencies of `name` to become ready
    ///
    /// Returns whether it had to wait at all.
    async fn await_dependencies(&self, generation: u64, name: &str) -> Result<bool, LoadError> {
        let waiting = self.with_state(generation, |state| state.blocking_dependencies(name))?;
        if waiting.is_empty() {
            return Ok(false);
        }

        tracing::debug!(
            component = %name,
            "Waiting for {} dependencies to become ready",
            waiting.len()
        );
        for result in try_join_all(waiting).await? {
            result?;
        }
        Ok(true)
    }

    async fn become_ready(
        &self,
        generation: u64,
        name: &str,
        instance: Instance,
    ) -> Result<(), LoadError> {
        if instance.capabilities.has(Hook::Ready) {
            let event = self.with_state(generation, |state| Ok(state.ready_event(name)))?;
            let result = Box::into_pin(instance.component.ready(event)).await;

            if let Err(error) = result {
                let failure = LoadError::hook(name, Hook::Ready, error);
                tracing::error!("{failure}");
                return Err(failure);
            }
        }

        let transition = self.with_state(generation, |state| Ok(state.enter_ready(name, instance)))?;
        transition.complete().await
    }
}
