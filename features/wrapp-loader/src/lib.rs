//! Wires named components into each other and drives their lifecycle
//!
//! Components declare the names they depend on, the [Loader] retrieves them (possibly
//! asynchronously), fills their [Slot]s and then calls their lifecycle hooks in
//! dependency order. Mutual dependencies are allowed.
//!
//! ```rust
//! use wrapp_loader::{AttachError, Component, Input, Instance, Loader, Slot};
//!
//! struct Server {
//!     database: Slot<Database>,
//! }
//! impl Component for Server {
//!     fn dependencies(&self) -> Vec<String> {
//!         vec!["database".to_string()]
//!     }
//!
//!     fn attach(&self, slot: &str, dependency: &Instance) -> Result<(), AttachError> {
//!         match slot {
//!             "database" => self.database.fill(dependency),
//!             _ => Err(AttachError::UnknownSlot(slot.to_string())),
//!         }
//!     }
//! }
//!
//! struct Database;
//! impl Component for Database {}
//!
//! let loader = Loader::new();
//! let ready = loader
//!     .load([
//!         ("server", Input::component(Server { database: Slot::new() })),
//!         ("database", Input::component(Database)),
//!     ])
//!     .into_ready()
//!     .expect("nothing was pending")
//!     .expect("loading failed");
//!
//! let server = ready["server"].downcast::<Server>().unwrap();
//! assert!(server.database.get().is_some());
//! ```

mod builder;
mod completion;
mod component;
mod dependency_graph;
mod errors;
mod lifecycle;
mod loader;
mod retrieval;
mod slot;
mod state;
mod types;

pub use builder::{LoaderBuilder, LoaderConfig, TeardownOrder};
pub use completion::Completion;
pub use component::{Capabilities, Component, Hook, ReadyEvent, UsedByEvent};
pub use dependency_graph::{DependencyGraph, GraphError, GraphOptions};
pub use errors::{AttachError, LoadError, TeardownErrors};
pub use lifecycle::Readiness;
pub use loader::Loader;
pub use retrieval::{Export, Input};
pub use slot::Slot;
pub use types::{Components, DynError, Injectable, Instance};
