use crate::loader::Loader;

/// How [Loader::reset] orders teardown hooks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownOrder {
    /// Reverse dependency order - components in a cycle are torn down in search order
    #[default]
    BestEffort,
    /// Reverse dependency order - a cyclic graph is refused and nothing is torn down
    Strict,
}

/// Configuration of a [Loader]
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Shows up as `loader` on every tracing span of the loader
    pub label: String,
    pub teardown_order: TeardownOrder,
}
impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            label: "loader".to_string(),
            teardown_order: TeardownOrder::default(),
        }
    }
}

pub struct LoaderBuilder {
    config: LoaderConfig,
}
impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderBuilder {
    pub fn new() -> Self {
        LoaderBuilder {
            config: LoaderConfig::default(),
        }
    }
}
impl LoaderBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn teardown_order(mut self, order: TeardownOrder) -> Self {
        self.config.teardown_order = order;
        self
    }

    pub fn build(self) -> Loader {
        Loader::with_config(self.config)
    }
}
