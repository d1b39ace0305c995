//! Component factory registry for configuration-driven construction.
//!
//! Component implementations are registered by type name; the builder
//! resolves configuration entries against the registry and propagates
//! factory failures (missing or malformed parameters) as setup errors.
//!
//! # Example
//!
//! ```
//! use maelstrom::registry::ComponentRegistry;
//! use maelstrom::component::{BaseComponent, Component};
//! use maelstrom::params::Params;
//! use maelstrom::types::ComponentId;
//!
//! struct MyComponent { base: BaseComponent }
//! impl Component for MyComponent {
//!     fn id(&self) -> ComponentId { self.base.id() }
//! }
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register("My", |id, _params| {
//!     Ok(Box::new(MyComponent { base: BaseComponent::new(id, "my") }))
//! });
//!
//! let c = registry.create("My", ComponentId::component(0), &Params::new()).unwrap();
//! assert_eq!(c.id(), ComponentId::component(0));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::Component;
use crate::config::ConfigError;
use crate::params::Params;
use crate::types::ComponentId;

/// Type alias for component factory functions.
pub type ComponentFactory =
    Arc<dyn Fn(ComponentId, &Params) -> Result<Box<dyn Component>, ConfigError> + Send + Sync>;

/// A registry of component factories keyed by type name.
///
/// Cloning is cheap: factories are shared, so a multi-rank runner can
/// hand each rank the same registry.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under the given type name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(ComponentId, &Params) -> Result<Box<dyn Component>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Creates a component instance by type name.
    ///
    /// An unresolved type name or a factory parameter failure is a setup
    /// error; the simulation will not start.
    pub fn create(
        &self,
        type_name: &str,
        id: ComponentId,
        params: &Params,
    ) -> Result<Box<dyn Component>, ConfigError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| ConfigError::UnknownComponentType(type_name.to_string()))?;
        factory(id, params)
    }

    /// Returns true if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Iterates registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Unregisters a type, returning whether it was present.
    pub fn unregister(&mut self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("registered_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Creates a registry with the built-in component types.
///
/// Includes:
/// - `Counter` - event/tick counting probe
/// - `Generator` - clocked event source
/// - `Relay` - event consumer with optional re-send chain
/// - `PollingCollector` - clocked drain of a polling link
/// - `InitSender` / `InitProbe` - init-phase data movers
pub fn create_default_registry() -> ComponentRegistry {
    use crate::components::mock::{
        Counter, Generator, InitProbe, InitSender, PollingCollector, Relay,
    };

    let mut registry = ComponentRegistry::new();

    registry.register("Counter", |id, params| {
        Ok(Box::new(Counter::from_params(id, params)?))
    });
    registry.register("Generator", |id, params| {
        Ok(Box::new(Generator::from_params(id, params)?))
    });
    registry.register("Relay", |id, params| {
        Ok(Box::new(Relay::from_params(id, params)?))
    });
    registry.register("PollingCollector", |id, params| {
        Ok(Box::new(PollingCollector::from_params(id, params)?))
    });
    registry.register("InitSender", |id, params| {
        Ok(Box::new(InitSender::from_params(id, params)?))
    });
    registry.register("InitProbe", |id, _params| Ok(Box::new(InitProbe::new(id))));

    registry
}
