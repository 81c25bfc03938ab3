//! Lazily constructed engines, one per interface (or shared backend).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use ecat_common::error::Result;
use ecat_master::master::MasterFactory;
use ecat_master::slave::SlaveInfo;

use crate::config::EngineConfig;
use crate::engine::Engine;

/// Maps `(interface, backend)` keys to engines.
///
/// Engines are created lazily on first request and reused for subsequent
/// tasks. The pool holds a shared reference to each engine, keeping it
/// alive across handle lifetimes. Construction is injected through a
/// [`MasterFactory`], so tests run against mock masters.
pub struct Pool {
    factory: MasterFactory,
    config: EngineConfig,
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl Pool {
    /// Creates a pool with the default engine configuration.
    pub fn new(factory: MasterFactory) -> Self {
        Self::with_config(factory, EngineConfig::default())
    }

    /// Creates a pool whose engines use the given configuration.
    pub fn with_config(factory: MasterFactory, config: EngineConfig) -> Self {
        Self {
            factory,
            config,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires or creates the engine for the given interface and backend.
    ///
    /// The IgH backend owns a single kernel master, so every interface
    /// shares one engine under the `"igh"` key; other backends key by
    /// interface name.
    pub fn acquire(&self, interface: &str, backend: &str) -> Result<Arc<Engine>> {
        let key = if backend == "igh" { "igh" } else { interface };
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(key) {
            return Ok(Arc::clone(engine));
        }
        let master = (self.factory)(interface, backend)?;
        info!(interface, backend, "creating engine");
        let engine = Engine::with_config(master, self.config.clone());
        engines.insert(key.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// True iff an engine exists for the interface and its cycle thread is
    /// running.
    pub fn is_active(&self, interface: &str) -> bool {
        self.engines
            .lock()
            .get(interface)
            .map(|e| e.running())
            .unwrap_or(false)
    }

    /// Returns the slaves on an interface.
    ///
    /// An active engine answers from its cache. Otherwise the engine is
    /// initialized (constructing it first if needed) and queried; an
    /// engine constructed purely for discovery is not cached when
    /// initialization fails.
    pub fn discover_slaves(&self, interface: &str) -> Result<Vec<SlaveInfo>> {
        let existing = self.engines.lock().get(interface).cloned();
        if let Some(engine) = existing {
            if engine.running() {
                return Ok(engine.slaves());
            }
            engine.ensure_initialized()?;
            return Ok(engine.slaves());
        }

        let master = (self.factory)(interface, "auto")?;
        let engine = Engine::with_config(master, self.config.clone());
        engine.ensure_initialized()?;
        let slaves = engine.slaves();
        self.engines
            .lock()
            .insert(interface.to_string(), engine);
        Ok(slaves)
    }
}
