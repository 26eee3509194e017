use std::sync::Arc;

use netiac_driver::ApplianceDriver;
use netiac_registry::Registry;
use netiac_store::StateStore;

/// The collaborators every tool operation needs: persisted state, the
/// appliance port, and the frozen type catalog. Built once by the host
/// process and handed to [`crate::dispatch::dispatch`] per call.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn StateStore>,
    pub driver: Arc<dyn ApplianceDriver>,
    pub registry: Arc<Registry>,
    pub lock_timeout_ms: u64,
}

impl EngineContext {
    pub fn new(store: Arc<dyn StateStore>, driver: Arc<dyn ApplianceDriver>, registry: Arc<Registry>) -> Self {
        EngineContext { store, driver, registry, lock_timeout_ms: 30_000 }
    }

    pub fn with_lock_timeout_ms(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }
}
