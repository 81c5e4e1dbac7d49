//! Framework identity.
//!
//! Every call but subscribe needs the framework id the master assigns in
//! its subscribed event. Until then [`Identity::calls`] refuses to build
//! anything.

use parking_lot::RwLock;
use tracing::info;

use flotilla_core::FrameworkId;
use flotilla_core::config::ContainerConfig;
use flotilla_protocol::CallFactory;

use crate::error::{SchedulerError, SchedulerResult};

pub struct Identity {
    refuse_seconds: f64,
    container: ContainerConfig,
    factory: RwLock<Option<CallFactory>>,
}

impl Identity {
    pub fn new(refuse_seconds: f64, container: ContainerConfig) -> Self {
        Self {
            refuse_seconds,
            container,
            factory: RwLock::new(None),
        }
    }

    /// Record the id from a subscribed event. A resubscription replaces it.
    pub fn establish(&self, framework_id: FrameworkId) {
        info!(%framework_id, "framework subscribed");
        *self.factory.write() = Some(CallFactory::new(
            framework_id,
            self.refuse_seconds,
            self.container.clone(),
        ));
    }

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.factory.read().as_ref().map(|f| f.framework_id().clone())
    }

    /// Call builder bound to the current framework id.
    pub fn calls(&self) -> SchedulerResult<CallFactory> {
        self.factory.read().clone().ok_or(SchedulerError::NotSubscribed)
    }
}
