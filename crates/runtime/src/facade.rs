//! Shared capability handle passed into every plugin invocation.

use {huddle_providers::ModelGateway, huddle_state::MeetingStore};

/// The per-process access point to the model gateway and the meeting
/// store.
///
/// Built once by the runtime and shared behind an `Arc`; plugin code
/// receives it on each callback instead of holding globals.
pub struct RuntimeFacade {
    models: ModelGateway,
    store: MeetingStore,
}

impl RuntimeFacade {
    #[must_use]
    pub fn new(models: ModelGateway, store: MeetingStore) -> Self {
        Self { models, store }
    }

    /// The language model capability, with its fast and full tiers.
    #[must_use]
    pub fn models(&self) -> &ModelGateway {
        &self.models
    }

    /// The keyed meeting store and packet history.
    #[must_use]
    pub fn store(&self) -> &MeetingStore {
        &self.store
    }
}
