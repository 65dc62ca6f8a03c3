use crate::engine::ArchiveEngine;

/// Shared state handed to every handler.
pub struct AppState {
    pub engine: ArchiveEngine,
}

impl AppState {
    pub fn new(engine: ArchiveEngine) -> Self {
        Self { engine }
    }
}
