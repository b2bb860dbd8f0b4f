//! Persistence port
//!
//! The ledger hands whole entity graphs to a [`PersistenceGateway`] and
//! reports every committed version through `mark_dirty`, leaving the choice
//! of when to save to the host. Codecs and storage formats live behind the
//! port.

use core_kernel::PortError;

use crate::store::EntityGraph;

/// Loads and stores entity graphs
pub trait PersistenceGateway: std::fmt::Debug {
    /// Loads the last saved graph
    ///
    /// # Errors
    ///
    /// `PortError::Empty` if nothing was saved yet.
    fn load(&self) -> Result<EntityGraph, PortError>;

    /// Replaces the stored graph
    fn save(&mut self, graph: &EntityGraph) -> Result<(), PortError>;

    /// Records that the in-memory graph reached `version` and is unsaved
    fn mark_dirty(&mut self, version: u64);
}

/// Gateway that keeps the last saved graph as a JSON document in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryGateway {
    document: Option<String>,
    saved_version: Option<u64>,
    dirty_version: Option<u64>,
    saves: usize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored JSON document, if any
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Highest version reported through `mark_dirty` and not yet saved
    pub fn dirty_version(&self) -> Option<u64> {
        self.dirty_version
    }

    pub fn saved_version(&self) -> Option<u64> {
        self.saved_version
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn load(&self) -> Result<EntityGraph, PortError> {
        let document = self
            .document
            .as_deref()
            .ok_or_else(|| PortError::empty("no entity graph has been saved"))?;
        serde_json::from_str(document)
            .map_err(|e| PortError::transformation("failed to decode entity graph", e))
    }

    fn save(&mut self, graph: &EntityGraph) -> Result<(), PortError> {
        let document = serde_json::to_string(graph)
            .map_err(|e| PortError::transformation("failed to encode entity graph", e))?;
        self.document = Some(document);
        self.saved_version = Some(graph.version);
        if self.dirty_version.is_some_and(|v| v <= graph.version) {
            self.dirty_version = None;
        }
        self.saves += 1;
        Ok(())
    }

    fn mark_dirty(&mut self, version: u64) {
        self.dirty_version = Some(self.dirty_version.map_or(version, |v| v.max(version)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use core_kernel::{Currency, SequentialIdSource};

    #[test]
    fn test_load_before_save_is_empty() {
        let gateway = InMemoryGateway::new();
        let error = gateway.load().unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_save_clears_dirty_version() {
        let store = EntityStore::new(Currency::EUR, Box::new(SequentialIdSource::new()));
        let mut gateway = InMemoryGateway::new();

        gateway.mark_dirty(0);
        assert_eq!(gateway.dirty_version(), Some(0));

        gateway.save(&store.snapshot()).unwrap();

        assert_eq!(gateway.dirty_version(), None);
        assert_eq!(gateway.save_count(), 1);
        assert_eq!(gateway.load().unwrap(), store.snapshot());
    }
}
