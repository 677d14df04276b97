use std::collections::BTreeMap;

use crate::core::{EngineError, EntityId, EntityKind, Result};

use super::record::EntityRecord;

/// Rows of one governed kind, keyed by id. BTreeMap keeps iteration in id
/// order so candidate walks and reports come out deterministic.
#[derive(Debug, Clone)]
pub struct EntityTable {
    kind: EntityKind,
    rows: BTreeMap<EntityId, EntityRecord>,
}

impl EntityTable {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            rows: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn insert(&mut self, record: EntityRecord) -> Result<()> {
        if record.kind != self.kind {
            return Err(EngineError::Storage(format!(
                "cannot insert a {} row into the {} table",
                record.kind, self.kind
            )));
        }
        if self.rows.contains_key(&record.id) {
            return Err(EngineError::Storage(format!(
                "{} '{}' already exists",
                self.kind, record.id
            )));
        }
        self.rows.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.rows.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.rows.get_mut(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntityRecord> {
        self.rows.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rows_of_the_wrong_kind() {
        let mut table = EntityTable::new(EntityKind::Warehouse);
        let zone = EntityRecord::new(EntityKind::Zone, "Aisle 3");
        assert!(table.insert(zone).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut table = EntityTable::new(EntityKind::Warehouse);
        let record = EntityRecord::new(EntityKind::Warehouse, "North Dock");
        let dup = record.clone();
        table.insert(record).unwrap();
        assert!(table.insert(dup).is_err());
    }
}
