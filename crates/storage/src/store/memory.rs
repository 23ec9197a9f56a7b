//! In-memory version store
//!
//! Same semantics as the file store without durability. Used for ephemeral
//! databases and for exercising the upgrade protocol in tests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use strata_core::{DatabaseName, VersionError, VersionResult, VersionTag};
use tracing::debug;

use super::{validate_step, CasOutcome, DatabaseVersionStore};
use crate::format::VersionRecord;

/// Version store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    records: DashMap<DatabaseName, VersionRecord>,
}

impl MemoryVersionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a database's entry (deleting the database)
    pub fn drop_database(&self, db: &DatabaseName) -> bool {
        self.records.remove(db).is_some()
    }
}

impl DatabaseVersionStore for MemoryVersionStore {
    fn create(&self, db: &DatabaseName, initial: VersionTag) -> VersionResult<VersionTag> {
        match self.records.entry(db.clone()) {
            Entry::Occupied(_) => Err(VersionError::AlreadyExists(db.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(VersionRecord::initial(initial));
                debug!(target: "strata::compat", database = %db, tag = %initial, "Version entry created");
                Ok(initial)
            }
        }
    }

    fn read(&self, db: &DatabaseName) -> VersionResult<VersionTag> {
        self.records
            .get(db)
            .map(|r| r.tag)
            .ok_or_else(|| VersionError::DatabaseNotFound(db.to_string()))
    }

    fn compare_and_upgrade(
        &self,
        db: &DatabaseName,
        expected: &VersionTag,
        target: &VersionTag,
    ) -> VersionResult<CasOutcome> {
        // Shard write lock held for the whole compare + swap
        let mut record = self
            .records
            .get_mut(db)
            .ok_or_else(|| VersionError::DatabaseNotFound(db.to_string()))?;

        if record.tag != *expected {
            return Ok(CasOutcome::Stale {
                current: record.tag,
            });
        }

        validate_step(expected, target)?;

        if target != expected {
            *record = record.successor(*target);
        }

        Ok(CasOutcome::Committed {
            tag: record.tag,
            generation: record.generation,
        })
    }

    fn generation(&self, db: &DatabaseName) -> VersionResult<u64> {
        self.records
            .get(db)
            .map(|r| r.generation)
            .ok_or_else(|| VersionError::DatabaseNotFound(db.to_string()))
    }

    fn exists(&self, db: &DatabaseName) -> VersionResult<bool> {
        Ok(self.records.contains_key(db))
    }

    fn list(&self) -> VersionResult<Vec<DatabaseName>> {
        let mut names: Vec<DatabaseName> = self.records.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::FeatureBits;

    fn db(name: &str) -> DatabaseName {
        DatabaseName::new(name).unwrap()
    }

    #[test]
    fn test_create_and_read() {
        let store = MemoryVersionStore::new();
        let name = db("orders");
        store.create(&name, VersionTag::new(1, 5)).unwrap();

        assert_eq!(store.read(&name).unwrap(), VersionTag::new(1, 5));
        assert_eq!(store.generation(&name).unwrap(), 0);
        assert!(matches!(
            store.create(&name, VersionTag::new(1, 5)),
            Err(VersionError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_read_missing() {
        let store = MemoryVersionStore::new();
        assert!(matches!(
            store.read(&db("missing")),
            Err(VersionError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_cas_committed_then_stale() {
        let store = MemoryVersionStore::new();
        let name = db("orders");
        let v5 = VersionTag::new(1, 5);
        let v6 = VersionTag::new(1, 6).with_features(FeatureBits::from_bits(0b10));
        store.create(&name, v5).unwrap();

        let outcome = store.compare_and_upgrade(&name, &v5, &v6).unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Committed {
                tag: v6,
                generation: 1
            }
        );

        // Second writer still expecting v5 loses
        let outcome = store.compare_and_upgrade(&name, &v5, &v6).unwrap();
        assert_eq!(outcome, CasOutcome::Stale { current: v6 });
        assert_eq!(store.generation(&name).unwrap(), 1);
    }

    #[test]
    fn test_cas_noop_does_not_bump_generation() {
        let store = MemoryVersionStore::new();
        let name = db("orders");
        let v5 = VersionTag::new(1, 5);
        store.create(&name, v5).unwrap();

        assert!(store
            .compare_and_upgrade(&name, &v5, &v5)
            .unwrap()
            .is_committed());
        assert_eq!(store.generation(&name).unwrap(), 0);
    }

    #[test]
    fn test_cas_rejects_regression() {
        let store = MemoryVersionStore::new();
        let name = db("orders");
        let v6 = VersionTag::new(1, 6);
        store.create(&name, v6).unwrap();

        assert!(matches!(
            store.compare_and_upgrade(&name, &v6, &VersionTag::new(1, 5)),
            Err(VersionError::Regression { .. })
        ));
        assert_eq!(store.read(&name).unwrap(), v6);
    }

    #[test]
    fn test_list_and_drop() {
        let store = MemoryVersionStore::new();
        store.create(&db("b"), VersionTag::new(1, 0)).unwrap();
        store.create(&db("a"), VersionTag::new(1, 0)).unwrap();

        assert_eq!(store.list().unwrap(), vec![db("a"), db("b")]);
        assert!(store.drop_database(&db("a")));
        assert!(!store.exists(&db("a")).unwrap());
    }
}
