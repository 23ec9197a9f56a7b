//! Multi-Threaded Upgrade Race Tests
//!
//! Many threads request the same capability on a database that still needs
//! an upgrade. Exactly one of them commits; all of them proceed under a tag
//! that satisfies the requirement.

use std::sync::{Arc, Barrier};
use std::thread;
use strata_core::{CapabilityRequirement, DatabaseName, FeatureBits, VersionError, VersionTag};
use strata_engine::{
    CapabilityRegistry, CompatibilityPolicy, EngineProfile, Ensured, RetryConfig,
    UpgradeCoordinator,
};
use strata_storage::{DatabaseVersionStore, FileVersionStore};
use tempfile::TempDir;

const CAPABILITY: &str = "pluginKind=Z";

fn profile() -> EngineProfile {
    EngineProfile::new(1, 6)
        .with_oldest_writable_minor(5)
        .with_known_features(FeatureBits::from_bits(0b0011))
}

fn required() -> VersionTag {
    VersionTag::new(1, 6).with_features(FeatureBits::from_bits(0b0010))
}

fn coordinator(store: Arc<FileVersionStore>) -> UpgradeCoordinator {
    let registry = CapabilityRegistry::builder(profile())
        .register(CapabilityRequirement::new(CAPABILITY, required()))
        .unwrap()
        .register(CapabilityRequirement::minor_and_features(
            "freelist.v2",
            1,
            5,
            FeatureBits::from_bits(0b0001),
        ))
        .unwrap()
        .build();
    UpgradeCoordinator::new(
        store,
        CompatibilityPolicy::new(profile()),
        Arc::new(registry),
    )
}

// ============================================================================
// Single-Database Races
// ============================================================================

/// Test: N threads race to enable the same capability on a fresh database
#[test]
fn test_concurrent_ensure_commits_exactly_once() {
    const THREADS: usize = 16;

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let coordinator = Arc::new(coordinator(store.clone()));
    let db = DatabaseName::new("orders").unwrap();
    coordinator.create_database(&db).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let db = db.clone();
            thread::spawn(move || {
                let requirement = coordinator.registry().require(CAPABILITY).unwrap().clone();
                barrier.wait();
                coordinator.ensure_requirement(&db, &requirement)
            })
        })
        .collect();

    let results: Vec<Ensured> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let upgraded = results.iter().filter(|r| r.upgraded()).count();
    assert_eq!(upgraded, 1, "exactly one caller commits the upgrade");
    for result in &results {
        assert!(result.tag().satisfies(&required()));
    }

    assert_eq!(store.read(&db).unwrap(), required());
    assert_eq!(store.generation(&db).unwrap(), 1);
}

/// Test: two stores over the same root behave like two processes
#[test]
fn test_two_store_instances_commit_once() {
    let temp_dir = TempDir::new().unwrap();
    let store_a = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let store_b = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let coord_a = Arc::new(coordinator(store_a.clone()));
    let coord_b = Arc::new(coordinator(store_b.clone()));

    let db = DatabaseName::new("shared").unwrap();
    coord_a.create_database(&db).unwrap();
    // B has already read the pre-upgrade tag
    assert_eq!(store_b.read(&db).unwrap(), VersionTag::new(1, 5));

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |coordinator: Arc<UpgradeCoordinator>, barrier: Arc<Barrier>, db: DatabaseName| {
        thread::spawn(move || {
            barrier.wait();
            coordinator.ensure_capability(&db, CAPABILITY)
        })
    };
    let h1 = spawn(Arc::clone(&coord_a), Arc::clone(&barrier), db.clone());
    let h2 = spawn(Arc::clone(&coord_b), Arc::clone(&barrier), db.clone());

    // Each caller may lose its race and retry; both must end up satisfied
    let r1 = h1.join().unwrap();
    let r2 = h2.join().unwrap();
    assert!(r1.is_ok() && r2.is_ok(), "{:?} / {:?}", r1, r2);

    let reopened = FileVersionStore::open(temp_dir.path()).unwrap();
    assert_eq!(reopened.read(&db).unwrap(), required());
    assert_eq!(reopened.generation(&db).unwrap(), 1);
}

/// Test: different capabilities racing on one database both land
#[test]
fn test_concurrent_different_capabilities_union() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let coordinator = Arc::new(coordinator(store.clone()));
    let db = DatabaseName::new("mixed").unwrap();
    coordinator.create_database(&db).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [CAPABILITY, "freelist.v2"]
        .into_iter()
        .map(|capability| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let db = db.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.ensure_capability(&db, capability)
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    let tag = store.read(&db).unwrap();
    assert_eq!(
        tag,
        VersionTag::new(1, 6).with_features(FeatureBits::from_bits(0b0011))
    );
    assert_eq!(store.generation(&db).unwrap(), 2);
}

/// Test: concurrent upgrades on separate databases do not interfere
#[test]
fn test_concurrent_upgrades_on_separate_databases() {
    const DATABASES: usize = 8;

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let coordinator = Arc::new(
        coordinator(store.clone()).with_retry_config(RetryConfig::default().with_max_retries(2)),
    );

    let names: Vec<DatabaseName> = (0..DATABASES)
        .map(|i| DatabaseName::new(format!("db{}", i)).unwrap())
        .collect();
    for db in &names {
        coordinator.create_database(db).unwrap();
    }

    let barrier = Arc::new(Barrier::new(DATABASES));
    let handles: Vec<_> = names
        .iter()
        .cloned()
        .map(|db| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coordinator.ensure_capability(&db, CAPABILITY)
            })
        })
        .collect();

    for h in handles {
        let result: Result<(), VersionError> = h.join().unwrap();
        result.unwrap();
    }

    for db in &names {
        assert_eq!(store.read(db).unwrap(), required());
        assert_eq!(store.generation(db).unwrap(), 1);
    }
}

// ============================================================================
// Writers From Other Engine Builds
// ============================================================================

/// Test: a newer build tags the database with a bit this build does not know
#[test]
fn test_commit_by_newer_instance_is_refused_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileVersionStore::open(temp_dir.path()).unwrap());
    let coordinator = coordinator(store.clone());
    let db = DatabaseName::new("orders").unwrap();
    coordinator.create_database(&db).unwrap();
    assert_eq!(coordinator.check_open(&db).unwrap(), VersionTag::new(1, 5));

    // Newer engine build working on the same root
    let newer = FileVersionStore::open(temp_dir.path()).unwrap();
    let newer_tag = VersionTag::new(1, 7).with_features(FeatureBits::from_bits(0b1000));
    assert!(newer
        .compare_and_upgrade(&db, &VersionTag::new(1, 5), &newer_tag)
        .unwrap()
        .is_committed());

    assert_eq!(store.read(&db).unwrap(), newer_tag);
    assert!(matches!(
        coordinator.check_open(&db),
        Err(VersionError::UnsupportedFeatureBits { .. })
    ));

    let mut wrote_artifact = false;
    let result: Result<(), VersionError> = coordinator.with_capability(&db, "freelist.v2", |_| {
        wrote_artifact = true;
        Ok(())
    });
    assert!(matches!(result, Err(VersionError::Unsupported { .. })));
    assert!(!wrote_artifact);
    assert_eq!(newer.generation(&db).unwrap(), 1);
}
