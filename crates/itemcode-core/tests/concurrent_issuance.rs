//! Concurrent issuance against one database file through independent store
//! handles, the way separate request workers share a deployment.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use itemcode_core::{
    CodeGenerator, CodeRegistry, IdentityCode, ItemId, OsCodeGenerator, Reconciler,
    SqliteCodeStore,
};

const WORKERS: u64 = 6;
const CODES_PER_WORKER: usize = 20;

/// Proposes one fixed code first, then defers to the OS generator.
struct FirstCandidateGenerator {
    first: IdentityCode,
    used: AtomicBool,
}

impl CodeGenerator for FirstCandidateGenerator {
    fn generate(&self) -> IdentityCode {
        if self.used.swap(true, Ordering::SeqCst) {
            OsCodeGenerator.generate()
        } else {
            self.first.clone()
        }
    }
}

fn open_handles(path: &std::path::Path, count: u64) -> Vec<SqliteCodeStore> {
    (0..count)
        .map(|_| SqliteCodeStore::open_with_timeout(path, Duration::from_secs(30)).unwrap())
        .collect()
}

#[test]
fn separate_handles_never_share_a_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codes.db");
    let barrier = Arc::new(Barrier::new(WORKERS as usize));

    let workers: Vec<_> = open_handles(&path, WORKERS)
        .into_iter()
        .zip(0..WORKERS)
        .map(|(store, worker)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let registry = CodeRegistry::new(store);
                let reconciler = Reconciler::new(&registry);
                barrier.wait();
                let batch = reconciler.issue_batch(ItemId(worker), CODES_PER_WORKER);
                assert!(batch.is_complete(), "failures: {:?}", batch.failures);
                batch.issued
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for worker in workers {
        for issued in worker.join().unwrap() {
            assert!(seen.insert(issued.code.clone()), "duplicate {}", issued.code);
        }
    }
    assert_eq!(seen.len(), WORKERS as usize * CODES_PER_WORKER);

    let store = SqliteCodeStore::open(&path).unwrap();
    let registry = CodeRegistry::new(store);
    let stats = registry.stats().unwrap();
    assert_eq!(stats.record_count, seen.len() as u64);
    assert_eq!(stats.item_count, WORKERS);
}

#[test]
fn colliding_candidates_across_handles_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codes.db");
    let contested = IdentityCode::parse("c0ffee").unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS as usize));

    let workers: Vec<_> = open_handles(&path, WORKERS)
        .into_iter()
        .zip(0..WORKERS)
        .map(|(store, worker)| {
            let barrier = Arc::clone(&barrier);
            let generator = FirstCandidateGenerator {
                first: contested.clone(),
                used: AtomicBool::new(false),
            };
            thread::spawn(move || {
                let registry = CodeRegistry::with_generator(store, generator);
                barrier.wait();
                registry.issue(ItemId(worker), None).unwrap()
            })
        })
        .collect();

    let issued: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let holders: Vec<_> = issued.iter().filter(|i| i.code == contested).collect();
    assert_eq!(holders.len(), 1, "exactly one worker keeps the contested code");
    let distinct: BTreeSet<_> = issued.iter().map(|i| i.code.clone()).collect();
    assert_eq!(distinct.len(), WORKERS as usize);

    let registry = CodeRegistry::new(SqliteCodeStore::open(&path).unwrap());
    assert_eq!(
        registry.lookup_owner(contested.as_str()).unwrap(),
        Some(holders[0].item_id)
    );
}

#[test]
fn verification_counts_are_not_lost_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codes.db");

    let issued = CodeRegistry::new(SqliteCodeStore::open(&path).unwrap())
        .issue(ItemId(42), None)
        .unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS as usize));

    let workers: Vec<_> = open_handles(&path, WORKERS)
        .into_iter()
        .map(|store| {
            let barrier = Arc::clone(&barrier);
            let code = issued.code.clone();
            thread::spawn(move || {
                let registry = CodeRegistry::new(store);
                barrier.wait();
                (0..10)
                    .map(|_| {
                        registry
                            .increment_and_read_count(code.as_str())
                            .unwrap()
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut counts: Vec<u64> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    counts.sort_unstable();

    let expected: Vec<u64> = (1..=WORKERS * 10).collect();
    assert_eq!(counts, expected, "every increment observes a distinct value");
}
