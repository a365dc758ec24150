use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use valor_domain::{Error, Result, TestId, ValidationId};

/// Lock registry for in-flight work.
///
/// Per-test locks enforce single flight: a test processes at most one
/// transition at a time, and a concurrent attempt is rejected with
/// `TestBusy` rather than queued. Sibling tests hold independent locks and
/// proceed in parallel.
///
/// Per-validation locks only guard the commit read-modify-write — sessions
/// are persisted whole, so two siblings committing from their own working
/// copies must serialize for the brief load-apply-save window or the slower
/// one would erase the faster one's result. They are never held across
/// provider or sandbox calls.
#[derive(Default)]
pub struct SessionLocks {
    tests: DashMap<TestId, Arc<Mutex<()>>>,
    validations: DashMap<ValidationId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire_test(&self, id: TestId) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .tests
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.try_lock_owned().map_err(|_| Error::TestBusy(id))
    }

    pub async fn lock_validation(&self, id: ValidationId) -> OwnedMutexGuard<()> {
        let lock = self
            .validations
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }

    /// Drops the lock entry once a test is deleted.
    pub fn release_test(&self, id: TestId) {
        self.tests.remove(&id);
    }
}
