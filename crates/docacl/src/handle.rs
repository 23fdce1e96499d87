//! The current policy of one document.
//!
//! Readers take an `Arc<Policy>` snapshot and resolve against it for the
//! whole request. Writers build a new policy off to the side and publish it
//! with a single pointer swap, so a reader never sees a half-applied edit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::info;

use crate::error::PolicyError;
use crate::policy::Policy;
use crate::store::PersistedRules;

/// Default number of prior versions kept for undo.
pub const DEFAULT_MAX_VERSIONS: usize = 32;

#[derive(Debug)]
struct History {
    /// Prior snapshots, oldest first.
    versions: VecDeque<Arc<Policy>>,
    next_version: u64,
    max_versions: usize,
}

/// Shared handle to a document's current policy.
///
/// Publishing is single-writer: the history lock is held for the whole
/// build-and-swap, while the snapshot lock is only held for the swap.
#[derive(Debug)]
pub struct PolicyHandle {
    current: RwLock<Arc<Policy>>,
    history: Mutex<History>,
}

impl PolicyHandle {
    pub fn new(policy: Policy) -> Self {
        Self::with_max_versions(policy, DEFAULT_MAX_VERSIONS)
    }

    pub fn with_max_versions(policy: Policy, max_versions: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy.with_version(1))),
            history: Mutex::new(History {
                versions: VecDeque::new(),
                next_version: 2,
                max_versions,
            }),
        }
    }

    /// Opens a handle on persisted rules. Malformed rules fail the open.
    pub fn open(records: &PersistedRules) -> Result<Self, PolicyError> {
        Policy::from_records(records).map(Self::new)
    }

    /// The policy current at the time of the call.
    pub fn snapshot(&self) -> Arc<Policy> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Builds a policy from saved records and publishes it.
    ///
    /// On error the current policy stays in place.
    pub fn save(&self, records: &PersistedRules) -> Result<u64, PolicyError> {
        let mut history = self.lock_history();
        let settings = self.snapshot().settings();
        let policy = Policy::from_records_with(records, settings)?;
        Ok(self.publish(&mut history, policy))
    }

    /// Publishes an already-built policy.
    pub fn replace(&self, policy: Policy) -> u64 {
        let mut history = self.lock_history();
        self.publish(&mut history, policy)
    }

    /// Applies an edit to the current policy and publishes the result.
    pub fn update<F>(&self, edit: F) -> Result<u64, PolicyError>
    where
        F: FnOnce(&Policy) -> Result<Policy, PolicyError>,
    {
        let mut history = self.lock_history();
        let policy = edit(&self.snapshot())?;
        Ok(self.publish(&mut history, policy))
    }

    /// Restores the previous policy. Returns the new version, or `None` when
    /// there is nothing to undo.
    pub fn undo(&self) -> Option<u64> {
        let mut history = self.lock_history();
        let previous = history.versions.pop_back()?;
        let version = history.next_version;
        history.next_version += 1;

        let restored = Arc::new(Policy::clone(&previous).with_version(version));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = restored;
        info!(version, "restored previous policy");
        Some(version)
    }

    /// Number of versions available to [`PolicyHandle::undo`].
    pub fn undo_depth(&self) -> usize {
        self.lock_history().versions.len()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, history: &mut History, policy: Policy) -> u64 {
        let version = history.next_version;
        history.next_version += 1;

        let next = Arc::new(policy.with_version(version));
        let rule_sets = next.rule_sets().filter(|set| !set.is_empty()).count();
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, next)
        };

        if history.max_versions > 0 {
            history.versions.push_back(previous);
            while history.versions.len() > history.max_versions {
                history.versions.pop_front();
            }
        }
        info!(version, rule_sets, "published policy");
        version
    }
}
