//! Coordination store contracts
//!
//! Two capabilities shared by every process in a fleet:
//! - `MapStore`: a string-keyed map with per-entry atomic writes and deletes
//! - `LeaderElection`: a mutual-exclusion primitive handing out revocable
//!   leadership leases
//!
//! `InMemoryMapStore` and `InMemoryCoordinator` back both within a single
//! process. The coordinator can expire a participant's session to simulate
//! a lost connection.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use sor_core::{SorError, SorResult};

// ============================================================================
// Shared map
// ============================================================================

/// String-keyed map shared across processes
///
/// Writes and deletes are atomic per entry; `get_all` is a point-in-time
/// copy that may miss concurrent writes.
pub trait MapStore<V>: Send + Sync {
    /// Copy of every entry, ordered by key
    fn get_all(&self) -> SorResult<BTreeMap<String, V>>;

    /// Entry under `key`, if any
    fn get(&self, key: &str) -> SorResult<Option<V>>;

    /// Insert or replace the entry under `key`
    fn set(&self, key: &str, value: V) -> SorResult<()>;

    /// Delete the entry under `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> SorResult<()>;
}

/// Process-local `MapStore`
pub struct InMemoryMapStore<V> {
    entries: DashMap<String, V>,
}

impl<V> InMemoryMapStore<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for InMemoryMapStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for InMemoryMapStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMapStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V: Clone + Send + Sync> MapStore<V> for InMemoryMapStore<V> {
    fn get_all(&self) -> SorResult<BTreeMap<String, V>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    fn get(&self, key: &str) -> SorResult<Option<V>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: V) -> SorResult<()> {
        if key.is_empty() {
            return Err(SorError::invalid_input("map key must not be empty"));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> SorResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// Leader election
// ============================================================================

/// Revocable proof of being the single active holder of a lock path
///
/// Clones observe the same revocation. Once revoked a lease never becomes
/// held again; re-election hands out a new lease.
#[derive(Clone)]
pub struct LeadershipLease {
    lock_path: String,
    identity: String,
    token: u64,
    held: Arc<AtomicBool>,
}

impl LeadershipLease {
    /// Create a held lease. Election backends call this on grant.
    pub fn new(lock_path: impl Into<String>, identity: impl Into<String>, token: u64) -> Self {
        Self {
            lock_path: lock_path.into(),
            identity: identity.into(),
            token,
            held: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Lock path this lease was granted for
    pub fn lock_path(&self) -> &str {
        &self.lock_path
    }

    /// Participant holding the lease
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Grant number, unique per backend
    pub fn token(&self) -> u64 {
        self.token
    }

    /// True until the lease is released or its session is lost
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Mark the lease lost
    pub(crate) fn revoke(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl fmt::Debug for LeadershipLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeadershipLease")
            .field("lock_path", &self.lock_path)
            .field("identity", &self.identity)
            .field("token", &self.token)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Mutual-exclusion primitive across a fleet
pub trait LeaderElection: Send + Sync {
    /// Try to become the holder of `lock_path`
    ///
    /// Returns `None` when another participant holds it. Never blocks.
    fn try_acquire(&self, lock_path: &str, identity: &str) -> SorResult<Option<LeadershipLease>>;

    /// Give up a lease. Releasing a lost lease is a no-op.
    fn release(&self, lease: &LeadershipLease) -> SorResult<()>;
}

/// Process-local `LeaderElection`
#[derive(Default)]
pub struct InMemoryCoordinator {
    locks: DashMap<String, LeadershipLease>,
    next_token: AtomicU64,
}

impl InMemoryCoordinator {
    /// Create a coordinator with no locks held
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity currently holding `lock_path`
    pub fn holder(&self, lock_path: &str) -> Option<String> {
        self.locks
            .get(lock_path)
            .filter(|lease| lease.is_held())
            .map(|lease| lease.identity().to_string())
    }

    /// Drop every lease held by `identity`, as if its session timed out
    ///
    /// Returns the number of leases revoked.
    pub fn expire_session(&self, identity: &str) -> usize {
        let mut revoked = 0;
        self.locks.retain(|_, lease| {
            if lease.identity() == identity {
                lease.revoke();
                revoked += 1;
                false
            } else {
                true
            }
        });
        if revoked > 0 {
            debug!(target: "sor::leader", identity, revoked, "Session expired");
        }
        revoked
    }
}

impl fmt::Debug for InMemoryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCoordinator")
            .field("locks", &self.locks.len())
            .finish()
    }
}

impl LeaderElection for InMemoryCoordinator {
    fn try_acquire(&self, lock_path: &str, identity: &str) -> SorResult<Option<LeadershipLease>> {
        if lock_path.is_empty() {
            return Err(SorError::invalid_input("lock path must not be empty"));
        }
        if identity.is_empty() {
            return Err(SorError::invalid_input("identity must not be empty"));
        }

        let grant = || {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
            LeadershipLease::new(lock_path, identity, token)
        };
        let lease = match self.locks.entry(lock_path.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_held() {
                    return Ok(None);
                }
                let lease = grant();
                occupied.insert(lease.clone());
                lease
            }
            Entry::Vacant(vacant) => {
                let lease = grant();
                vacant.insert(lease.clone());
                lease
            }
        };
        debug!(target: "sor::leader", lock_path, identity, token = lease.token(), "Lease granted");
        Ok(Some(lease))
    }

    fn release(&self, lease: &LeadershipLease) -> SorResult<()> {
        lease.revoke();
        self.locks
            .remove_if(lease.lock_path(), |_, current| current.token() == lease.token());
        Ok(())
    }
}
