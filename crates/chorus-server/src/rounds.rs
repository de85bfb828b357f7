use chorus_types::{ChorusError, ChorusResult, SharedKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RoundStatus {
    New,
    Open,
    Closed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundStatus::New => "new",
            RoundStatus::Open => "open",
            RoundStatus::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Per-round state. Mutated only by the round's current-stage handler; once
/// the status reaches Closed, `replies`, `incoming_index` and `shared_keys`
/// are read-only.
pub struct ConvoRound {
    pub status: RoundStatus,
    pub route: Vec<String>,

    pub num_incoming: usize,
    pub shared_keys: Vec<Option<SharedKey>>,
    pub incoming: Vec<Option<Vec<u8>>>,
    /// Original slot to compacted slot; `None` for slots dropped as
    /// undecryptable, wrong-sized or duplicate.
    pub incoming_index: Vec<Option<usize>>,

    pub replies: Vec<Vec<u8>>,

    pub num_fake_singles: u32,
    pub num_fake_doubles: u32,
    /// One-shot cover-traffic task, joined inside Close.
    pub noise: Option<JoinHandle<ChorusResult<Vec<Vec<u8>>>>>,

    /// The process-wide Idle gate, held from NewRound until the point inside
    /// Close where outbound work can proceed. Owned by the round so every
    /// exit path releases it exactly once.
    pub idle: Option<OwnedMutexGuard<()>>,

    pub created_at: Instant,
}

impl ConvoRound {
    pub fn new(route: Vec<String>, idle: OwnedMutexGuard<()>) -> Self {
        Self {
            status: RoundStatus::New,
            route,
            num_incoming: 0,
            shared_keys: Vec::new(),
            incoming: Vec::new(),
            incoming_index: Vec::new(),
            replies: Vec::new(),
            num_fake_singles: 0,
            num_fake_doubles: 0,
            noise: None,
            idle: Some(idle),
            created_at: Instant::now(),
        }
    }

    pub fn expect_status(&self, round: u32, expected: RoundStatus) -> ChorusResult<()> {
        if self.status != expected {
            return Err(ChorusError::RoundStatus {
                round,
                status: self.status.to_string(),
                expecting: expected.to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for ConvoRound {
    fn drop(&mut self) {
        // A round deleted before Close still owns its noise task.
        if let Some(noise) = self.noise.take() {
            noise.abort();
        }
    }
}

/// Concurrent map from round id to round object. The map lock is held only
/// for lookup and mutation of the map itself; per-round state lives behind
/// each round's own async lock.
pub struct RoundStore {
    rounds: RwLock<HashMap<u32, Arc<Mutex<ConvoRound>>>>,
}

impl RoundStore {
    pub fn new() -> Self {
        Self {
            rounds: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, round: u32, state: ConvoRound) -> ChorusResult<Arc<Mutex<ConvoRound>>> {
        let mut rounds = self.rounds.write();
        if rounds.contains_key(&round) {
            return Err(ChorusError::RoundExists(round));
        }
        let entry = Arc::new(Mutex::new(state));
        rounds.insert(round, entry.clone());
        Ok(entry)
    }

    pub fn get(&self, round: u32) -> ChorusResult<Arc<Mutex<ConvoRound>>> {
        self.rounds
            .read()
            .get(&round)
            .cloned()
            .ok_or(ChorusError::RoundNotFound(round))
    }

    pub fn remove(&self, round: u32) -> bool {
        self.rounds.write().remove(&round).is_some()
    }

    pub fn len(&self) -> usize {
        self.rounds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.read().is_empty()
    }

    /// Drop rounds older than `max_age`. A downstream peer whose driver died
    /// between Close and Delete would otherwise leak its round forever.
    /// Rounds currently locked by a stage handler are left alone.
    pub fn sweep_stale(&self, max_age: Duration) -> Vec<u32> {
        let candidates: Vec<(u32, Arc<Mutex<ConvoRound>>)> = self
            .rounds
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();

        let mut removed = Vec::new();
        for (id, entry) in candidates {
            let stale = match entry.try_lock() {
                Ok(state) => state.created_at.elapsed() > max_age,
                Err(_) => false,
            };
            if stale && self.remove(id) {
                warn!(round = id, "swept stale round");
                removed.push(id);
            }
        }
        removed
    }
}

impl Default for RoundStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> Arc<Mutex<()>> {
        Arc::new(Mutex::new(()))
    }

    async fn round_with_idle(gate: &Arc<Mutex<()>>) -> ConvoRound {
        ConvoRound::new(vec!["S1".into()], gate.clone().lock_owned().await)
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = RoundStore::new();
        let gate = idle();
        store.create(1, round_with_idle(&gate).await).unwrap();

        let gate2 = idle();
        let err = store
            .create(1, round_with_idle(&gate2).await)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "round 1 already exists");
    }

    #[tokio::test]
    async fn test_missing_round() {
        let store = RoundStore::new();
        let err = store.get(5).err().unwrap();
        assert_eq!(err.to_string(), "round 5 not found");
    }

    #[tokio::test]
    async fn test_status_mismatch_message() {
        let store = RoundStore::new();
        let gate = idle();
        let entry = store.create(2, round_with_idle(&gate).await).unwrap();
        let state = entry.lock().await;
        let err = state.expect_status(2, RoundStatus::Open).err().unwrap();
        assert_eq!(err.to_string(), "round 2: status new, expecting open");
    }

    #[tokio::test]
    async fn test_remove_releases_idle() {
        let store = RoundStore::new();
        let gate = idle();
        store.create(3, round_with_idle(&gate).await).unwrap();

        assert!(gate.try_lock().is_err());
        assert!(store.remove(3));
        assert!(gate.try_lock().is_ok());
        assert!(!store.remove(3));
    }

    #[tokio::test]
    async fn test_sweep_stale_skips_fresh_rounds() {
        let store = RoundStore::new();
        let gate = idle();
        store.create(4, round_with_idle(&gate).await).unwrap();

        assert!(store.sweep_stale(Duration::from_secs(60)).is_empty());
        let swept = store.sweep_stale(Duration::ZERO);
        assert_eq!(swept, vec![4]);
        assert!(store.is_empty());
    }
}
