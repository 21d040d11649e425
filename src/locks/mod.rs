//! Advisory per-file locks with optional expiry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ConcordError, Result};
use crate::types::{FileLock, LockType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a lock when the caller gives none; 0 disables expiry.
    pub default_ttl_secs: u64,
    /// How long dispatch waits for a contended lock; 0 fails fast.
    pub lock_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            lock_wait_ms: 0,
            poll_interval_ms: 25,
        }
    }
}

pub struct FileLockTable {
    locks: Mutex<HashMap<String, Vec<FileLock>>>,
    config: LockConfig,
}

impl FileLockTable {
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn expiry(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ttl = match ttl {
            Some(ttl) => ttl,
            None if self.config.default_ttl_secs == 0 => return None,
            None => Duration::from_secs(self.config.default_ttl_secs),
        };
        chrono::Duration::from_std(ttl).ok().map(|ttl| now + ttl)
    }

    /// Grant or refuse a lock without waiting.
    pub fn acquire(
        &self,
        path: &str,
        lock_type: LockType,
        owner: &str,
        ttl: Option<Duration>,
    ) -> Result<FileLock> {
        let now = Utc::now();
        let mut locks = self.locks.lock();
        let lock = try_grant(&mut locks, path, lock_type, owner, now, self.expiry(ttl, now))?;
        log::debug!("{} acquired {} lock on {}", owner, lock_type, path);
        Ok(lock)
    }

    /// Acquire `lock_type` on every path or on none of them.
    pub fn acquire_all(
        &self,
        paths: &[String],
        lock_type: LockType,
        owner: &str,
        ttl: Option<Duration>,
    ) -> Result<Vec<FileLock>> {
        let now = Utc::now();
        let expires_at = self.expiry(ttl, now);
        let mut locks = self.locks.lock();

        // rollback needs what the owner held before, since a grant replaces it
        let previous: Vec<(String, Option<FileLock>)> = paths
            .iter()
            .map(|path| {
                let held = locks
                    .get(path)
                    .and_then(|records| records.iter().find(|l| l.owner == owner).cloned());
                (path.clone(), held)
            })
            .collect();

        let mut granted = Vec::with_capacity(paths.len());
        for path in paths {
            match try_grant(&mut locks, path, lock_type, owner, now, expires_at) {
                Ok(lock) => granted.push(lock),
                Err(e) => {
                    for (path, held) in previous.iter().take(granted.len()) {
                        if let Some(records) = locks.get_mut(path) {
                            records.retain(|l| l.owner != owner);
                            if let Some(held) = held {
                                records.push(held.clone());
                            }
                            if records.is_empty() {
                                locks.remove(path);
                            }
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(granted)
    }

    /// Poll until the lock is granted or `wait` elapses. On timeout the last
    /// contention error is returned.
    pub async fn acquire_with_wait(
        &self,
        path: &str,
        lock_type: LockType,
        owner: &str,
        ttl: Option<Duration>,
        wait: Duration,
    ) -> Result<FileLock> {
        let deadline = tokio::time::Instant::now() + wait;
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));

        loop {
            match self.acquire(path, lock_type, owner, ttl) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.is_lock_contention() => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return Err(e);
                    }
                    tokio::time::sleep(poll.min(deadline - now)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop `owner`'s lock on `path`. Returns whether anything was released.
    pub fn release(&self, path: &str, owner: &str) -> bool {
        let mut locks = self.locks.lock();
        let Some(records) = locks.get_mut(path) else {
            return false;
        };

        let before = records.len();
        records.retain(|l| l.owner != owner);
        let released = records.len() != before;
        if records.is_empty() {
            locks.remove(path);
        }

        if released {
            log::debug!("{} released lock on {}", owner, path);
        }
        released
    }

    pub fn release_all(&self, owner: &str) -> usize {
        let mut locks = self.locks.lock();
        let mut released = 0;
        locks.retain(|_, records| {
            let before = records.len();
            records.retain(|l| l.owner != owner);
            released += before - records.len();
            !records.is_empty()
        });
        released
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut locks = self.locks.lock();
        let mut purged = 0;
        locks.retain(|path, records| {
            let before = records.len();
            records.retain(|l| !l.is_expired_at(now));
            let expired = before - records.len();
            if expired > 0 {
                log::debug!("Expired {} lock(s) on {}", expired, path);
            }
            purged += expired;
            !records.is_empty()
        });
        purged
    }

    /// Unexpired locks sorted by path, then acquisition time.
    pub fn active_locks(&self) -> Vec<FileLock> {
        let now = Utc::now();
        let locks = self.locks.lock();
        let mut active: Vec<FileLock> = locks
            .values()
            .flatten()
            .filter(|l| !l.is_expired_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.path.cmp(&b.path).then(a.acquired_at.cmp(&b.acquired_at)));
        active
    }

    pub fn locks_for(&self, path: &str) -> Vec<FileLock> {
        let now = Utc::now();
        self.locks
            .lock()
            .get(path)
            .map(|records| {
                records
                    .iter()
                    .filter(|l| !l.is_expired_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_locked(&self, path: &str) -> bool {
        !self.locks_for(path).is_empty()
    }

    pub fn holds(&self, path: &str, owner: &str) -> bool {
        self.locks_for(path).iter().any(|l| l.owner == owner)
    }
}

impl Default for FileLockTable {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

fn try_grant(
    locks: &mut HashMap<String, Vec<FileLock>>,
    path: &str,
    lock_type: LockType,
    owner: &str,
    now: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<FileLock> {
    let records = locks.entry(path.to_string()).or_default();
    records.retain(|l| !l.is_expired_at(now));

    let shared = lock_type.is_shared() && records.iter().all(|l| l.lock_type.is_shared());
    let sole_holder = records.len() == 1 && records[0].owner == owner;

    if !(records.is_empty() || shared || sole_holder) {
        let blocker = records
            .iter()
            .find(|l| l.owner != owner)
            .unwrap_or(&records[0]);
        return Err(ConcordError::LockContention {
            path: path.to_string(),
            holder: blocker.owner.clone(),
            held: blocker.lock_type,
        });
    }

    records.retain(|l| l.owner != owner);
    let lock = FileLock {
        path: path.to_string(),
        lock_type,
        owner: owner.to_string(),
        acquired_at: now,
        expires_at,
    };
    records.push(lock.clone());
    Ok(lock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FileLockTable {
        FileLockTable::default()
    }

    #[test]
    fn test_exclusive_write_lock() {
        let table = table();
        table.acquire("/a.rs", LockType::Write, "x", None).unwrap();

        let err = table
            .acquire("/a.rs", LockType::Write, "y", None)
            .unwrap_err();
        match err {
            ConcordError::LockContention { path, holder, held } => {
                assert_eq!(path, "/a.rs");
                assert_eq!(holder, "x");
                assert_eq!(held, LockType::Write);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(table.acquire("/a.rs", LockType::Read, "y", None).is_err());
    }

    #[test]
    fn test_shared_read_locks() {
        let table = table();
        table.acquire("/a.rs", LockType::Read, "x", None).unwrap();
        table.acquire("/a.rs", LockType::Read, "y", None).unwrap();
        assert_eq!(table.locks_for("/a.rs").len(), 2);

        assert!(table.acquire("/a.rs", LockType::Write, "z", None).is_err());
        // x is not the only holder, so it cannot upgrade
        assert!(table.acquire("/a.rs", LockType::Write, "x", None).is_err());
    }

    #[test]
    fn test_sole_holder_can_upgrade_and_refresh() {
        let table = table();
        table.acquire("/a.rs", LockType::Read, "x", None).unwrap();
        table.acquire("/a.rs", LockType::Exclusive, "x", None).unwrap();

        let held = table.locks_for("/a.rs");
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].lock_type, LockType::Exclusive);

        table.acquire("/a.rs", LockType::Exclusive, "x", None).unwrap();
        assert_eq!(table.locks_for("/a.rs").len(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let table = table();
        table.acquire("/a.rs", LockType::Write, "x", None).unwrap();

        assert!(!table.release("/a.rs", "y"));
        assert!(table.release("/a.rs", "x"));
        assert!(!table.release("/a.rs", "x"));
        assert!(!table.is_locked("/a.rs"));

        table.acquire("/a.rs", LockType::Write, "y", None).unwrap();
    }

    #[test]
    fn test_release_all() {
        let table = table();
        table.acquire("/a.rs", LockType::Write, "x", None).unwrap();
        table.acquire("/b.rs", LockType::Read, "x", None).unwrap();
        table.acquire("/b.rs", LockType::Read, "y", None).unwrap();

        assert_eq!(table.release_all("x"), 2);
        assert_eq!(table.active_locks().len(), 1);
        assert!(table.holds("/b.rs", "y"));
    }

    #[tokio::test]
    async fn test_expired_locks_are_ignored() {
        let table = table();
        table
            .acquire("/a.rs", LockType::Write, "x", Some(Duration::from_millis(20)))
            .unwrap();
        assert!(table.is_locked("/a.rs"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!table.is_locked("/a.rs"));
        assert!(table.active_locks().is_empty());

        table.acquire("/a.rs", LockType::Write, "y", None).unwrap();
        assert!(table.holds("/a.rs", "y"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let table = table();
        table
            .acquire("/a.rs", LockType::Write, "x", Some(Duration::from_millis(10)))
            .unwrap();
        table.acquire("/b.rs", LockType::Write, "x", None).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(table.purge_expired(), 1);
        assert_eq!(table.active_locks().len(), 1);
    }

    #[test]
    fn test_acquire_all_is_all_or_nothing() {
        let table = table();
        table.acquire("/b.rs", LockType::Write, "y", None).unwrap();

        let paths = vec!["/a.rs".to_string(), "/b.rs".to_string(), "/c.rs".to_string()];
        let err = table
            .acquire_all(&paths, LockType::Write, "x", None)
            .unwrap_err();
        assert!(err.is_lock_contention());
        assert!(!table.is_locked("/a.rs"));
        assert!(!table.is_locked("/c.rs"));

        table.release("/b.rs", "y");
        let granted = table.acquire_all(&paths, LockType::Write, "x", None).unwrap();
        assert_eq!(granted.len(), 3);
    }

    #[test]
    fn test_acquire_all_rollback_restores_prior_locks() {
        let table = table();
        table.acquire("/a.rs", LockType::Read, "x", None).unwrap();
        table.acquire("/b.rs", LockType::Write, "y", None).unwrap();

        let paths = vec!["/a.rs".to_string(), "/b.rs".to_string()];
        assert!(table.acquire_all(&paths, LockType::Write, "x", None).is_err());

        let held = table.locks_for("/a.rs");
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].lock_type, LockType::Read);
    }

    #[tokio::test]
    async fn test_acquire_with_wait() {
        let table = std::sync::Arc::new(table());
        table
            .acquire("/a.rs", LockType::Write, "x", Some(Duration::from_millis(30)))
            .unwrap();

        let lock = table
            .acquire_with_wait(
                "/a.rs",
                LockType::Write,
                "y",
                None,
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert_eq!(lock.owner, "y");

        let err = table
            .acquire_with_wait("/a.rs", LockType::Write, "z", None, Duration::from_millis(40))
            .await
            .unwrap_err();
        assert!(err.is_lock_contention());
    }
}
