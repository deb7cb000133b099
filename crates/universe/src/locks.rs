use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockStrength {
    None,
    /// Simulation keeps running; user pausing is refused.
    Soft,
    /// Active-map simulation is skipped entirely.
    Hard,
}

impl LockStrength {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(LockStrength::None),
            2 => Some(LockStrength::Soft),
            3 => Some(LockStrength::Hard),
            _ => None,
        }
    }
}

/// What to do when a lock is released or times out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAction {
    /// `script:<name>`: run the named script on the active map.
    Script(String),
    /// Any other action name, raised as an event.
    Callback(String),
}

impl LockAction {
    pub fn parse(action: &str) -> Self {
        match action.strip_prefix("script:") {
            Some(name) => LockAction::Script(name.to_string()),
            None => LockAction::Callback(action.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct Lock {
    strength: LockStrength,
    timeout: Option<Duration>,
    on_unlock: Option<LockAction>,
    on_timeout: Option<LockAction>,
    locked_at: Instant,
}

/// Keyed cooperative locks. Counts are derived from the table, so they can
/// never go negative.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: BTreeMap<String, Lock>,
}

impl LockTable {
    /// Returns `false` and changes nothing when `key` is already held.
    pub fn lock_with_key(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
        strength: LockStrength,
        on_unlock: Option<&str>,
        on_timeout: Option<&str>,
        now: Instant,
    ) -> bool {
        if self.locks.contains_key(key) {
            debug!(key, "lock_already_held");
            return false;
        }
        self.locks.insert(
            key.to_string(),
            Lock {
                strength,
                timeout,
                on_unlock: on_unlock.map(LockAction::parse),
                on_timeout: on_timeout.map(LockAction::parse),
                locked_at: now,
            },
        );
        debug!(key, ?strength, "lock_taken");
        true
    }

    /// Releases `key`, returning its on-unlock action. Unknown keys are
    /// ignored.
    pub fn unlock(&mut self, key: &str, now: Instant) -> Option<LockAction> {
        let lock = self.locks.remove(key)?;
        let elapsed = now.saturating_duration_since(lock.locked_at);
        info!(key, elapsed_secs = elapsed.as_secs_f64(), "lock_released");
        lock.on_unlock
    }

    /// Removes every lock whose timeout has passed and returns their
    /// on-timeout actions in key order.
    pub fn timeout_expired(&mut self, now: Instant) -> Vec<LockAction> {
        let expired = self
            .locks
            .iter()
            .filter(|(_, lock)| {
                lock.timeout
                    .is_some_and(|timeout| now.saturating_duration_since(lock.locked_at) >= timeout)
            })
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        let mut actions = Vec::new();
        for key in expired {
            if let Some(lock) = self.locks.remove(&key) {
                info!(key = %key, "lock_timed_out");
                actions.extend(lock.on_timeout);
            }
        }
        actions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.locks.contains_key(key)
    }

    pub fn lock_count(&self) -> usize {
        self.locks
            .values()
            .filter(|lock| lock.strength >= LockStrength::Soft)
            .count()
    }

    pub fn is_locked(&self) -> bool {
        self.locks
            .values()
            .any(|lock| lock.strength == LockStrength::Hard)
    }

    pub fn is_soft_locked(&self) -> bool {
        self.lock_count() > 0
    }

    pub fn clear(&mut self) {
        self.locks.clear();
    }
}

/// Saturating pause counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseCounter {
    count: u32,
}

impl PauseCounter {
    /// Refused (returns `false`) while `soft_locked`.
    pub fn pause(&mut self, soft_locked: bool) -> bool {
        if soft_locked {
            debug!("pause_refused_while_locked");
            return false;
        }
        self.count = self.count.saturating_add(1);
        true
    }

    pub fn unpause(&mut self, force: bool) {
        self.count = if force {
            0
        } else {
            self.count.saturating_sub(1)
        };
    }

    pub fn is_paused(&self) -> bool {
        self.count > 0
    }
}
