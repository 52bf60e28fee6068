//! Check 5 of §4.3: user requests-per-minute, grounded in
//! `tower-resilience-ratelimiter`'s `SlidingLogState` (a timestamp log pruned to the
//! window), simplified to a plain admit/reject instead of a wait-then-retry permit.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct RpmWindow {
    log: VecDeque<Instant>,
}

impl RpmWindow {
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.log.front() {
            if now.duration_since(front) >= WINDOW {
                self.log.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct RpmLimiter<K> {
    windows: DashMap<K, Mutex<RpmWindow>>,
}

impl<K: Eq + Hash + Clone> RpmLimiter<K> {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    /// Admits and records a request if under `limit` requests in the trailing minute.
    /// `None` disables the check for this key.
    pub fn try_admit(&self, key: K, limit: Option<u32>, now: Instant) -> Result<(), u32> {
        let Some(limit) = limit else { return Ok(()) };
        let entry = self.windows.entry(key).or_insert_with(|| Mutex::new(RpmWindow::default()));
        let mut window = entry.lock().unwrap();
        window.prune(now);
        if window.log.len() as u32 >= limit {
            return Err(window.log.len() as u32);
        }
        window.log.push_back(now);
        Ok(())
    }

    pub fn current(&self, key: &K, now: Instant) -> u32 {
        self.windows
            .get(key)
            .map(|entry| {
                let mut window = entry.lock().unwrap();
                window.prune(now);
                window.log.len() as u32
            })
            .unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone> Default for RpmLimiter<K> {
    fn default() -> Self {
        Self::new()
    }
}
