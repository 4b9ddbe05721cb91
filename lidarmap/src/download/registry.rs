//! Per-run registry of scheduled downloads.
//!
//! The registry is the pipeline's dedupe set. A URL is admitted to the
//! download backlog only while it is not already queued or being fetched and
//! has not used up its fetch attempts for this run. Admission is atomic with
//! respect to every other worker, so two workers discovering the same missing
//! tile at once cannot both enqueue it.

use dashmap::DashMap;

/// Why a URL was or was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller must enqueue the download; `attempt` counts from 1.
    Admitted { attempt: u32 },
    /// Already queued or being fetched.
    InFlight,
    /// Every allowed attempt for this run has been used.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    in_flight: bool,
    attempts: u32,
}

/// Concurrent record of download attempts, scoped to one pipeline run.
#[derive(Debug)]
pub struct DownloadRegistry {
    entries: DashMap<String, Entry>,
    max_attempts: u32,
}

impl DownloadRegistry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: DashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Atomically test and claim a download slot for `url`.
    pub fn try_admit(&self, url: &str) -> Admission {
        let mut entry = self.entries.entry(url.to_string()).or_default();
        if entry.in_flight {
            return Admission::InFlight;
        }
        if entry.attempts >= self.max_attempts {
            return Admission::Exhausted {
                attempts: entry.attempts,
            };
        }
        entry.in_flight = true;
        entry.attempts += 1;
        Admission::Admitted {
            attempt: entry.attempts,
        }
    }

    /// Mark the fetch of `url` as finished, successful or not.
    ///
    /// A released URL can be admitted again until its attempts run out.
    pub fn release(&self, url: &str) {
        if let Some(mut entry) = self.entries.get_mut(url) {
            entry.in_flight = false;
        }
    }

    /// Undo an admission whose download was never enqueued.
    pub fn revoke(&self, url: &str) {
        if let Some(mut entry) = self.entries.get_mut(url) {
            entry.in_flight = false;
            entry.attempts = entry.attempts.saturating_sub(1);
        }
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.entries.get(url).map(|e| e.in_flight).unwrap_or(false)
    }

    /// Fetches started for `url` during this run.
    pub fn attempts(&self, url: &str) -> u32 {
        self.entries.get(url).map(|e| e.attempts).unwrap_or(0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of distinct URLs ever admitted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_admit_once_while_in_flight() {
        let registry = DownloadRegistry::new(3);
        assert_eq!(registry.try_admit("a"), Admission::Admitted { attempt: 1 });
        assert_eq!(registry.try_admit("a"), Admission::InFlight);
        assert!(registry.is_in_flight("a"));
        assert_eq!(registry.attempts("a"), 1);
    }

    #[test]
    fn test_release_allows_retry_until_exhausted() {
        let registry = DownloadRegistry::new(2);
        assert_eq!(registry.try_admit("a"), Admission::Admitted { attempt: 1 });
        registry.release("a");
        assert_eq!(registry.try_admit("a"), Admission::Admitted { attempt: 2 });
        registry.release("a");
        assert_eq!(registry.try_admit("a"), Admission::Exhausted { attempts: 2 });
        assert!(!registry.is_in_flight("a"));
    }

    #[test]
    fn test_revoke_returns_attempt() {
        let registry = DownloadRegistry::new(1);
        assert_eq!(registry.try_admit("a"), Admission::Admitted { attempt: 1 });
        registry.revoke("a");
        assert_eq!(registry.attempts("a"), 0);
        assert_eq!(registry.try_admit("a"), Admission::Admitted { attempt: 1 });
    }

    #[test]
    fn test_unknown_url() {
        let registry = DownloadRegistry::new(1);
        registry.release("never-seen");
        assert!(!registry.is_in_flight("never-seen"));
        assert_eq!(registry.attempts("never-seen"), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_admission_is_exclusive() {
        let registry = Arc::new(DownloadRegistry::new(1));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.try_admit("https://tiles/las/1/a.las"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| matches!(a, Admission::Admitted { .. }))
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
