//! Per-identity mutual exclusion for device commands.
//!
//! A second connect/disconnect for an identity that already has one running
//! is rejected, not queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identities with a command currently executing.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `identity`. Returns `None` if it is already claimed.
    ///
    /// The claim is released when the returned permit is dropped.
    #[must_use]
    pub fn try_acquire(&self, identity: &str) -> Option<InFlightPermit> {
        if !self.lock().insert(identity.to_string()) {
            return None;
        }
        Some(InFlightPermit {
            set: self.clone(),
            identity: identity.to_string(),
        })
    }

    /// Whether `identity` has a command running.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.lock().contains(identity)
    }

    /// Number of commands running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no command is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Scoped claim on one identity.
#[derive(Debug)]
pub struct InFlightPermit {
    set: InFlightSet,
    identity: String,
}

impl InFlightPermit {
    /// The claimed identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.set.lock().remove(&self.identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let set = InFlightSet::new();
        let permit = set.try_acquire("A").unwrap();
        assert_eq!(permit.identity(), "A");
        assert!(set.try_acquire("A").is_none());
        assert!(set.try_acquire("B").is_some());
        assert!(set.contains("A"));
    }

    #[test]
    fn test_drop_releases() {
        let set = InFlightSet::new();
        {
            let _permit = set.try_acquire("A").unwrap();
            assert_eq!(set.len(), 1);
        }
        assert!(set.is_empty());
        assert!(set.try_acquire("A").is_some());
    }

    #[tokio::test]
    async fn test_released_when_task_is_cancelled() {
        let set = InFlightSet::new();
        let permit = set.try_acquire("A").unwrap();
        let task = tokio::spawn(async move {
            let _permit = permit;
            std::future::pending::<()>().await;
        });
        task.abort();
        let _ = task.await;
        assert!(!set.contains("A"));
    }
}
