use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks the currently-subscribed token-id set and diffs it against a
/// desired set each sync tick, plus an externally-settable manual-refresh
/// flag the trading layer can trip between ticks.
pub struct SubscriptionManager {
    current: HashSet<String>,
    manual_trigger: Arc<AtomicBool>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            current: HashSet::new(),
            manual_trigger: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a manager sharing an externally-held trigger flag, so a
    /// `Core` handle can request a refresh without reaching into the WS
    /// worker's owned state.
    pub fn with_trigger(manual_trigger: Arc<AtomicBool>) -> Self {
        Self {
            current: HashSet::new(),
            manual_trigger,
        }
    }

    pub fn manual_trigger_handle(&self) -> Arc<AtomicBool> {
        self.manual_trigger.clone()
    }

    pub fn request_refresh(&self) {
        self.manual_trigger.store(true, Ordering::SeqCst);
    }

    pub fn take_manual_trigger(&self) -> bool {
        self.manual_trigger.swap(false, Ordering::SeqCst)
    }

    /// Returns `(to_add, to_drop)` against the current subscribed set and
    /// updates `current` to `desired`.
    pub fn diff(&mut self, desired: &HashSet<String>) -> (Vec<String>, Vec<String>) {
        let to_add: Vec<String> = desired.difference(&self.current).cloned().collect();
        let to_drop: Vec<String> = self.current.difference(desired).cloned().collect();
        self.current = desired.clone();
        (to_add, to_drop)
    }

    pub fn current(&self) -> &HashSet<String> {
        &self.current
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_adds_and_drops() {
        let mut mgr = SubscriptionManager::new();
        let (add, drop) = mgr.diff(&set(&["a", "b"]));
        assert_eq!(add.len(), 2);
        assert!(drop.is_empty());

        let (add, mut drop) = mgr.diff(&set(&["b", "c"]));
        drop.sort();
        assert_eq!(add, vec!["c".to_string()]);
        assert_eq!(drop, vec!["a".to_string()]);
    }

    #[test]
    fn diff_no_change_is_empty() {
        let mut mgr = SubscriptionManager::new();
        mgr.diff(&set(&["a", "b"]));
        let (add, drop) = mgr.diff(&set(&["a", "b"]));
        assert!(add.is_empty());
        assert!(drop.is_empty());
    }

    #[test]
    fn manual_trigger_swaps_and_clears() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.take_manual_trigger());
        mgr.request_refresh();
        assert!(mgr.take_manual_trigger());
        assert!(!mgr.take_manual_trigger());
    }
}
