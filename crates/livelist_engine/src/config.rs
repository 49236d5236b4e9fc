//! Configuration for synced lists.

/// Options for a synced list.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Whether local edits to the list are written back to the store.
    pub auto_sync: bool,
    /// Whether pending local edits are written back before a remote batch
    /// suppresses change detection.
    pub drain_before_suppress: bool,
    /// Maximum number of watcher passes in one flush.
    pub max_flush_passes: usize,
    /// Maximum number of scheduler turns for `run_until_idle`.
    pub max_turns: usize,
}

impl SyncOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether local edits are written back.
    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    /// Sets whether pending edits are drained before suppression.
    pub fn with_drain_before_suppress(mut self, drain: bool) -> Self {
        self.drain_before_suppress = drain;
        self
    }

    /// Sets the flush pass limit.
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }

    /// Sets the turn limit.
    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns.max(1);
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            auto_sync: true,
            drain_before_suppress: true,
            max_flush_passes: 10,
            max_turns: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = SyncOptions::default();
        assert!(options.auto_sync);
        assert!(options.drain_before_suppress);
        assert_eq!(options.max_flush_passes, 10);
    }

    #[test]
    fn builder() {
        let options = SyncOptions::new()
            .with_auto_sync(false)
            .with_drain_before_suppress(false)
            .with_max_flush_passes(0)
            .with_max_turns(50);

        assert!(!options.auto_sync);
        assert!(!options.drain_before_suppress);
        // Clamped to at least one pass.
        assert_eq!(options.max_flush_passes, 1);
        assert_eq!(options.max_turns, 50);
    }
}
