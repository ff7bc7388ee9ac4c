/// Receives progress events while stop patterns are matched.
pub trait ProgressHandler: Send + Sync {
    /// Set total number of patterns that will be sent to the matcher
    fn set_total_patterns(&self, count: usize);

    /// Called before the matcher is invoked for a pattern
    fn on_start_pattern(&self, pattern: &str) {
        let _ = pattern;
    }

    /// Called once the matcher returned for a pattern, successfully or not
    fn on_finish_pattern(&self, pattern: &str, matched: bool);
}

/// A no-op progress handler
pub struct NoOpProgressHandler;

impl ProgressHandler for NoOpProgressHandler {
    fn set_total_patterns(&self, _count: usize) {}
    fn on_finish_pattern(&self, _pattern: &str, _matched: bool) {}
}
