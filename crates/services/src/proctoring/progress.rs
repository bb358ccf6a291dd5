/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub current: usize,
    pub remaining_secs: u32,
    pub violations: u32,
    pub max_warnings: u32,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    /// Violations left before the attempt is force-submitted.
    #[must_use]
    pub fn warnings_left(&self) -> u32 {
        self.max_warnings.saturating_sub(self.violations)
    }
}
