use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub listed: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub marked_for_deletion: usize,
    pub deleted: usize,
    pub delete_failures: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listed={} evaluated={} skipped={} markedForDeletion={} deleted={} deleteFailures={}",
            self.listed,
            self.evaluated,
            self.skipped,
            self.marked_for_deletion,
            self.deleted,
            self.delete_failures
        )
    }
}
